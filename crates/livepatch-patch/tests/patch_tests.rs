use livepatch_compile::CompilationAdapter;
use livepatch_diff::{DiffEngine, MethodChange};
use livepatch_patch::{
    DetourRedirector, PatchEngine, PatchError, RedirectError, RedirectionHandle, Redirector,
};
use livepatch_runtime::{
    MethodBody, MethodDef, MethodFlags, MethodHandle, MethodSignature, ModuleBuilder,
    ModuleOrigin, Program, TypeDef, Value,
};
use livepatch_test_utils::{load_base, TempProject};
use livepatch_watch::ChangeBatch;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

const GAME: &str = "namespace Game;
type Enemy {
    fn damage(level: int) -> int { return level * 2; }
    fn name() -> str { return \"slime\"; }
    #[no_patch]
    fn id() -> int { return 1; }
}
";

struct Fixture {
    project: TempProject,
    program: Arc<Program>,
    adapter: CompilationAdapter,
    engine: PatchEngine,
}

impl Fixture {
    fn new() -> Self {
        let project = TempProject::new();
        let file = project.write("src/enemy.src", GAME);
        let program = load_base(&project, &[file]);
        let adapter = CompilationAdapter::new(Arc::clone(&program));
        let mut engine = PatchEngine::new(Box::new(DetourRedirector::new(Arc::clone(&program))));
        engine.initialize().unwrap();
        Self {
            project,
            program,
            adapter,
            engine,
        }
    }

    fn changes_for(&mut self, text: &str) -> Vec<MethodChange> {
        let file = self.project.write("src/enemy.src", text);
        let compiled = self.adapter.compile(&ChangeBatch::new([file]));
        assert!(compiled.success(), "{:?}", compiled.diagnostics());
        DiffEngine::new().diff(&compiled, &self.program).changes
    }

    fn call(&self, method: &str, args: Vec<Value>) -> Value {
        self.program.call_by_name("Game.Enemy", method, args).unwrap()
    }
}

#[test]
fn patched_method_runs_new_body_until_cleared() {
    let mut fx = Fixture::new();
    let changes = fx.changes_for(&GAME.replace("level * 2", "level * 5"));

    let summary = fx.engine.apply_patches(&changes).unwrap();
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 1);
    assert_eq!(summary.skipped_count, 1);
    assert_eq!(fx.call("damage", vec![Value::Int(3)]), Value::Int(15));

    assert_eq!(fx.engine.clear_all_patches(), 2);
    assert_eq!(fx.engine.active_count(), 0);
    assert!(fx.program.detours().is_empty());
    assert_eq!(fx.call("damage", vec![Value::Int(3)]), Value::Int(6));
}

#[test]
fn never_patch_methods_keep_running_the_original() {
    let mut fx = Fixture::new();
    let changes = fx.changes_for(&GAME.replace("return 1;", "return 99;"));
    fx.engine.apply_patches(&changes).unwrap();

    assert_eq!(fx.call("id", vec![]), Value::Int(1));
    let id = changes.iter().find(|c| c.signature.name == "id").unwrap();
    assert!(fx.engine.active(id.original).is_none());
}

#[test]
fn same_change_twice_is_one_redirection() {
    let mut fx = Fixture::new();
    let changes = fx.changes_for(&GAME.replace("level * 2", "level * 5"));
    fx.engine.apply_patches(&changes).unwrap();
    fx.engine.apply_patches(&changes).unwrap();

    assert_eq!(fx.engine.active_count(), 2);
    assert_eq!(fx.program.detours().len(), 2);
}

#[test]
fn second_batch_supersedes_the_first() {
    let mut fx = Fixture::new();
    let first = fx.changes_for(&GAME.replace("level * 2", "level * 5"));
    fx.engine.apply_patches(&first).unwrap();
    let second = fx.changes_for(&GAME.replace("level * 2", "level * 7"));
    fx.engine.apply_patches(&second).unwrap();

    let damage = second.iter().find(|c| c.signature.name == "damage").unwrap();
    let active = fx.engine.active(damage.original).unwrap();
    assert_eq!(active.replacement, damage.replacement);
    assert_eq!(fx.engine.active_patches().len(), 2);
    assert_eq!(fx.program.detours().detours_for(damage.original).len(), 1);
    assert_eq!(fx.call("damage", vec![Value::Int(1)]), Value::Int(7));
}

#[test]
fn lifecycle_errors() {
    let program = Arc::new(Program::new());
    let mut engine = PatchEngine::new(Box::new(DetourRedirector::new(program)));
    assert!(matches!(engine.apply_patches(&[]), Err(PatchError::NotInitialized)));

    engine.dispose();
    engine.dispose();
    assert!(matches!(engine.apply_patches(&[]), Err(PatchError::Disposed)));
    assert!(matches!(engine.initialize(), Err(PatchError::Disposed)));
}

#[test]
fn initialize_is_idempotent() {
    let mut fx = Fixture::new();
    let changes = fx.changes_for(&GAME.replace("level * 2", "level * 5"));
    fx.engine.apply_patches(&changes).unwrap();
    fx.engine.initialize().unwrap();
    assert_eq!(fx.engine.active_count(), 2);
}

/// Delegates to a detour redirector but fails on chosen originals
#[derive(Debug)]
struct Flaky {
    inner: DetourRedirector,
    panic_on: HashSet<MethodHandle>,
    fail_on: HashSet<MethodHandle>,
}

impl Redirector for Flaky {
    fn prepare(&mut self) -> Result<(), RedirectError> {
        self.inner.prepare()
    }

    fn install(
        &mut self,
        original: MethodHandle,
        replacement: MethodHandle,
    ) -> Result<RedirectionHandle, RedirectError> {
        if self.panic_on.contains(&original) {
            panic!("injected failure");
        }
        if self.fail_on.contains(&original) {
            return Err(RedirectError::failed("injected error"));
        }
        self.inner.install(original, replacement)
    }

    fn revert(&mut self, handle: RedirectionHandle) -> Result<(), RedirectError> {
        self.inner.revert(handle)
    }

    fn release(&mut self) {
        self.inner.release();
    }
}

fn native_program(count: usize) -> (Arc<Program>, Vec<MethodChange>) {
    let program = Arc::new(Program::new());
    let mut originals = TypeDef::new("T");
    let mut replacements = TypeDef::new("T");
    let mut changes = Vec::new();
    for i in 0..count {
        let name = format!("m{i}");
        let sig = MethodSignature::new("T", name.as_str(), vec![], "int");
        let original = program.allocate_handle();
        let replacement = program.allocate_handle();
        let n = i64::try_from(i).unwrap();
        originals.add_method(MethodDef::new(
            original,
            sig.clone(),
            MethodFlags::default(),
            MethodBody::native(move |_| Ok(Value::Int(n))),
        ));
        replacements.add_method(MethodDef::new(
            replacement,
            sig.clone(),
            MethodFlags::default(),
            MethodBody::native(move |_| Ok(Value::Int(n + 100))),
        ));
        changes.push(MethodChange {
            original,
            replacement,
            signature: sig,
            original_flags: MethodFlags::default(),
            replacement_module: "hot".to_string(),
        });
    }
    let mut base = ModuleBuilder::new("base", ModuleOrigin::InMemory);
    base.add_type(originals);
    program.load_module(base).unwrap();
    let mut hot = ModuleBuilder::new("hot", ModuleOrigin::HotReload { generation: 1 });
    hot.add_type(replacements);
    program.load_module(hot).unwrap();
    (program, changes)
}

#[test]
fn failing_installs_do_not_abort_the_batch() {
    let (program, changes) = native_program(4);
    let mut engine = PatchEngine::new(Box::new(Flaky {
        inner: DetourRedirector::new(Arc::clone(&program)),
        panic_on: HashSet::from([changes[1].original]),
        fail_on: HashSet::from([changes[2].original]),
    }));
    engine.initialize().unwrap();

    let summary = engine.apply_patches(&changes).unwrap();
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 2);
    assert_eq!(summary.skipped_count, 0);

    assert_eq!(program.invoke(changes[0].original, vec![]).unwrap(), Value::Int(100));
    assert_eq!(program.invoke(changes[1].original, vec![]).unwrap(), Value::Int(1));
    assert_eq!(program.invoke(changes[3].original, vec![]).unwrap(), Value::Int(103));
}

#[derive(Debug, Clone)]
enum Op {
    Apply(Vec<usize>),
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => proptest::collection::vec(0..5usize, 0..5).prop_map(Op::Apply),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    #[test]
    fn prop_one_redirection_per_original(ops in proptest::collection::vec(op(), 1..20)) {
        let (program, changes) = native_program(5);
        let mut engine = PatchEngine::new(Box::new(DetourRedirector::new(Arc::clone(&program))));
        engine.initialize().unwrap();

        let mut model: HashSet<usize> = HashSet::new();
        for op in ops {
            match op {
                Op::Apply(picks) => {
                    let batch: Vec<MethodChange> = picks.iter().map(|&i| changes[i].clone()).collect();
                    let summary = engine.apply_patches(&batch).unwrap();
                    prop_assert_eq!(summary.success_count, batch.len());
                    model.extend(picks);
                }
                Op::Clear => {
                    engine.clear_all_patches();
                    model.clear();
                }
            }
            prop_assert_eq!(engine.active_count(), model.len());
            prop_assert_eq!(program.detours().len(), model.len());
        }

        engine.dispose();
        prop_assert!(program.detours().is_empty());
    }
}
