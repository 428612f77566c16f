use livepatch_compile::{codes, CompilationAdapter, CompileOptions};
use livepatch_runtime::{ModuleOrigin, Value};
use livepatch_test_utils::{load_base, TempProject, BASE_MODULE};
use livepatch_watch::ChangeBatch;
use pretty_assertions::assert_eq;
use std::sync::Arc;

const PLAYER: &str = "namespace Game;
type Player {
    fn speed(level: int) -> int { return level * 2; }
    fn describe(level: int) -> str { return \"speed \" + Util.label(Player.speed(level)); }
}
";

const UTIL: &str = "namespace Game;
type Util {
    pub static fn label(x: int) -> str {
        if x > 10 { return \"fast\"; }
        return \"slow\";
    }
}
";

fn project() -> TempProject {
    let project = TempProject::new();
    project.write("src/player.src", PLAYER);
    project.write("src/util.src", UTIL);
    project
}

#[test]
fn base_program_runs() {
    let project = project();
    let program = load_base(&project, &[project.path("src/player.src"), project.path("src/util.src")]);

    assert_eq!(
        program.call_by_name("Game.Player", "describe", vec![Value::Int(3)]).unwrap(),
        Value::from("speed slow")
    );
    let base = program.module(BASE_MODULE).unwrap();
    assert_eq!(base.origin(), &ModuleOrigin::Disk(project.root().to_path_buf()));
}

#[test]
fn batch_compiles_against_loaded_modules() {
    let project = project();
    let program = load_base(&project, &[project.path("src/player.src"), project.path("src/util.src")]);
    let mut adapter = CompilationAdapter::new(Arc::clone(&program));

    let player = project.write("src/player.src", &PLAYER.replace("level * 2", "level * 20"));
    let result = adapter.compile(&ChangeBatch::new([player.clone()]));

    assert!(result.success(), "{:?}", result.diagnostics());
    assert_eq!(result.name(), "livepatch.hot.1");
    assert_eq!(result.types(), &["Game.Player".to_string()]);
    assert_eq!(result.sources(), &[player]);
    assert_eq!(result.fingerprint().map(str::len), Some(64));

    let module = result.module().unwrap();
    assert_eq!(module.origin(), &ModuleOrigin::HotReload { generation: 1 });
    assert_eq!(program.module_count(), 2);

    let speed = module.find_type("Game.Player").unwrap().find_method("speed", &["int"]).unwrap();
    assert_eq!(program.invoke(speed.handle(), vec![Value::Int(1)]).unwrap(), Value::Int(20));
}

#[test]
fn syntax_error_rejects_the_batch() {
    let project = project();
    let program = load_base(&project, &[project.path("src/player.src"), project.path("src/util.src")]);
    let mut adapter = CompilationAdapter::new(Arc::clone(&program));

    let bad = project.write("src/bad.src", "type Bad { fn m() -> int { return 1 } }");
    let result = adapter.compile(&ChangeBatch::new([bad]));

    assert!(!result.success());
    assert!(result.module().is_none());
    let errors: Vec<_> = result.errors().collect();
    assert!(!errors.is_empty());
    assert_eq!(errors[0].code, codes::SYNTAX);
    assert_eq!(errors[0].location.line, 1);
    assert_eq!(program.module_count(), 1);
}

#[test]
fn missing_files_are_dropped_but_the_rest_compiles() {
    let project = project();
    let program = load_base(&project, &[project.path("src/player.src"), project.path("src/util.src")]);
    let mut adapter = CompilationAdapter::new(program);

    let result = adapter.compile(&ChangeBatch::new([
        project.path("src/player.src"),
        project.path("src/gone.src"),
    ]));

    assert!(result.success());
    assert_eq!(result.diagnostics().len(), 1);
    assert_eq!(result.diagnostics()[0].code, codes::FILE_NOT_FOUND);
}

#[test]
fn only_missing_files_means_failure() {
    let project = project();
    let program = load_base(&project, &[project.path("src/player.src"), project.path("src/util.src")]);
    let mut adapter = CompilationAdapter::new(program);

    let result = adapter.compile(&ChangeBatch::new([project.path("src/gone.src")]));
    assert!(!result.success());
    let found: Vec<_> = result.diagnostics().iter().map(|d| d.code).collect();
    assert_eq!(found, vec![codes::FILE_NOT_FOUND, codes::NO_SOURCES]);
}

#[test]
fn hot_modules_are_not_referenced() {
    let project = project();
    let program = load_base(&project, &[project.path("src/player.src"), project.path("src/util.src")]);
    let mut adapter = CompilationAdapter::new(program);

    let first = project.write("src/extra.src", "type Extra { fn one() -> int { return 1; } }");
    assert!(adapter.compile(&ChangeBatch::new([first])).success());

    let second = project.write("src/user.src", "type User { fn two() -> int { return Extra.one() + 1; } }");
    let result = adapter.compile(&ChangeBatch::new([second]));
    assert!(!result.success());
    assert_eq!(result.errors().next().map(|d| d.code), Some(codes::UNKNOWN_TYPE));
    assert_eq!(adapter.generation(), 2);
}

#[test]
fn module_filter_narrows_references() {
    let project = project();
    let program = load_base(&project, &[project.path("src/player.src"), project.path("src/util.src")]);

    let mut filtered = CompilationAdapter::new(Arc::clone(&program))
        .with_included_modules(vec!["some.other.module".to_string()]);
    assert!(filtered.references().is_empty());
    let result = filtered.compile(&ChangeBatch::new([project.path("src/player.src")]));
    assert_eq!(result.errors().next().map(|d| d.code), Some(codes::UNKNOWN_TYPE));

    let mut named = CompilationAdapter::new(program).with_included_modules(vec![BASE_MODULE.to_string()]);
    assert_eq!(named.references().len(), 1);
    assert!(named.compile(&ChangeBatch::new([project.path("src/player.src")])).success());
}

#[test]
fn unsafe_is_rejected_when_disallowed() {
    let project = project();
    let program = load_base(&project, &[project.path("src/util.src")]);
    let mut adapter = CompilationAdapter::new(program)
        .with_options(CompileOptions::default().with_allow_unsafe(false));

    let file = project.write("src/raw.src", "type Raw { unsafe fn poke() { } }");
    let result = adapter.compile(&ChangeBatch::new([file]));
    assert_eq!(result.errors().next().map(|d| d.code), Some(codes::UNSAFE_NOT_ALLOWED));
}

#[test]
fn adapters_sharing_a_program_never_reuse_module_names() {
    let project = project();
    let program = load_base(&project, &[project.path("src/player.src"), project.path("src/util.src")]);
    let player = project.write("src/player.src", &PLAYER.replace("level * 2", "level * 3"));

    let mut first = CompilationAdapter::new(Arc::clone(&program));
    let a = first.compile(&ChangeBatch::new([player.clone()]));
    assert!(a.success(), "{:?}", a.diagnostics());

    // a second session over the same program starts a new adapter
    let mut second = CompilationAdapter::new(Arc::clone(&program));
    let b = second.compile(&ChangeBatch::new([player]));
    assert!(b.success(), "{:?}", b.diagnostics());

    assert_eq!(a.name(), "livepatch.hot.1");
    assert_eq!(b.name(), "livepatch.hot.2");
    assert_eq!(second.generation(), 2);
    assert_eq!(program.module_count(), 3);
}

#[test]
fn deeply_nested_source_is_rejected_without_crashing() {
    let project = project();
    let program = load_base(&project, &[project.path("src/player.src"), project.path("src/util.src")]);
    let mut adapter = CompilationAdapter::new(Arc::clone(&program));

    let depth = 10_000;
    let deep = project.write(
        "src/deep.src",
        &format!(
            "type Deep {{ fn m() -> int {{ return {}1{}; }} }}",
            "(".repeat(depth),
            ")".repeat(depth)
        ),
    );
    let result = adapter.compile(&ChangeBatch::new([deep]));

    assert!(!result.success());
    assert!(result.module().is_none());
    let error = result.errors().next().unwrap();
    assert_eq!(error.code, codes::SYNTAX);
    assert!(error.message.contains("nested too deeply"), "{}", error.message);
    assert_eq!(program.module_count(), 1);
}
