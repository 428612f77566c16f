//! The running program
//!
//! [`Program`] owns every loaded module, the method registry and the detour
//! table. It is shared behind an `Arc` between the host (which invokes
//! methods) and the live patch pipeline (which loads new modules and installs
//! detours), so every piece of mutable state is behind a concurrent map or a
//! lock.

use crate::detour::DetourTable;
use crate::error::RuntimeError;
use crate::handle::{MethodHandle, ModuleId};
use crate::interp;
use crate::method::MethodDef;
use crate::module::{LoadedModule, ModuleBuilder};
use crate::value::Value;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Default nesting limit for calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// A program whose methods can be invoked and redirected while it runs
#[derive(Debug)]
pub struct Program {
    modules: RwLock<Vec<Arc<LoadedModule>>>,
    methods: DashMap<MethodHandle, Arc<MethodDef>>,
    detours: DetourTable,
    next_handle: AtomicU64,
    next_module: AtomicU32,
    next_hot_generation: AtomicU64,
    max_call_depth: usize,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    /// Create an empty program
    #[must_use]
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(Vec::new()),
            methods: DashMap::new(),
            detours: DetourTable::new(),
            next_handle: AtomicU64::new(1),
            next_module: AtomicU32::new(1),
            next_hot_generation: AtomicU64::new(1),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    /// Set the call nesting limit
    #[inline]
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth.max(1);
        self
    }

    /// Call nesting limit
    #[inline]
    #[must_use]
    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }

    /// Reserve a fresh method handle
    ///
    /// Handles are never reused, even if the module they were meant for is
    /// never loaded.
    pub fn allocate_handle(&self) -> MethodHandle {
        MethodHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Reserve the next hot-reload generation
    ///
    /// Generations are program-wide and never reused.
    pub fn next_hot_generation(&self) -> u64 {
        self.next_hot_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Load a module and register all of its methods
    ///
    /// # Errors
    /// Returns error if a module with the same name is loaded, or if any
    /// method handle is already registered.
    pub fn load_module(&self, builder: ModuleBuilder) -> Result<Arc<LoadedModule>, RuntimeError> {
        let mut modules = self.modules.write();

        if modules.iter().any(|m| m.name() == builder.name()) {
            return Err(RuntimeError::DuplicateModule(builder.name().to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for method in builder.types().iter().flat_map(|t| t.methods()) {
            let handle = method.handle();
            if self.methods.contains_key(&handle) || !seen.insert(handle) {
                return Err(RuntimeError::DuplicateHandle(handle));
            }
        }

        let id = ModuleId::from_raw(self.next_module.fetch_add(1, Ordering::Relaxed));
        let module = Arc::new(LoadedModule::new(id, builder));
        for method in module.types().iter().flat_map(|t| t.methods()) {
            self.methods.insert(method.handle(), Arc::clone(method));
        }
        modules.push(Arc::clone(&module));

        tracing::debug!(
            "Loaded module {} ({id}, {} types, {} methods)",
            module.name(),
            module.types().len(),
            module.method_count()
        );
        Ok(module)
    }

    /// Snapshot of loaded modules in load order
    #[must_use]
    pub fn modules(&self) -> Vec<Arc<LoadedModule>> {
        self.modules.read().clone()
    }

    /// Find a loaded module by name
    #[must_use]
    pub fn module(&self, name: &str) -> Option<Arc<LoadedModule>> {
        self.modules.read().iter().find(|m| m.name() == name).cloned()
    }

    /// Number of loaded modules
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.read().len()
    }

    /// Look up a registered method
    #[must_use]
    pub fn method(&self, handle: MethodHandle) -> Option<Arc<MethodDef>> {
        self.methods.get(&handle).map(|entry| Arc::clone(entry.value()))
    }

    /// Find a method declared by the original (non hot-reload) program
    ///
    /// Modules are searched in load order and the first exact match wins.
    #[must_use]
    pub fn find_method(
        &self,
        type_name: &str,
        method: &str,
        params: &[&str],
    ) -> Option<Arc<MethodDef>> {
        self.modules
            .read()
            .iter()
            .filter(|m| !m.origin().is_hot_reload())
            .filter_map(|m| m.find_type(type_name))
            .find_map(|t| t.find_method(method, params).cloned())
    }

    /// Detour table consulted by every call
    #[inline]
    #[must_use]
    pub fn detours(&self) -> &DetourTable {
        &self.detours
    }

    /// Invoke a method with arguments
    ///
    /// The handle is resolved through the detour table, so a redirected
    /// method runs its replacement body.
    ///
    /// # Errors
    /// Returns error if the method is unknown, the arity is wrong, or the body
    /// fails while executing.
    pub fn invoke(&self, handle: MethodHandle, args: Vec<Value>) -> Result<Value, RuntimeError> {
        interp::call(self, handle, args, 0)
    }

    /// Invoke a method by declaring type and name
    ///
    /// The overload is chosen by the runtime types of `args`.
    ///
    /// # Errors
    /// Returns error if no such type or method exists, or the call fails.
    pub fn call_by_name(
        &self,
        type_name: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let params: Vec<&str> = args.iter().map(Value::type_name).collect();
        let target = self.find_method(type_name, method, &params).ok_or_else(|| {
            let type_known = self
                .modules
                .read()
                .iter()
                .any(|m| m.find_type(type_name).is_some());
            if type_known {
                RuntimeError::MethodNotFound {
                    type_name: type_name.to_string(),
                    method: method.to_string(),
                    params: params.join(", "),
                }
            } else {
                RuntimeError::UnknownType(type_name.to_string())
            }
        })?;
        self.invoke(target.handle(), args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detour::Priority;
    use crate::ir::{BinaryOp, Body, Expr, Stmt};
    use crate::method::{MethodBody, MethodFlags, MethodSignature};
    use crate::module::{ModuleOrigin, TypeDef};

    fn native_const(program: &Program, ty: &str, name: &str, value: i64) -> MethodDef {
        MethodDef::new(
            program.allocate_handle(),
            MethodSignature::new(ty, name, vec![], "int"),
            MethodFlags::default(),
            MethodBody::native(move |_| Ok(Value::Int(value))),
        )
    }

    fn load(program: &Program, name: &str, origin: ModuleOrigin, ty: TypeDef) -> Arc<LoadedModule> {
        let mut module = ModuleBuilder::new(name, origin);
        module.add_type(ty);
        program.load_module(module).unwrap()
    }

    #[test]
    fn call_by_name_runs_native_body() {
        let program = Program::new();
        let mut ty = TypeDef::new("T");
        ty.add_method(native_const(&program, "T", "m", 7));
        load(&program, "base", ModuleOrigin::InMemory, ty);

        assert_eq!(program.call_by_name("T", "m", vec![]), Ok(Value::Int(7)));
        assert_eq!(
            program.call_by_name("U", "m", vec![]),
            Err(RuntimeError::UnknownType("U".into()))
        );
        assert!(matches!(
            program.call_by_name("T", "m", vec![Value::Int(1)]),
            Err(RuntimeError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn detour_redirects_calls() {
        let program = Program::new();
        let mut base = TypeDef::new("T");
        base.add_method(native_const(&program, "T", "m", 1));
        let base = load(&program, "base", ModuleOrigin::InMemory, base);

        let mut hot = TypeDef::new("T");
        hot.add_method(native_const(&program, "T", "m", 2));
        let hot = load(&program, "hot", ModuleOrigin::HotReload { generation: 1 }, hot);

        let original = base.types()[0].methods()[0].handle();
        let replacement = hot.types()[0].methods()[0].handle();

        let id = program.detours().install(original, replacement, Priority::HIGHEST);
        assert_eq!(program.call_by_name("T", "m", vec![]), Ok(Value::Int(2)));

        program.detours().remove(id);
        assert_eq!(program.call_by_name("T", "m", vec![]), Ok(Value::Int(1)));
    }

    #[test]
    fn hot_generations_are_never_reused() {
        let program = Program::new();
        assert_eq!(program.next_hot_generation(), 1);
        assert_eq!(program.next_hot_generation(), 2);
        assert_eq!(program.next_hot_generation(), 3);
    }

    #[test]
    fn find_method_skips_hot_modules() {
        let program = Program::new();
        let mut hot = TypeDef::new("T");
        hot.add_method(native_const(&program, "T", "m", 2));
        load(&program, "hot", ModuleOrigin::HotReload { generation: 1 }, hot);
        assert!(program.find_method("T", "m", &[]).is_none());
    }

    #[test]
    fn duplicate_module_and_handle_rejected() {
        let program = Program::new();
        let method = native_const(&program, "T", "m", 1);
        let handle = method.handle();

        let mut ty = TypeDef::new("T");
        ty.add_method(method.clone());
        load(&program, "base", ModuleOrigin::InMemory, ty.clone());

        let err = program
            .load_module(ModuleBuilder::new("base", ModuleOrigin::InMemory))
            .unwrap_err();
        assert_eq!(err, RuntimeError::DuplicateModule("base".into()));

        let mut other = ModuleBuilder::new("other", ModuleOrigin::InMemory);
        other.add_type(ty);
        assert_eq!(
            program.load_module(other).unwrap_err(),
            RuntimeError::DuplicateHandle(handle)
        );
        assert_eq!(program.module_count(), 1);
    }

    #[test]
    fn interpreted_recursion_and_loops() {
        let program = Program::new();
        let fact = program.allocate_handle();

        // fact(n) = if n <= 1 { 1 } else { n * fact(n - 1) }
        let body = Body::new(
            1,
            vec![
                Stmt::If {
                    cond: Expr::binary(BinaryOp::Le, Expr::Load(0), Expr::constant(1)),
                    then_branch: vec![Stmt::Return(Some(Expr::constant(1)))],
                    else_branch: vec![],
                },
                Stmt::Return(Some(Expr::binary(
                    BinaryOp::Mul,
                    Expr::Load(0),
                    Expr::call(
                        fact,
                        vec![Expr::binary(BinaryOp::Sub, Expr::Load(0), Expr::constant(1))],
                    ),
                ))),
            ],
        );

        // sum(n) = { let i = 0; let s = 0; while i < n { i = i + 1; s = s + i; } s }
        let sum = program.allocate_handle();
        let sum_body = Body::new(
            3,
            vec![
                Stmt::Store { slot: 1, value: Expr::constant(0) },
                Stmt::Store { slot: 2, value: Expr::constant(0) },
                Stmt::While {
                    cond: Expr::binary(BinaryOp::Lt, Expr::Load(1), Expr::Load(0)),
                    body: vec![
                        Stmt::Store {
                            slot: 1,
                            value: Expr::binary(BinaryOp::Add, Expr::Load(1), Expr::constant(1)),
                        },
                        Stmt::Store {
                            slot: 2,
                            value: Expr::binary(BinaryOp::Add, Expr::Load(2), Expr::Load(1)),
                        },
                    ],
                },
                Stmt::Return(Some(Expr::Load(2))),
            ],
        );

        let mut ty = TypeDef::new("Math");
        ty.add_method(MethodDef::new(
            fact,
            MethodSignature::new("Math", "fact", vec!["int".into()], "int"),
            MethodFlags::default(),
            MethodBody::interpreted(body),
        ));
        ty.add_method(MethodDef::new(
            sum,
            MethodSignature::new("Math", "sum", vec!["int".into()], "int"),
            MethodFlags::default(),
            MethodBody::interpreted(sum_body),
        ));
        load(&program, "math", ModuleOrigin::InMemory, ty);

        assert_eq!(program.invoke(fact, vec![Value::Int(5)]), Ok(Value::Int(120)));
        assert_eq!(program.invoke(sum, vec![Value::Int(4)]), Ok(Value::Int(10)));
        assert!(matches!(
            program.invoke(fact, vec![]),
            Err(RuntimeError::ArityMismatch { expected: 1, found: 0, .. })
        ));
    }

    #[test]
    fn call_depth_is_bounded() {
        let program = Program::new().with_max_call_depth(8);
        let looping = program.allocate_handle();
        let mut ty = TypeDef::new("Loop");
        ty.add_method(MethodDef::new(
            looping,
            MethodSignature::new("Loop", "forever", vec![], "unit"),
            MethodFlags::default(),
            MethodBody::interpreted(Body::new(0, vec![Stmt::Eval(Expr::call(looping, vec![]))])),
        ));
        load(&program, "loop", ModuleOrigin::InMemory, ty);

        assert_eq!(
            program.invoke(looping, vec![]),
            Err(RuntimeError::CallDepthExceeded(8))
        );
    }

    #[test]
    fn short_circuit_skips_rhs() {
        let program = Program::new();
        let boom = program.allocate_handle();
        let guard = program.allocate_handle();

        let mut ty = TypeDef::new("G");
        ty.add_method(MethodDef::new(
            boom,
            MethodSignature::new("G", "boom", vec![], "bool"),
            MethodFlags::default(),
            MethodBody::native(|_| Err(RuntimeError::native("evaluated"))),
        ));
        ty.add_method(MethodDef::new(
            guard,
            MethodSignature::new("G", "guard", vec![], "bool"),
            MethodFlags::default(),
            MethodBody::interpreted(Body::new(
                0,
                vec![Stmt::Return(Some(Expr::binary(
                    BinaryOp::And,
                    Expr::constant(false),
                    Expr::call(boom, vec![]),
                )))],
            )),
        ));
        load(&program, "g", ModuleOrigin::InMemory, ty);

        assert_eq!(program.invoke(guard, vec![]), Ok(Value::Bool(false)));
    }
}
