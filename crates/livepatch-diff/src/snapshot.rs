//! Point-in-time view of the methods a program is running

use crate::key::MethodKey;
use livepatch_runtime::{MethodFlags, MethodHandle, MethodSignature, ModuleId, Program};
use std::collections::HashMap;

/// A method as seen in the running program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningMethod {
    /// Handle callers use
    pub handle: MethodHandle,
    /// Full signature
    pub signature: MethodSignature,
    /// Flags, including the never-patch marker
    pub flags: MethodFlags,
}

/// Where a running type was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningType {
    /// Owning module
    pub module: ModuleId,
    /// Owning module name
    pub module_name: String,
}

/// Every patchable type and method in the program, keyed for joining
///
/// Only modules that did not come from a hot reload are considered, in load
/// order, and only the first module defining a type contributes that type's
/// methods.
#[derive(Debug, Default)]
pub struct ProgramSnapshot {
    types: HashMap<String, RunningType>,
    methods: HashMap<MethodKey, RunningMethod>,
}

impl ProgramSnapshot {
    /// Capture the program, narrowed to `included_modules` when non-empty
    #[must_use]
    pub fn capture(program: &Program, included_modules: &[String]) -> Self {
        let mut snapshot = Self::default();
        let modules = program
            .modules()
            .into_iter()
            .filter(|m| !m.origin().is_hot_reload())
            .filter(|m| included_modules.is_empty() || included_modules.iter().any(|n| n == m.name()));

        for module in modules {
            for ty in module.types() {
                if snapshot.types.contains_key(ty.full_name()) {
                    continue;
                }
                snapshot.types.insert(
                    ty.full_name().to_string(),
                    RunningType {
                        module: module.id(),
                        module_name: module.name().to_string(),
                    },
                );
                for method in ty.methods() {
                    snapshot
                        .methods
                        .entry(MethodKey::from(method.signature()))
                        .or_insert_with(|| RunningMethod {
                            handle: method.handle(),
                            signature: method.signature().clone(),
                            flags: method.flags(),
                        });
                }
            }
        }
        snapshot
    }

    /// Where a type with this full name is running
    #[inline]
    #[must_use]
    pub fn running_type(&self, full_name: &str) -> Option<&RunningType> {
        self.types.get(full_name)
    }

    /// Running method with exactly this key
    #[inline]
    #[must_use]
    pub fn method(&self, key: &MethodKey) -> Option<&RunningMethod> {
        self.methods.get(key)
    }

    /// Number of types captured
    #[inline]
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of methods captured
    #[inline]
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}
