//! Symbol table of a freshly compiled module

use crate::generated::is_matchable;
use crate::key::MethodKey;
use livepatch_runtime::{LoadedModule, MethodHandle, MethodSignature};

/// One compiled method, ready to be joined against the program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    /// Join key
    pub key: MethodKey,
    /// Handle of the compiled method
    pub handle: MethodHandle,
    /// Full signature
    pub signature: MethodSignature,
}

/// Methods of a module, split into matchable entries and skipped generated members
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    module_name: String,
    entries: Vec<SymbolEntry>,
    skipped: Vec<MethodSignature>,
}

impl SymbolTable {
    /// Build the table for `module`, in declaration order
    #[must_use]
    pub fn from_module(module: &LoadedModule) -> Self {
        let mut table = Self {
            module_name: module.name().to_string(),
            ..Self::default()
        };
        for ty in module.types() {
            for method in ty.methods() {
                let signature = method.signature().clone();
                if is_matchable(method.name()) {
                    table.entries.push(SymbolEntry {
                        key: MethodKey::from(&signature),
                        handle: method.handle(),
                        signature,
                    });
                } else {
                    table.skipped.push(signature);
                }
            }
        }
        table
    }

    /// Name of the module the table was built from
    #[inline]
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Matchable methods
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[SymbolEntry] {
        &self.entries
    }

    /// Generated members excluded from matching
    #[inline]
    #[must_use]
    pub fn skipped(&self) -> &[MethodSignature] {
        &self.skipped
    }
}
