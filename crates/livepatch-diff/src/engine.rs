//! Method resolution: hash join of compiled symbols against the running program

use crate::report::{DiffReport, MethodChange, UnmatchedMethod, UnmatchedReason};
use crate::snapshot::ProgramSnapshot;
use crate::table::SymbolTable;
use livepatch_compile::CompiledModule;
use livepatch_runtime::{LoadedModule, Program};
use tracing::debug;

/// Matches compiled methods to running methods by signature
///
/// Every method of a changed file is treated as changed; bodies are never
/// compared.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    included_modules: Vec<String>,
}

impl DiffEngine {
    /// Engine that searches every module
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Search only the named modules; empty means all
    #[must_use]
    pub fn with_included_modules(mut self, modules: Vec<String>) -> Self {
        self.included_modules = modules;
        self
    }

    /// Replace the module filter
    pub fn set_included_modules(&mut self, modules: Vec<String>) {
        self.included_modules = modules;
    }

    /// Diff a compilation result; a failed compilation has nothing to diff
    #[must_use]
    pub fn diff(&self, compiled: &CompiledModule, program: &Program) -> DiffReport {
        match compiled.module() {
            Some(module) if compiled.success() => self.diff_module(module, program),
            _ => DiffReport::default(),
        }
    }

    /// Diff a loaded module against the rest of the program
    #[must_use]
    pub fn diff_module(&self, module: &LoadedModule, program: &Program) -> DiffReport {
        let snapshot = ProgramSnapshot::capture(program, &self.included_modules);
        let table = SymbolTable::from_module(module);
        let mut report = DiffReport {
            skipped_generated: table.skipped().to_vec(),
            ..DiffReport::default()
        };

        for entry in table.entries() {
            if snapshot.running_type(&entry.key.type_name).is_none() {
                debug!("{} has no running type; not patched", entry.key);
                report.unmatched.push(UnmatchedMethod {
                    signature: entry.signature.clone(),
                    reason: UnmatchedReason::NewType,
                });
                continue;
            }

            match snapshot.method(&entry.key) {
                Some(original) => report.changes.push(MethodChange {
                    original: original.handle,
                    replacement: entry.handle,
                    signature: original.signature.clone(),
                    original_flags: original.flags,
                    replacement_module: table.module_name().to_string(),
                }),
                None => {
                    debug!("{} has no running counterpart; not patched", entry.key);
                    report.unmatched.push(UnmatchedMethod {
                        signature: entry.signature.clone(),
                        reason: UnmatchedReason::NewSignature,
                    });
                }
            }
        }

        debug!(
            module = table.module_name(),
            changes = report.changes.len(),
            unmatched = report.unmatched.len(),
            skipped = report.skipped_generated.len(),
            "diff complete"
        );
        report
    }
}
