//! Name resolution against the batch and the running program

use livepatch_runtime::{primitive, LoadedModule, MethodHandle};
use std::collections::HashMap;
use std::sync::Arc;

/// Placeholder type for expressions that already produced an error
pub(crate) const ERROR_TYPE: &str = "{error}";

/// Whether two types are interchangeable for checking purposes
pub(crate) fn compatible(a: &str, b: &str) -> bool {
    a == b || a == ERROR_TYPE || b == ERROR_TYPE
}

/// A callable visible to the compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMethod {
    /// Handle calls bind to
    pub handle: MethodHandle,
    /// Method name
    pub name: String,
    /// Parameter type names
    pub params: Vec<String>,
    /// Return type name
    pub return_type: String,
}

impl CatalogMethod {
    fn accepts(&self, args: &[String]) -> bool {
        self.params.len() == args.len() && self.params.iter().zip(args).all(|(p, a)| p == a)
    }
}

/// Why a call could not be bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallError {
    /// Nothing with this name
    UnknownMethod,
    /// Overloads exist, none takes these argument types
    NoOverload(Vec<Vec<String>>),
}

/// Types and methods visible to one compilation
///
/// Types declared by the batch shadow program types of the same name, so
/// calls inside a batch bind to the batch's own methods.
#[derive(Debug, Default)]
pub struct Catalog {
    types: HashMap<String, TypeEntry>,
}

#[derive(Debug, Default)]
struct TypeEntry {
    from_batch: bool,
    methods: Vec<CatalogMethod>,
}

impl Catalog {
    /// Catalog of every type defined by `modules`; the first definition wins
    #[must_use]
    pub fn from_references(modules: &[Arc<LoadedModule>]) -> Self {
        let mut types: HashMap<String, TypeEntry> = HashMap::new();
        for module in modules {
            for ty in module.types() {
                if types.contains_key(ty.full_name()) {
                    continue;
                }
                let methods = ty
                    .methods()
                    .iter()
                    .map(|m| CatalogMethod {
                        handle: m.handle(),
                        name: m.name().to_string(),
                        params: m.signature().params.clone(),
                        return_type: m.signature().return_type.clone(),
                    })
                    .collect();
                types.insert(
                    ty.full_name().to_string(),
                    TypeEntry {
                        from_batch: false,
                        methods,
                    },
                );
            }
        }
        Self { types }
    }

    /// Declare a type from the batch; returns `false` if the batch already has it
    pub fn declare_batch_type(&mut self, full_name: &str) -> bool {
        match self.types.get(full_name) {
            Some(entry) if entry.from_batch => false,
            _ => {
                self.types.insert(
                    full_name.to_string(),
                    TypeEntry {
                        from_batch: true,
                        methods: Vec::new(),
                    },
                );
                true
            }
        }
    }

    /// Register a batch method; returns `false` on a duplicate signature
    pub fn add_batch_method(&mut self, type_name: &str, method: CatalogMethod) -> bool {
        let entry = self.types.entry(type_name.to_string()).or_default();
        if entry
            .methods
            .iter()
            .any(|m| m.name == method.name && m.params == method.params)
        {
            return false;
        }
        entry.methods.push(method);
        true
    }

    /// Whether a type with this full name is visible
    #[must_use]
    pub fn has_type(&self, full_name: &str) -> bool {
        self.types.contains_key(full_name)
    }

    /// Resolve a written type name to a full name
    ///
    /// Built-in names resolve to themselves. Other names are tried relative
    /// to `namespace` first, then as written.
    #[must_use]
    pub fn resolve_type_name(&self, written: &str, namespace: Option<&str>) -> Option<String> {
        if primitive::is_primitive(written) {
            return Some(written.to_string());
        }
        if let Some(ns) = namespace {
            let qualified = format!("{ns}.{written}");
            if self.has_type(&qualified) {
                return Some(qualified);
            }
        }
        self.has_type(written).then(|| written.to_string())
    }

    /// Bind a call by exact argument types
    pub(crate) fn bind(
        &self,
        type_name: &str,
        method: &str,
        args: &[String],
    ) -> Result<&CatalogMethod, CallError> {
        select_overload(&self.methods_named(type_name, method), args)
    }

    /// Every overload of `method` on `type_name`
    pub(crate) fn methods_named(&self, type_name: &str, method: &str) -> Vec<&CatalogMethod> {
        self.types
            .get(type_name)
            .map(|e| e.methods.iter().filter(|m| m.name == method).collect())
            .unwrap_or_default()
    }
}

/// Pick the first candidate whose parameter types equal `args`
pub(crate) fn select_overload<'a>(
    candidates: &[&'a CatalogMethod],
    args: &[String],
) -> Result<&'a CatalogMethod, CallError> {
    if candidates.is_empty() {
        return Err(CallError::UnknownMethod);
    }
    candidates
        .iter()
        .find(|m| m.accepts(args))
        .copied()
        .ok_or_else(|| CallError::NoOverload(candidates.iter().map(|m| m.params.clone()).collect()))
}
