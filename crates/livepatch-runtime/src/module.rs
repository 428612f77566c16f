//! Loaded modules and the types they define

use crate::handle::ModuleId;
use crate::method::MethodDef;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a module came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Compiled from an on-disk source tree at this location
    Disk(PathBuf),
    /// Built by the host in memory, no resolvable location
    InMemory,
    /// Produced by a live patch compilation
    HotReload {
        /// Compilation counter of the adapter that produced it
        generation: u64,
    },
}

impl ModuleOrigin {
    /// On-disk location, if any
    #[inline]
    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        match self {
            Self::Disk(path) => Some(path.as_path()),
            _ => None,
        }
    }

    /// Whether this module came from a live patch
    #[inline]
    #[must_use]
    pub fn is_hot_reload(&self) -> bool {
        matches!(self, Self::HotReload { .. })
    }

    /// Whether the module has no on-disk image
    #[inline]
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, Self::Disk(_))
    }
}

/// A type and its declared methods
#[derive(Debug, Clone)]
pub struct TypeDef {
    full_name: String,
    methods: Vec<Arc<MethodDef>>,
}

impl TypeDef {
    /// Create an empty type
    #[inline]
    #[must_use]
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            methods: Vec::new(),
        }
    }

    /// Add a declared method
    pub fn add_method(&mut self, method: MethodDef) -> &mut Self {
        self.methods.push(Arc::new(method));
        self
    }

    /// Full dotted name
    #[inline]
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Last segment of the full name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit_once('.')
            .map_or(self.full_name.as_str(), |(_, name)| name)
    }

    /// Namespace portion of the full name, if any
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.full_name.rsplit_once('.').map(|(ns, _)| ns)
    }

    /// Declared methods in declaration order
    #[inline]
    #[must_use]
    pub fn methods(&self) -> &[Arc<MethodDef>] {
        &self.methods
    }

    /// Find a declared method by name and exact parameter types
    #[must_use]
    pub fn find_method(&self, name: &str, params: &[&str]) -> Option<&Arc<MethodDef>> {
        self.methods.iter().find(|m| {
            m.name() == name
                && m.signature().params.len() == params.len()
                && m.signature().params.iter().zip(params).all(|(a, b)| a == b)
        })
    }

    /// All declared methods with this name
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<MethodDef>> {
        self.methods.iter().filter(move |m| m.name() == name)
    }
}

/// A module loaded into the program
#[derive(Debug)]
pub struct LoadedModule {
    id: ModuleId,
    name: String,
    origin: ModuleOrigin,
    types: Vec<TypeDef>,
}

impl LoadedModule {
    pub(crate) fn new(id: ModuleId, builder: ModuleBuilder) -> Self {
        Self {
            id,
            name: builder.name,
            origin: builder.origin,
            types: builder.types,
        }
    }

    /// Load-order id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Module name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Origin
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &ModuleOrigin {
        &self.origin
    }

    /// Types defined by this module
    #[inline]
    #[must_use]
    pub fn types(&self) -> &[TypeDef] {
        &self.types
    }

    /// Find a type by full name
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.full_name() == full_name)
    }

    /// Number of methods across all types
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.types.iter().map(|t| t.methods().len()).sum()
    }
}

/// Builder for a module about to be loaded
#[derive(Debug)]
pub struct ModuleBuilder {
    name: String,
    origin: ModuleOrigin,
    types: Vec<TypeDef>,
}

impl ModuleBuilder {
    /// Create an empty module
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, origin: ModuleOrigin) -> Self {
        Self {
            name: name.into(),
            origin,
            types: Vec::new(),
        }
    }

    /// Add a type
    pub fn add_type(&mut self, ty: TypeDef) -> &mut Self {
        self.types.push(ty);
        self
    }

    /// Module name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Types added so far
    #[inline]
    #[must_use]
    pub fn types(&self) -> &[TypeDef] {
        &self.types
    }
}
