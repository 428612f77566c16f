//! Join key for method matching

use livepatch_runtime::MethodSignature;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Identity of a method for matching: declaring type, name and parameter types
///
/// The return type is not part of the key: two methods that differ only in
/// return type are the same method for patching purposes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodKey {
    /// Declaring type full name
    pub type_name: String,
    /// Method name
    pub name: String,
    /// Parameter type full names, in order
    pub params: Vec<String>,
}

impl MethodKey {
    /// Create a key
    #[must_use]
    pub fn new(type_name: impl Into<String>, name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            params,
        }
    }
}

impl From<&MethodSignature> for MethodKey {
    fn from(sig: &MethodSignature) -> Self {
        Self::new(sig.declaring_type.clone(), sig.name.clone(), sig.params.clone())
    }
}

impl Display for MethodKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}({})", self.type_name, self.name, self.params.join(", "))
    }
}
