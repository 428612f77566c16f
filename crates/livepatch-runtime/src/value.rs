//! Runtime values

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Built-in type names
pub mod primitive {
    /// The empty value
    pub const UNIT: &str = "unit";
    /// Booleans
    pub const BOOL: &str = "bool";
    /// 64-bit signed integers
    pub const INT: &str = "int";
    /// 64-bit floats
    pub const FLOAT: &str = "float";
    /// UTF-8 strings
    pub const STR: &str = "str";

    /// All built-in type names
    pub const ALL: [&str; 5] = [UNIT, BOOL, INT, FLOAT, STR];

    /// Check whether a type name is built in
    #[inline]
    #[must_use]
    pub fn is_primitive(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// A value flowing through method calls
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// `()`
    #[default]
    Unit,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    Str(String),
}

impl Value {
    /// Name of this value's type
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Unit => primitive::UNIT,
            Self::Bool(_) => primitive::BOOL,
            Self::Int(_) => primitive::INT,
            Self::Float(_) => primitive::FLOAT,
            Self::Str(_) => primitive::STR,
        }
    }

    /// Integer payload
    #[inline]
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload
    #[inline]
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => write!(f, "()"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        assert_eq!(Value::Unit.type_name(), "unit");
        assert_eq!(Value::from(3).type_name(), "int");
        assert_eq!(Value::from("x").type_name(), "str");
        assert!(primitive::is_primitive("float"));
        assert!(!primitive::is_primitive("Game.Player"));
    }

    #[test]
    fn display() {
        assert_eq!(Value::Unit.to_string(), "()");
        assert_eq!(Value::Int(-4).to_string(), "-4");
        assert_eq!(Value::from("hi").to_string(), "hi");
    }
}
