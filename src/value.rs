//! Tagged value representation
//!
//! The public operation surface accepts dynamically shaped values, but every
//! id is bound to a fixed type at registration. `Variant` is the tagged
//! runtime representation; type checks happen once at the store boundary and
//! never silently coerce.

use serde::{Deserialize, Serialize};

/// Runtime value for scalar cells, dict values, list items and signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Unit payload (empty signals)
    Empty,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

/// Type tag bound to an id at registration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Empty,
    Bool,
    Int,
    UInt,
    Float,
    Text,
}

impl Variant {
    /// Type tag of this value
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::Empty => VariantKind::Empty,
            Variant::Bool(_) => VariantKind::Bool,
            Variant::Int(_) => VariantKind::Int,
            Variant::UInt(_) => VariantKind::UInt,
            Variant::Float(_) => VariantKind::Float,
            Variant::Text(_) => VariantKind::Text,
        }
    }

    /// Zero value for a kind, used as the initial content of a cell
    pub fn default_for(kind: VariantKind) -> Variant {
        match kind {
            VariantKind::Empty => Variant::Empty,
            VariantKind::Bool => Variant::Bool(false),
            VariantKind::Int => Variant::Int(0),
            VariantKind::UInt => Variant::UInt(0),
            VariantKind::Float => Variant::Float(0.0),
            VariantKind::Text => Variant::Text(String::new()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Variant::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Variant::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Variant::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for VariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VariantKind::Empty => "empty",
            VariantKind::Bool => "bool",
            VariantKind::Int => "int",
            VariantKind::UInt => "uint",
            VariantKind::Float => "float",
            VariantKind::Text => "text",
        };
        write!(f, "{name}")
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}

impl From<u64> for Variant {
    fn from(v: u64) -> Self {
        Variant::UInt(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Float(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::Text(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::Text(v)
    }
}

/// Hashable value used for dict keys
///
/// Floats are intentionally excluded so keys always have total equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Text(String),
}

/// Type tag for dict keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKeyKind {
    Bool,
    Int,
    UInt,
    Text,
}

impl VariantKey {
    /// Type tag of this key
    pub fn kind(&self) -> VariantKeyKind {
        match self {
            VariantKey::Bool(_) => VariantKeyKind::Bool,
            VariantKey::Int(_) => VariantKeyKind::Int,
            VariantKey::UInt(_) => VariantKeyKind::UInt,
            VariantKey::Text(_) => VariantKeyKind::Text,
        }
    }
}

impl std::fmt::Display for VariantKeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VariantKeyKind::Bool => "bool",
            VariantKeyKind::Int => "int",
            VariantKeyKind::UInt => "uint",
            VariantKeyKind::Text => "text",
        };
        write!(f, "{name}")
    }
}

impl From<i64> for VariantKey {
    fn from(v: i64) -> Self {
        VariantKey::Int(v)
    }
}

impl From<u64> for VariantKey {
    fn from(v: u64) -> Self {
        VariantKey::UInt(v)
    }
}

impl From<&str> for VariantKey {
    fn from(v: &str) -> Self {
        VariantKey::Text(v.to_string())
    }
}

impl From<String> for VariantKey {
    fn from(v: String) -> Self {
        VariantKey::Text(v)
    }
}
