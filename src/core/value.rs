//! core::value
//!
//! Attribute values stored inside component data.
//!
//! # Representation
//!
//! A [`Value`] is one of: null, boolean, integer, float, string, 2D point,
//! object reference or list of object references. Object references are the
//! only way component data may point at other domain objects; they are
//! resolved through the store and participate in referential-integrity
//! checking at commit time. Nested mutable substructure is deliberately not
//! representable.
//!
//! # Serialization
//!
//! Values serialize with an explicit `type` tag so that a damaged container
//! record stays independently interpretable.

use serde::{Deserialize, Serialize};

use super::types::ObjectId;

/// An attribute value inside component data.
///
/// # Example
///
/// ```
/// use strata::core::types::ObjectId;
/// use strata::core::value::Value;
///
/// let flow: Value = 10.into();
/// assert_eq!(flow.as_int(), Some(10));
/// assert_eq!(flow.as_float(), Some(10.0));
///
/// let target = Value::Ref(ObjectId::new(3));
/// assert_eq!(target.references(), vec![ObjectId::new(3)]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// No value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    String(String),
    /// 2D point, e.g. a diagram position.
    Point { x: f64, y: f64 },
    /// Reference to another object, resolved through the store.
    Ref(ObjectId),
    /// References to other objects, resolved through the store.
    RefList(Vec<ObjectId>),
}

impl Value {
    /// Check whether this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Get the integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Get the numeric value as a float.
    ///
    /// Integers are promoted, so solver code can read any numeric attribute
    /// uniformly.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Get the text value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    /// Get the referenced object, if this is a single reference.
    pub fn as_ref_id(&self) -> Option<ObjectId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Object identities referenced by this value.
    ///
    /// Empty for everything except `Ref` and `RefList`.
    pub fn references(&self) -> Vec<ObjectId> {
        match self {
            Value::Ref(id) => vec![*id],
            Value::RefList(ids) => ids.clone(),
            _ => vec![],
        }
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::String(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::String(text)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Ref(id)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(flag) => write!(f, "{}", flag),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::String(text) => write!(f, "{}", text),
            Value::Point { x, y } => write!(f, "({}, {})", x, y),
            Value::Ref(id) => write!(f, "@{}", id),
            Value::RefList(ids) => {
                write!(f, "[")?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "@{}", id)?;
                }
                write!(f, "]")
            }
        }
    }
}
