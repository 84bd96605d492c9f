//! core::component
//!
//! Immutable component data bundles.
//!
//! A component groups the attributes of one aspect of an object (its
//! description, its flow equation, its diagram position). Which kinds of
//! components an object must carry is declared by the metamodel; the data
//! itself is an opaque attribute bundle to everything except the consumers
//! reading it through a domain view.
//!
//! Component data is a value: it is cloned, never aliased, when snapshots
//! are derived, which is what keeps historical frames immutable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::ObjectId;
use super::value::Value;

/// Attribute name used by the single-value convenience constructor.
pub const VALUE_ATTRIBUTE: &str = "value";

/// An immutable bundle of named attribute values for one component kind.
///
/// # Example
///
/// ```
/// use strata::core::component::ComponentData;
///
/// let description = ComponentData::new()
///     .with("name", "Tank")
///     .with("note", "water reservoir");
/// assert_eq!(description.get("name").unwrap().as_str(), Some("Tank"));
///
/// // Single-value components use the "value" attribute
/// let flow = ComponentData::value(10);
/// assert_eq!(flow.get("value").unwrap().as_int(), Some(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentData {
    attributes: BTreeMap<String, Value>,
}

impl ComponentData {
    /// Create an empty component data bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bundle holding a single value under [`VALUE_ATTRIBUTE`].
    pub fn value(value: impl Into<Value>) -> Self {
        Self::new().with(VALUE_ATTRIBUTE, value)
    }

    /// Add an attribute, consuming and returning the bundle.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Get an attribute value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Iterate over attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check whether the bundle has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Object identities referenced from any attribute value.
    pub fn references(&self) -> Vec<ObjectId> {
        self.attributes
            .values()
            .flat_map(|value| value.references())
            .collect()
    }
}
