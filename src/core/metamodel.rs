//! core::metamodel
//!
//! Object type schema: which component kinds an object of a given type must
//! carry.
//!
//! # Architecture
//!
//! The metamodel is the single structural validation checkpoint. The store
//! invokes it when objects are created and again when a working set is
//! committed; no other component re-validates structure. The metamodel is
//! loaded once at store construction and is immutable for the session's
//! lifetime - schema evolution across persisted containers is treated as a
//! fatal incompatibility by the persistence layer.
//!
//! # Declarations
//!
//! A metamodel can be built programmatically with [`Metamodel::declare_component`]
//! and [`Metamodel::declare_type`], or loaded from a TOML document:
//!
//! ```toml
//! name = "flows"
//! components = ["Description", "Flow", "Position"]
//!
//! [[types]]
//! name = "Stock"
//! components = ["Description", "Flow"]
//!
//! [[types]]
//! name = "Note"
//! components = ["Description"]
//! ```
//!
//! Declarations are strictly parsed (unknown fields rejected) and validated
//! after parsing: a type referencing an unregistered component kind is a
//! schema error.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use super::types::{ComponentKind, TypeError, TypeTag};

/// Errors from metamodel declaration and validation.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Reference to a type the metamodel does not declare.
    #[error("unknown object type '{tag}'")]
    UnknownType { tag: TypeTag },

    /// A type was declared twice.
    #[error("object type '{tag}' is already declared")]
    DuplicateType { tag: TypeTag },

    /// A type declaration references a component kind that is not registered.
    #[error("component kind '{kind}' is not declared in the metamodel")]
    UnknownComponent { kind: ComponentKind },

    /// A component kind was registered twice.
    #[error("component kind '{kind}' is already declared")]
    DuplicateComponent { kind: ComponentKind },

    /// An object is missing a component kind its type requires.
    #[error("type '{tag}' requires component '{kind}'")]
    MissingComponent { tag: TypeTag, kind: ComponentKind },

    /// An object carries a component kind its type does not declare.
    #[error("type '{tag}' does not declare component '{kind}'")]
    UndeclaredComponent { tag: TypeTag, kind: ComponentKind },

    /// A declaration document could not be parsed.
    #[error("failed to parse metamodel declaration: {0}")]
    Parse(String),

    /// A declaration document could not be read.
    #[error("failed to read metamodel declaration: {0}")]
    Io(#[from] std::io::Error),

    /// A declaration contains an invalid name.
    #[error("invalid name in metamodel declaration: {0}")]
    Type(#[from] TypeError),
}

/// Declaration of one object type: its name and required component kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTypeSpec {
    name: TypeTag,
    components: BTreeSet<ComponentKind>,
}

impl ObjectTypeSpec {
    /// The type's name.
    pub fn name(&self) -> &TypeTag {
        &self.name
    }

    /// The component kinds an object of this type must carry, exactly.
    pub fn components(&self) -> &BTreeSet<ComponentKind> {
        &self.components
    }

    /// Check whether this type declares the given component kind.
    pub fn declares(&self, kind: &ComponentKind) -> bool {
        self.components.contains(kind)
    }
}

/// The metamodel: a named registry of component kinds and object types.
///
/// # Example
///
/// ```
/// use strata::core::metamodel::Metamodel;
/// use strata::core::types::{ComponentKind, TypeTag};
///
/// let mut metamodel = Metamodel::new("flows");
/// let description = ComponentKind::new("Description").unwrap();
/// let flow = ComponentKind::new("Flow").unwrap();
/// metamodel.declare_component(description.clone()).unwrap();
/// metamodel.declare_component(flow.clone()).unwrap();
///
/// let stock = TypeTag::new("Stock").unwrap();
/// metamodel
///     .declare_type(stock.clone(), [description.clone(), flow.clone()])
///     .unwrap();
///
/// // The exact kind set is valid; a subset is not
/// assert!(metamodel.validate(&stock, [&description, &flow]).is_ok());
/// assert!(metamodel.validate(&stock, [&description]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metamodel {
    name: String,
    components: BTreeSet<ComponentKind>,
    types: BTreeMap<TypeTag, ObjectTypeSpec>,
}

impl Metamodel {
    /// Create an empty metamodel with the given name.
    ///
    /// The name identifies the schema in the persisted container header;
    /// opening a container written for a differently named metamodel fails.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: BTreeSet::new(),
            types: BTreeMap::new(),
        }
    }

    /// The metamodel's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a component kind.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateComponent`] if the kind is already
    /// registered.
    pub fn declare_component(&mut self, kind: ComponentKind) -> Result<(), SchemaError> {
        if !self.components.insert(kind.clone()) {
            return Err(SchemaError::DuplicateComponent { kind });
        }
        Ok(())
    }

    /// Declare an object type with its required component kinds.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::DuplicateType`] if the type is already declared
    /// - [`SchemaError::UnknownComponent`] if any referenced kind is not
    ///   registered
    pub fn declare_type(
        &mut self,
        tag: TypeTag,
        kinds: impl IntoIterator<Item = ComponentKind>,
    ) -> Result<(), SchemaError> {
        if self.types.contains_key(&tag) {
            return Err(SchemaError::DuplicateType { tag });
        }

        let mut components = BTreeSet::new();
        for kind in kinds {
            if !self.components.contains(&kind) {
                return Err(SchemaError::UnknownComponent { kind });
            }
            components.insert(kind);
        }

        self.types.insert(
            tag.clone(),
            ObjectTypeSpec {
                name: tag,
                components,
            },
        );
        Ok(())
    }

    /// Registered component kinds in name order.
    pub fn component_kinds(&self) -> impl Iterator<Item = &ComponentKind> {
        self.components.iter()
    }

    /// Declared type tags in name order.
    pub fn type_tags(&self) -> impl Iterator<Item = &TypeTag> {
        self.types.keys()
    }

    /// Check whether a type is declared.
    pub fn contains_type(&self, tag: &TypeTag) -> bool {
        self.types.contains_key(tag)
    }

    /// Get the declaration of a type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownType`] if the type is not declared.
    pub fn type_spec(&self, tag: &TypeTag) -> Result<&ObjectTypeSpec, SchemaError> {
        self.types
            .get(tag)
            .ok_or_else(|| SchemaError::UnknownType { tag: tag.clone() })
    }

    /// Validate that a component kind set matches a type's declaration
    /// exactly.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::UnknownType`] if the type is not declared
    /// - [`SchemaError::MissingComponent`] for a required kind that is absent
    /// - [`SchemaError::UndeclaredComponent`] for a present kind the type
    ///   does not declare
    pub fn validate<'a>(
        &self,
        tag: &TypeTag,
        kinds: impl IntoIterator<Item = &'a ComponentKind>,
    ) -> Result<(), SchemaError> {
        let spec = self.type_spec(tag)?;
        let present: BTreeSet<&ComponentKind> = kinds.into_iter().collect();

        for kind in &spec.components {
            if !present.contains(kind) {
                return Err(SchemaError::MissingComponent {
                    tag: tag.clone(),
                    kind: kind.clone(),
                });
            }
        }

        for kind in present {
            if !spec.components.contains(kind) {
                return Err(SchemaError::UndeclaredComponent {
                    tag: tag.clone(),
                    kind: kind.clone(),
                });
            }
        }

        Ok(())
    }

    /// Parse a metamodel from a TOML declaration document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] for malformed TOML or unknown fields,
    /// and the corresponding declaration error for invalid names, duplicate
    /// declarations or references to unregistered kinds.
    pub fn from_toml_str(doc: &str) -> Result<Self, SchemaError> {
        let doc: MetamodelDoc =
            toml::from_str(doc).map_err(|e| SchemaError::Parse(e.to_string()))?;

        let mut metamodel = Metamodel::new(doc.name);

        for kind in doc.components {
            metamodel.declare_component(ComponentKind::new(kind)?)?;
        }

        for type_doc in doc.types {
            let tag = TypeTag::new(type_doc.name)?;
            let mut kinds = Vec::with_capacity(type_doc.components.len());
            for kind in type_doc.components {
                kinds.push(ComponentKind::new(kind)?);
            }
            metamodel.declare_type(tag, kinds)?;
        }

        Ok(metamodel)
    }

    /// Load a metamodel from a TOML declaration file.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let doc = fs::read_to_string(path)?;
        Self::from_toml_str(&doc)
    }
}

/// TOML shape of a metamodel declaration document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MetamodelDoc {
    name: String,
    #[serde(default)]
    components: Vec<String>,
    #[serde(default)]
    types: Vec<TypeDoc>,
}

/// TOML shape of one type declaration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeDoc {
    name: String,
    #[serde(default)]
    components: Vec<String>,
}
