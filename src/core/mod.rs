//! core
//!
//! Core domain types and schemas for Strata.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ObjectId, SnapshotId, FrameId, TypeTag, etc.
//! - [`value`] - Attribute value union stored inside component data
//! - [`component`] - Immutable component data bundles
//! - [`metamodel`] - Object type schema and the single validation checkpoint
//! - [`snapshot`] - Immutable versioned object snapshots
//! - [`frame`] - Immutable version frames (object index + parent link)
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Snapshots and frames are immutable once published
//! - Structural validation happens in the metamodel and nowhere else

pub mod component;
pub mod frame;
pub mod metamodel;
pub mod snapshot;
pub mod types;
pub mod value;
