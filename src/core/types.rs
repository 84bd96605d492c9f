//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ObjectId`] - Stable identity of one logical object across its history
//! - [`SnapshotId`] - Identity of one immutable historical object state
//! - [`FrameId`] - Identity of one version frame
//! - [`TypeTag`] - Validated object type name
//! - [`ComponentKind`] - Validated component kind name
//! - [`IdSequence`] - Sequential identity allocation, restartable from
//!   persisted state
//! - [`UtcTimestamp`] - RFC3339 timestamp
//! - [`Fingerprint`] - Stable hash over a frame's object index, for version
//!   comparison
//!
//! # Validation
//!
//! Name types enforce validity at construction time. Invalid values cannot
//! be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use strata::core::types::{ComponentKind, ObjectId, TypeTag};
//!
//! // Valid constructions
//! let tag = TypeTag::new("Stock").unwrap();
//! let kind = ComponentKind::new("Flow").unwrap();
//! let id = ObjectId::new(1);
//!
//! // Invalid constructions fail at creation time
//! assert!(TypeTag::new("").is_err());
//! assert!(ComponentKind::new("3-phase").is_err());
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid type tag: {0}")]
    InvalidTypeTag(String),

    #[error("invalid component kind: {0}")]
    InvalidComponentKind(String),
}

/// Stable identity of one logical object.
///
/// An object identity is assigned once, at object creation, and never
/// changes or gets reused. All snapshots of "the same" object across its
/// edit history share one `ObjectId`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ObjectId(u64);

/// Identity of one immutable historical state of one object.
///
/// A fresh `SnapshotId` is allocated whenever an object's component data
/// changes. Snapshot identities are never mutated or reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SnapshotId(u64);

/// Identity of one version frame in the version graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct FrameId(u64);

macro_rules! impl_raw_id {
    ($name:ident) => {
        impl $name {
            /// Wrap a raw identifier value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Get the raw identifier value.
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

impl_raw_id!(ObjectId);
impl_raw_id!(SnapshotId);
impl_raw_id!(FrameId);

/// Sequential identity allocator.
///
/// Used by the store to assign object, snapshot and frame identities.
/// Identities start at 1 and are never reused. After loading a persisted
/// container, the sequence is advanced past every identity seen on disk
/// with [`mark_used`](Self::mark_used).
///
/// # Example
///
/// ```
/// use strata::core::types::IdSequence;
///
/// let mut seq = IdSequence::new();
/// assert_eq!(seq.next(), 1);
/// assert_eq!(seq.next(), 2);
///
/// seq.mark_used(10);
/// assert_eq!(seq.next(), 11);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSequence {
    next: u64,
}

impl IdSequence {
    /// Create a new sequence starting at 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Get the next unused identity and advance the sequence.
    pub fn next(&mut self) -> u64 {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        id
    }

    /// Mark an identity as used, so it will not be generated again.
    pub fn mark_used(&mut self, id: u64) {
        if id >= self.next {
            self.next = id.saturating_add(1);
        }
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated object type name.
///
/// Type tags must be non-empty ASCII identifiers: the first character must
/// be a letter, the rest letters, digits, `_`, `-` or `.`.
///
/// # Example
///
/// ```
/// use strata::core::types::TypeTag;
///
/// let tag = TypeTag::new("Stock").unwrap();
/// assert_eq!(tag.as_str(), "Stock");
///
/// assert!(TypeTag::new("").is_err());
/// assert!(TypeTag::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeTag(String);

impl TypeTag {
    /// Create a new validated type tag.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidTypeTag` if the name is not a valid
    /// identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_name(&name)
            .map_err(|reason| TypeError::InvalidTypeTag(format!("'{}' {}", name, reason)))?;
        Ok(Self(name))
    }

    /// Get the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A validated component kind name.
///
/// Component kinds follow the same identifier rules as [`TypeTag`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentKind(String);

impl ComponentKind {
    /// Create a new validated component kind.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidComponentKind` if the name is not a valid
    /// identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_name(&name)
            .map_err(|reason| TypeError::InvalidComponentKind(format!("'{}' {}", name, reason)))?;
        Ok(Self(name))
    }

    /// Get the kind as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validate an identifier-style name shared by type tags and component kinds.
fn validate_name(name: &str) -> Result<(), &'static str> {
    let mut chars = name.chars();

    let first = match chars.next() {
        Some(c) => c,
        None => return Err("cannot be empty"),
    };
    if !first.is_ascii_alphabetic() {
        return Err("must start with an ASCII letter");
    }

    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.') {
            return Err("may only contain ASCII letters, digits, '_', '-' and '.'");
        }
    }

    Ok(())
}

macro_rules! impl_name_type {
    ($name:ident) => {
        impl TryFrom<String> for $name {
            type Error = TypeError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> Self {
                name.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

impl_name_type!(TypeTag);
impl_name_type!(ComponentKind);

/// A UTC timestamp in RFC3339 format.
///
/// # Example
///
/// ```
/// use strata::core::types::UtcTimestamp;
///
/// let now = UtcTimestamp::now();
/// println!("Current time: {}", now);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Create a timestamp from a chrono DateTime.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self(dt)
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// A stable hash over a frame's object index.
///
/// Two frames with the same fingerprint map every object identity to the
/// same snapshot, so their visible state is identical. Used to compare
/// versions across branches and to verify save/load round trips.
///
/// # Example
///
/// ```
/// use strata::core::types::{Fingerprint, ObjectId, SnapshotId};
///
/// let entries = vec![
///     (ObjectId::new(1), SnapshotId::new(4)),
///     (ObjectId::new(2), SnapshotId::new(7)),
/// ];
///
/// // Same entries produce the same fingerprint, regardless of order
/// let fp1 = Fingerprint::compute(&entries);
/// let reversed: Vec<_> = entries.iter().rev().copied().collect();
/// let fp2 = Fingerprint::compute(&reversed);
/// assert_eq!(fp1, fp2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint from a set of (object, snapshot) pairs.
    ///
    /// The entries are sorted before hashing to ensure determinism
    /// regardless of input order.
    pub fn compute(entries: &[(ObjectId, SnapshotId)]) -> Self {
        let mut sorted: Vec<_> = entries.to_vec();
        sorted.sort();

        let mut hasher = Sha256::new();
        for (object, snapshot) in sorted {
            hasher.update(object.raw().to_be_bytes());
            hasher.update(b"\0");
            hasher.update(snapshot.raw().to_be_bytes());
            hasher.update(b"\n");
        }

        let result = hasher.finalize();
        Self(hex::encode(result))
    }

    /// Get the fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod ids {
        use super::*;

        #[test]
        fn display_is_raw_value() {
            assert_eq!(ObjectId::new(7).to_string(), "7");
            assert_eq!(SnapshotId::new(42).to_string(), "42");
            assert_eq!(FrameId::new(0).to_string(), "0");
        }

        #[test]
        fn ordering_follows_raw_value() {
            assert!(ObjectId::new(1) < ObjectId::new(2));
            assert!(FrameId::new(9) > FrameId::new(3));
        }

        #[test]
        fn serde_is_transparent() {
            let id = SnapshotId::new(12);
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, "12");
            let parsed: SnapshotId = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, id);
        }
    }

    mod id_sequence {
        use super::*;

        #[test]
        fn starts_at_one() {
            let mut seq = IdSequence::new();
            assert_eq!(seq.next(), 1);
            assert_eq!(seq.next(), 2);
            assert_eq!(seq.next(), 3);
        }

        #[test]
        fn mark_used_advances() {
            let mut seq = IdSequence::new();
            seq.mark_used(5);
            assert_eq!(seq.next(), 6);
        }

        #[test]
        fn mark_used_below_current_is_noop() {
            let mut seq = IdSequence::new();
            seq.mark_used(10);
            seq.mark_used(3);
            assert_eq!(seq.next(), 11);
        }
    }

    mod type_tag {
        use super::*;

        #[test]
        fn valid_tags() {
            assert!(TypeTag::new("Stock").is_ok());
            assert!(TypeTag::new("flow_rate").is_ok());
            assert!(TypeTag::new("a").is_ok());
            assert!(TypeTag::new("Node-2.1").is_ok());
        }

        #[test]
        fn empty_rejected() {
            assert!(TypeTag::new("").is_err());
        }

        #[test]
        fn leading_digit_rejected() {
            assert!(TypeTag::new("3phase").is_err());
        }

        #[test]
        fn leading_punctuation_rejected() {
            assert!(TypeTag::new("_hidden").is_err());
            assert!(TypeTag::new("-flag").is_err());
        }

        #[test]
        fn special_chars_rejected() {
            assert!(TypeTag::new("has space").is_err());
            assert!(TypeTag::new("a/b").is_err());
            assert!(TypeTag::new("a:b").is_err());
        }

        #[test]
        fn serde_roundtrip() {
            let tag = TypeTag::new("Stock").unwrap();
            let json = serde_json::to_string(&tag).unwrap();
            let parsed: TypeTag = serde_json::from_str(&json).unwrap();
            assert_eq!(tag, parsed);
        }

        #[test]
        fn serde_rejects_invalid() {
            let result: Result<TypeTag, _> = serde_json::from_str("\"not valid!\"");
            assert!(result.is_err());
        }
    }

    mod component_kind {
        use super::*;

        #[test]
        fn valid_kinds() {
            assert!(ComponentKind::new("Description").is_ok());
            assert!(ComponentKind::new("Flow").is_ok());
            assert!(ComponentKind::new("position_2d").is_ok());
        }

        #[test]
        fn invalid_kinds() {
            assert!(ComponentKind::new("").is_err());
            assert!(ComponentKind::new("2d").is_err());
            assert!(ComponentKind::new("has tab\t").is_err());
        }
    }

    mod fingerprint {
        use super::*;

        #[test]
        fn deterministic() {
            let entries = vec![
                (ObjectId::new(1), SnapshotId::new(10)),
                (ObjectId::new(2), SnapshotId::new(20)),
            ];
            assert_eq!(
                Fingerprint::compute(&entries),
                Fingerprint::compute(&entries)
            );
        }

        #[test]
        fn order_independent() {
            let forward = vec![
                (ObjectId::new(1), SnapshotId::new(10)),
                (ObjectId::new(2), SnapshotId::new(20)),
            ];
            let backward: Vec<_> = forward.iter().rev().copied().collect();
            assert_eq!(
                Fingerprint::compute(&forward),
                Fingerprint::compute(&backward)
            );
        }

        #[test]
        fn different_entries_different_fingerprint() {
            let a = vec![(ObjectId::new(1), SnapshotId::new(10))];
            let b = vec![(ObjectId::new(1), SnapshotId::new(11))];
            assert_ne!(Fingerprint::compute(&a), Fingerprint::compute(&b));
        }

        #[test]
        fn empty_entries() {
            let fp = Fingerprint::compute(&[]);
            assert!(!fp.as_str().is_empty());
        }
    }

    mod utc_timestamp {
        use super::*;

        #[test]
        fn now_works() {
            let ts = UtcTimestamp::now();
            assert!(ts.to_string().contains('T'));
        }

        #[test]
        fn serde_roundtrip() {
            let ts = UtcTimestamp::now();
            let json = serde_json::to_string(&ts).unwrap();
            let parsed: UtcTimestamp = serde_json::from_str(&json).unwrap();
            assert_eq!(ts, parsed);
        }
    }
}
