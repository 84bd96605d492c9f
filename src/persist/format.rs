//! persist::format
//!
//! Container records for the persisted store (format v1).
//!
//! # Container Shape
//!
//! One JSON document with three members:
//!
//! ```json
//! {
//!   "info":      { "kind": "strata.store", "format_version": 1, "...": "..." },
//!   "snapshots": [ { "snapshot_id": 1, "object_id": 1, "type": "Stock", "components": {} } ],
//!   "frames":    [ { "frame_id": 1, "parent": null, "objects": [[1, 1]], "created_at": "..." } ]
//! }
//! ```
//!
//! Records are independent and keyed by stable ids, so a damaged or
//! truncated collection degrades to missing entries rather than an
//! unparseable blob.
//!
//! # Version Dispatch
//!
//! The `info` member is parsed twice: first as a bare envelope (`kind`,
//! `format_version`) to reject foreign or unrecognized containers before
//! anything else is interpreted, then strictly as the full header record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::component::ComponentData;
use crate::core::frame::Frame;
use crate::core::snapshot::ObjectSnapshot;
use crate::core::types::{ComponentKind, FrameId, ObjectId, SnapshotId, TypeTag, UtcTimestamp};

use super::PersistError;

/// The kind identifier for store containers.
pub const STORE_KIND: &str = "strata.store";

/// Current container format version.
pub const FORMAT_VERSION: u32 = 1;

/// Envelope for version dispatch before full parsing.
#[derive(Debug, Deserialize)]
struct Envelope {
    kind: String,
    format_version: u32,
}

/// The container header record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InfoRecord {
    /// Kind identifier (always "strata.store").
    pub kind: String,
    /// Container format version.
    pub format_version: u32,
    /// Name of the metamodel the container was written for.
    pub metamodel: String,
    /// Persisted store identity, preserved across save/load round trips.
    pub store_id: Uuid,
    /// When the container was written.
    pub saved_at: UtcTimestamp,
    /// The head frame at save time. When absent, the most recently written
    /// frame becomes head on load.
    #[serde(default)]
    pub head: Option<FrameId>,
}

/// One self-contained snapshot record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SnapshotRecord {
    /// Snapshot identity, unique in the container.
    pub snapshot_id: SnapshotId,
    /// Identity of the logical object.
    pub object_id: ObjectId,
    /// Object type name, validated against the metamodel on load.
    #[serde(rename = "type")]
    pub type_tag: TypeTag,
    /// Component data by kind.
    pub components: BTreeMap<ComponentKind, ComponentData>,
}

impl SnapshotRecord {
    /// Build a record from a pooled snapshot.
    pub fn from_snapshot(snapshot: &ObjectSnapshot) -> Self {
        Self {
            snapshot_id: snapshot.snapshot_id(),
            object_id: snapshot.object_id(),
            type_tag: snapshot.type_tag().clone(),
            components: snapshot.components().clone(),
        }
    }

    /// Convert the record into a domain snapshot.
    pub fn into_snapshot(self) -> ObjectSnapshot {
        ObjectSnapshot::new(
            self.snapshot_id,
            self.object_id,
            self.type_tag,
            self.components,
        )
    }
}

/// One frame record: the full object index as explicit pairs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FrameRecord {
    /// Frame identity, unique in the container.
    pub frame_id: FrameId,
    /// Parent frame; null for the root.
    pub parent: Option<FrameId>,
    /// (object, snapshot) pairs, one per live object.
    pub objects: Vec<(ObjectId, SnapshotId)>,
    /// When the frame was committed.
    pub created_at: UtcTimestamp,
}

impl FrameRecord {
    /// Build a record from a committed frame.
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            frame_id: frame.id(),
            parent: frame.parent(),
            objects: frame
                .index()
                .iter()
                .map(|(&object, &snapshot)| (object, snapshot))
                .collect(),
            created_at: frame.created_at().clone(),
        }
    }
}

/// The full container, used for serialization.
#[derive(Debug, Serialize)]
pub struct Container {
    pub info: InfoRecord,
    pub snapshots: Vec<SnapshotRecord>,
    pub frames: Vec<FrameRecord>,
}

/// Parse the container root object.
///
/// # Errors
///
/// - [`PersistError::Json`] if the document is not JSON at all
/// - [`PersistError::MalformedRecord`] if the root is not an object
pub(crate) fn parse_root(
    text: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, PersistError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(PersistError::MalformedRecord {
            collection: "container",
            detail: "root is not a JSON object".into(),
        }),
    }
}

/// Parse and verify the header record, with version dispatch.
///
/// # Errors
///
/// - [`PersistError::MissingInfo`] if the header is absent
/// - [`PersistError::InvalidKind`] for a foreign container kind
/// - [`PersistError::UnknownVersion`] for an unrecognized format version
/// - [`PersistError::MalformedRecord`] if the header cannot be parsed
pub(crate) fn parse_info(
    root: &serde_json::Map<String, serde_json::Value>,
) -> Result<InfoRecord, PersistError> {
    let value = root.get("info").ok_or(PersistError::MissingInfo)?;

    let envelope: Envelope =
        serde_json::from_value(value.clone()).map_err(|e| PersistError::MalformedRecord {
            collection: "info",
            detail: e.to_string(),
        })?;

    if envelope.kind != STORE_KIND {
        return Err(PersistError::InvalidKind {
            found: envelope.kind,
        });
    }
    if envelope.format_version != FORMAT_VERSION {
        return Err(PersistError::UnknownVersion {
            found: envelope.format_version,
        });
    }

    serde_json::from_value(value.clone()).map_err(|e| PersistError::MalformedRecord {
        collection: "info",
        detail: e.to_string(),
    })
}

/// Fetch a named collection from the container root.
///
/// Returns `Ok(None)` when the member is absent, so callers decide whether
/// absence is an error (strict load) or a recoverable issue (salvage load).
pub(crate) fn collection(
    root: &serde_json::Map<String, serde_json::Value>,
    name: &'static str,
) -> Result<Option<Vec<serde_json::Value>>, PersistError> {
    match root.get(name) {
        None => Ok(None),
        Some(value) => match value.as_array() {
            Some(array) => Ok(Some(array.clone())),
            None => Err(PersistError::MalformedRecord {
                collection: name,
                detail: "collection is not an array".into(),
            }),
        },
    }
}
