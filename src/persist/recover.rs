//! persist::recover
//!
//! Salvage loading for damaged containers.
//!
//! # Architecture
//!
//! The strict loader fails on the first structural defect; this module
//! instead keeps every record that can be interpreted and reports every
//! record it had to drop as a typed [`RecoveryIssue`]. Because container
//! records are independent and keyed by stable ids, damage degrades to
//! missing entries rather than an unreadable file.
//!
//! What salvage tolerates:
//!
//! - missing `snapshots`/`frames` collections (treated as empty)
//! - undecodable records inside a collection
//! - snapshots that violate the metamodel
//! - duplicate snapshot/frame identities (first record wins)
//! - index entries referencing missing or mismatched snapshots
//! - frames with broken parent chains, surplus roots or cycles
//! - a recorded head that no longer exists
//!
//! What stays fatal: an unreadable file, a missing or undecodable header,
//! a foreign container kind, an unrecognized format version and a
//! metamodel mismatch. Without a trusted header there is no safe
//! interpretation to salvage under.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::core::frame::Frame;
use crate::core::metamodel::Metamodel;
use crate::core::snapshot::ObjectSnapshot;
use crate::core::types::{FrameId, ObjectId, SnapshotId, UtcTimestamp};
use crate::store::{LoadedState, Store};

use super::format::{self, FrameRecord, SnapshotRecord};
use super::PersistError;

/// One defect found and worked around during salvage loading.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecoveryIssue {
    /// The snapshots collection was absent or unreadable.
    #[error("snapshots collection is missing or unreadable")]
    MissingSnapshotsCollection,

    /// The frames collection was absent or unreadable.
    #[error("frames collection is missing or unreadable")]
    MissingFramesCollection,

    /// A record inside a collection could not be decoded.
    #[error("undecodable record in '{collection}' at position {position}: {detail}")]
    UndecodableRecord {
        collection: &'static str,
        position: usize,
        detail: String,
    },

    /// A snapshot record was dropped.
    #[error("snapshot {snapshot} of object {object} dropped: {reason}")]
    SnapshotDropped {
        snapshot: SnapshotId,
        object: ObjectId,
        reason: String,
    },

    /// A later record reused an existing snapshot identity.
    #[error("duplicate snapshot id {snapshot} ignored")]
    DuplicateSnapshot { snapshot: SnapshotId },

    /// A frame record was dropped.
    #[error("frame {frame} dropped: {reason}")]
    FrameDropped { frame: FrameId, reason: String },

    /// An index entry referenced a missing or mismatched snapshot.
    #[error("frame {frame}: index entry for object {object} dropped (snapshot {snapshot})")]
    DanglingIndexEntry {
        frame: FrameId,
        object: ObjectId,
        snapshot: SnapshotId,
    },

    /// The recorded head frame did not survive; head was moved.
    #[error("recorded head frame {frame} missing, head moved to {fallback}")]
    HeadReassigned { frame: FrameId, fallback: FrameId },

    /// No frame survived; an empty root was synthesized.
    #[error("no frame survived recovery, synthesized empty root frame {frame}")]
    RootSynthesized { frame: FrameId },
}

/// What a salvage load kept and what it had to drop.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Every defect found, in discovery order.
    pub issues: Vec<RecoveryIssue>,
    /// Snapshots that made it into the recovered store.
    pub snapshots_recovered: usize,
    /// Frames that made it into the recovered store.
    pub frames_recovered: usize,
}

impl RecoveryReport {
    /// Check whether the container was loaded without any defect.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Salvage a store from container text.
pub(crate) fn salvage(
    text: &str,
    metamodel: Metamodel,
) -> Result<(Store, RecoveryReport), PersistError> {
    let root = format::parse_root(text)?;
    let info = format::parse_info(&root)?;

    if info.metamodel != metamodel.name() {
        return Err(PersistError::MetamodelMismatch {
            expected: metamodel.name().to_string(),
            found: info.metamodel,
        });
    }

    let mut issues: Vec<RecoveryIssue> = Vec::new();

    let snapshot_values = match format::collection(&root, "snapshots") {
        Ok(Some(values)) => values,
        Ok(None) | Err(_) => {
            issues.push(RecoveryIssue::MissingSnapshotsCollection);
            Vec::new()
        }
    };
    let frame_values = match format::collection(&root, "frames") {
        Ok(Some(values)) => values,
        Ok(None) | Err(_) => {
            issues.push(RecoveryIssue::MissingFramesCollection);
            Vec::new()
        }
    };

    // Snapshot pool: keep everything that decodes and validates.
    let mut pool: BTreeMap<SnapshotId, ObjectSnapshot> = BTreeMap::new();
    for (position, value) in snapshot_values.into_iter().enumerate() {
        let record: SnapshotRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                issues.push(RecoveryIssue::UndecodableRecord {
                    collection: "snapshots",
                    position,
                    detail: e.to_string(),
                });
                continue;
            }
        };

        if let Err(e) = metamodel.validate(&record.type_tag, record.components.keys()) {
            issues.push(RecoveryIssue::SnapshotDropped {
                snapshot: record.snapshot_id,
                object: record.object_id,
                reason: e.to_string(),
            });
            continue;
        }
        if pool.contains_key(&record.snapshot_id) {
            issues.push(RecoveryIssue::DuplicateSnapshot {
                snapshot: record.snapshot_id,
            });
            continue;
        }

        pool.insert(record.snapshot_id, record.into_snapshot());
    }

    // Frames: keep decodable records, dropping index entries that do not
    // resolve against the recovered pool.
    let mut frames: BTreeMap<FrameId, Frame> = BTreeMap::new();
    let mut frame_order: Vec<FrameId> = Vec::new();
    for (position, value) in frame_values.into_iter().enumerate() {
        let record: FrameRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                issues.push(RecoveryIssue::UndecodableRecord {
                    collection: "frames",
                    position,
                    detail: e.to_string(),
                });
                continue;
            }
        };

        if frames.contains_key(&record.frame_id) {
            issues.push(RecoveryIssue::FrameDropped {
                frame: record.frame_id,
                reason: "duplicate frame id".into(),
            });
            continue;
        }

        let mut index: BTreeMap<ObjectId, SnapshotId> = BTreeMap::new();
        for (object, snapshot) in record.objects {
            let resolves = pool
                .get(&snapshot)
                .map(|pooled| pooled.object_id() == object)
                .unwrap_or(false);
            if !resolves {
                issues.push(RecoveryIssue::DanglingIndexEntry {
                    frame: record.frame_id,
                    object,
                    snapshot,
                });
                continue;
            }
            index.insert(object, snapshot);
        }

        frame_order.push(record.frame_id);
        frames.insert(
            record.frame_id,
            Frame::new(record.frame_id, record.parent, index, record.created_at),
        );
    }

    // Resolve every frame to the root its parent chain reaches, if any.
    let mut root_of: BTreeMap<FrameId, Option<FrameId>> = BTreeMap::new();
    for &id in &frame_order {
        let mut path: Vec<FrameId> = Vec::new();
        let mut current = id;
        let reached: Option<FrameId> = loop {
            if let Some(&known) = root_of.get(&current) {
                break known;
            }
            if path.contains(&current) {
                break None; // cycle
            }
            path.push(current);
            match frames.get(&current) {
                None => break None, // broken chain
                Some(frame) => match frame.parent() {
                    None => break Some(current),
                    Some(parent) => current = parent,
                },
            }
        };
        for visited in path {
            root_of.insert(visited, reached);
        }
    }

    // Keep the tree containing the recorded head, else the first root found.
    let first_root = frame_order
        .iter()
        .copied()
        .find(|id| root_of.get(id).copied().flatten() == Some(*id));
    let preferred_root = info
        .head
        .and_then(|head| root_of.get(&head).copied().flatten())
        .or(first_root);

    let mut kept: BTreeMap<FrameId, Frame> = BTreeMap::new();
    let mut kept_order: Vec<FrameId> = Vec::new();
    for &id in &frame_order {
        let reached = root_of.get(&id).copied().flatten();
        match (reached, preferred_root) {
            (Some(root), Some(preferred)) if root == preferred => {
                if let Some(frame) = frames.remove(&id) {
                    kept.insert(id, frame);
                    kept_order.push(id);
                }
            }
            _ => {
                let reason = match reached {
                    None => "parent chain is broken or cyclic".to_string(),
                    Some(root) => format!("unreachable from the recovered root (own root {})", root),
                };
                issues.push(RecoveryIssue::FrameDropped { frame: id, reason });
            }
        }
    }

    // Head: recorded if it survived, else the most recent surviving frame,
    // else a synthesized empty root.
    let head = match info.head {
        Some(recorded) if kept.contains_key(&recorded) => recorded,
        recorded => match kept_order.last().copied() {
            Some(fallback) => {
                if let Some(frame) = recorded {
                    issues.push(RecoveryIssue::HeadReassigned { frame, fallback });
                }
                fallback
            }
            None => {
                let root_id = FrameId::new(1);
                kept.insert(
                    root_id,
                    Frame::new(root_id, None, BTreeMap::new(), UtcTimestamp::now()),
                );
                kept_order.push(root_id);
                issues.push(RecoveryIssue::RootSynthesized { frame: root_id });
                root_id
            }
        },
    };

    // Drop snapshots no surviving frame references.
    let mut live: BTreeSet<SnapshotId> = BTreeSet::new();
    for frame in kept.values() {
        live.extend(frame.index().values().copied());
    }
    let orphans: Vec<SnapshotId> = pool
        .keys()
        .copied()
        .filter(|id| !live.contains(id))
        .collect();
    for id in orphans {
        if let Some(snapshot) = pool.remove(&id) {
            issues.push(RecoveryIssue::SnapshotDropped {
                snapshot: id,
                object: snapshot.object_id(),
                reason: "unreferenced by any recovered frame".into(),
            });
        }
    }

    let report = RecoveryReport {
        issues,
        snapshots_recovered: pool.len(),
        frames_recovered: kept.len(),
    };
    let store = Store::from_loaded(
        metamodel,
        LoadedState {
            store_id: info.store_id,
            snapshots: pool,
            frames: kept,
            frame_order: kept_order,
            head,
        },
    );

    Ok((store, report))
}
