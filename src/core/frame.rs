//! core::frame
//!
//! Immutable version frames.
//!
//! A [`Frame`] is a complete, consistent mapping from every live object
//! identity to the snapshot representing its state "as of" this frame.
//! Frames form the version graph: a rooted tree linked by parent pointers,
//! which is the backbone of undo/redo and time travel. Once committed, a
//! frame never changes; object identities the commit did not touch share
//! their snapshot entries with the parent frame.

use std::collections::BTreeMap;

use super::types::{Fingerprint, FrameId, ObjectId, SnapshotId, UtcTimestamp};

/// One immutable version of the whole object graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    id: FrameId,
    parent: Option<FrameId>,
    index: BTreeMap<ObjectId, SnapshotId>,
    created_at: UtcTimestamp,
}

impl Frame {
    /// Create a frame from its parts.
    ///
    /// The root frame has no parent; every other frame records the frame it
    /// was committed from.
    pub fn new(
        id: FrameId,
        parent: Option<FrameId>,
        index: BTreeMap<ObjectId, SnapshotId>,
        created_at: UtcTimestamp,
    ) -> Self {
        Self {
            id,
            parent,
            index,
            created_at,
        }
    }

    /// The frame's identity.
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// The parent frame, if any.
    pub fn parent(&self) -> Option<FrameId> {
        self.parent
    }

    /// When the frame was committed.
    pub fn created_at(&self) -> &UtcTimestamp {
        &self.created_at
    }

    /// The full object index: object identity to snapshot identity.
    pub fn index(&self) -> &BTreeMap<ObjectId, SnapshotId> {
        &self.index
    }

    /// Check whether the frame contains an object.
    pub fn contains(&self, object: ObjectId) -> bool {
        self.index.contains_key(&object)
    }

    /// The snapshot representing an object's state in this frame.
    pub fn snapshot_of(&self, object: ObjectId) -> Option<SnapshotId> {
        self.index.get(&object).copied()
    }

    /// Object identities live in this frame, in id order.
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.index.keys().copied()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check whether the frame has no live objects.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Stable hash of the object index, for comparing versions.
    ///
    /// Two frames fingerprint equal exactly when they map the same object
    /// identities to the same snapshots.
    pub fn fingerprint(&self) -> Fingerprint {
        let entries: Vec<_> = self
            .index
            .iter()
            .map(|(&object, &snapshot)| (object, snapshot))
            .collect();
        Fingerprint::compute(&entries)
    }
}
