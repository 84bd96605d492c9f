//! store::working
//!
//! The uncommitted working set of an edit session.
//!
//! A working set is seeded from the head frame's object index when an edit
//! session begins. Creates, amends and removals mutate only this structure;
//! nothing is visible to any domain view until the session commits. The
//! snapshots derived during the session live in `pending` until commit
//! publishes the ones the final index still references into the store pool.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::frame::Frame;
use crate::core::snapshot::ObjectSnapshot;
use crate::core::types::{FrameId, ObjectId, SnapshotId};

/// Mutable, uncommitted object index plus the snapshots derived so far.
#[derive(Debug)]
pub(crate) struct WorkingSet {
    /// Frame the session was started from.
    base: FrameId,
    /// Object index being edited.
    index: BTreeMap<ObjectId, SnapshotId>,
    /// Snapshots created during this session, keyed by snapshot identity.
    pending: BTreeMap<SnapshotId, ObjectSnapshot>,
    /// Objects removed during this session.
    removed: BTreeSet<ObjectId>,
}

impl WorkingSet {
    /// Seed a working set from a frame's object index.
    pub(crate) fn from_frame(frame: &Frame) -> Self {
        Self {
            base: frame.id(),
            index: frame.index().clone(),
            pending: BTreeMap::new(),
            removed: BTreeSet::new(),
        }
    }

    /// The frame the session was started from.
    pub(crate) fn base(&self) -> FrameId {
        self.base
    }

    /// Whether the session has made any edits.
    pub(crate) fn has_changes(&self) -> bool {
        !self.pending.is_empty() || !self.removed.is_empty()
    }

    /// Check whether an object is present in the working index.
    pub(crate) fn contains(&self, object: ObjectId) -> bool {
        self.index.contains_key(&object)
    }

    /// The snapshot currently indexed for an object.
    pub(crate) fn index_of(&self, object: ObjectId) -> Option<SnapshotId> {
        self.index.get(&object).copied()
    }

    /// A snapshot derived during this session, if the id names one.
    pub(crate) fn pending(&self, snapshot: SnapshotId) -> Option<&ObjectSnapshot> {
        self.pending.get(&snapshot)
    }

    /// Iterate over the working index entries.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (ObjectId, SnapshotId)> + '_ {
        self.index.iter().map(|(&object, &snapshot)| (object, snapshot))
    }

    /// Insert a newly created object's first snapshot.
    pub(crate) fn insert(&mut self, snapshot: ObjectSnapshot) {
        let object = snapshot.object_id();
        let id = snapshot.snapshot_id();
        self.pending.insert(id, snapshot);
        self.index.insert(object, id);
        self.removed.remove(&object);
    }

    /// Replace an object's indexed snapshot with a newly derived one.
    pub(crate) fn replace(&mut self, object: ObjectId, snapshot: ObjectSnapshot) {
        let id = snapshot.snapshot_id();
        self.pending.insert(id, snapshot);
        self.index.insert(object, id);
    }

    /// Remove an object from the working index.
    ///
    /// A tombstone, not a deletion: snapshots already in the pool stay
    /// reachable from historical frames.
    pub(crate) fn remove(&mut self, object: ObjectId) {
        if self.index.remove(&object).is_some() {
            self.removed.insert(object);
        }
    }

    /// Tear the working set apart for commit.
    pub(crate) fn into_parts(
        self,
    ) -> (
        BTreeMap<ObjectId, SnapshotId>,
        BTreeMap<SnapshotId, ObjectSnapshot>,
    ) {
        (self.index, self.pending)
    }
}
