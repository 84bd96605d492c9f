//! store
//!
//! The store engine: working set, commit protocol, undo/redo/time-travel
//! navigation, read-only views, retention pruning and the cross-process
//! store lock.
//!
//! # Lifecycle
//!
//! An editor session asks the store for a mutable working copy of the
//! current frame ([`Store::begin_edit`]), applies edits (which clone-on-write
//! into new snapshots), then commits ([`Store::commit`]), producing a new
//! frame whose unchanged object identities structurally share snapshots with
//! the parent. Reads go through a [`DomainView`] bound to any frame, current
//! or historical.
//!
//! # The version graph state machine
//!
//! Frames form a rooted tree via parent links; `head` names the frame the
//! session is viewing and editing from. `undo` moves head to its parent and
//! records the departed frame as the parent's redo target; `redo` follows
//! that target; a commit from a frame discards the frame's redo target, so
//! the abandoned branch stays reachable only by explicit [`Store::goto`].
//!
//! # Failure atomicity
//!
//! A failed mutation leaves the working set and the frame tree exactly as
//! before the call. Commit validates the complete working set before it
//! publishes anything.

mod lock;
mod view;
mod working;

pub use lock::{LockError, StoreLock};
pub use view::{DomainView, ViewError};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use thiserror::Error;
use uuid::Uuid;

use crate::core::component::ComponentData;
use crate::core::frame::Frame;
use crate::core::metamodel::{Metamodel, SchemaError};
use crate::core::snapshot::ObjectSnapshot;
use crate::core::types::{
    ComponentKind, Fingerprint, FrameId, IdSequence, ObjectId, SnapshotId, TypeTag, UtcTimestamp,
};
use crate::persist::{self, PersistError, RecoveryReport};

use working::WorkingSet;

/// Errors from the mutation and commit protocol.
#[derive(Debug, Error)]
pub enum EditError {
    /// A second edit session was attempted while one is open.
    #[error("an edit session is already open")]
    ConcurrentEdit,

    /// A mutation or commit was attempted with no edit session open.
    #[error("no edit session is open")]
    NoActiveEdit,

    /// Reference to an object the working set does not contain.
    #[error("object {object} does not exist in the working set")]
    UnknownObject { object: ObjectId },

    /// Component structure of a new object disagrees with the metamodel.
    #[error("component structure does not match the metamodel: {0}")]
    Schema(#[from] SchemaError),

    /// Component structure of an existing object disagrees with the
    /// metamodel.
    #[error("schema violation for object {object}: {source}")]
    SchemaViolation { object: ObjectId, source: SchemaError },

    /// An object's component values reference objects absent from the
    /// working set.
    #[error("object {object} references missing object(s) {}", format_ids(.missing))]
    BrokenReference {
        object: ObjectId,
        missing: Vec<ObjectId>,
    },

    /// The working set references a snapshot the pool does not hold.
    ///
    /// Signals a store-internal invariant violation.
    #[error("object {object} is indexed at snapshot {snapshot} missing from the pool")]
    DanglingSnapshot {
        object: ObjectId,
        snapshot: SnapshotId,
    },

    /// The underlying frame lookup failed.
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

/// Errors from undo/redo/time-travel navigation and pruning.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    /// Undo at the root frame.
    #[error("frame {frame} has no parent to undo to")]
    NoParent { frame: FrameId },

    /// Redo with no recorded (or an invalidated) redo target.
    #[error("frame {frame} has no redo target")]
    NoRedoTarget { frame: FrameId },

    /// Reference to a frame the version graph does not contain.
    #[error("frame {frame} does not exist")]
    UnknownFrame { frame: FrameId },

    /// Navigation or pruning attempted while an edit session is open.
    #[error("not allowed while an edit session is open")]
    EditInProgress,
}

fn format_ids(ids: &[ObjectId]) -> String {
    let parts: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    parts.join(", ")
}

/// Which frames a garbage-collection pass must keep.
///
/// The ancestor chain of `head` is always retained; the policy adds frames
/// whose chains must survive as well (for example branches kept around for
/// comparison).
#[derive(Debug, Clone, Default)]
pub struct RetentionPolicy {
    pinned: BTreeSet<FrameId>,
}

impl RetentionPolicy {
    /// Retain only the head's ancestor chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Additionally retain a frame and its ancestor chain.
    pub fn pin(mut self, frame: FrameId) -> Self {
        self.pinned.insert(frame);
        self
    }

    /// The pinned frames.
    pub fn pinned(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.pinned.iter().copied()
    }
}

/// What a garbage-collection pass removed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Frames removed from the version graph.
    pub frames_removed: Vec<FrameId>,
    /// Snapshots no longer referenced by any retained frame.
    pub snapshots_removed: Vec<SnapshotId>,
}

impl PruneReport {
    /// Check whether the pass removed nothing.
    pub fn is_noop(&self) -> bool {
        self.frames_removed.is_empty() && self.snapshots_removed.is_empty()
    }
}

/// The versioned graph object store.
///
/// Owns the snapshot pool and the frame tree, exposes the mutation/commit
/// protocol and undo/redo/time-travel navigation, and manages persistence.
///
/// # Example
///
/// ```
/// use strata::core::component::ComponentData;
/// use strata::core::metamodel::Metamodel;
/// use strata::core::types::{ComponentKind, TypeTag};
/// use strata::core::value::Value;
/// use strata::store::Store;
///
/// # fn main() -> anyhow::Result<()> {
/// let mut metamodel = Metamodel::new("flows");
/// let description = ComponentKind::new("Description")?;
/// let flow = ComponentKind::new("Flow")?;
/// metamodel.declare_component(description.clone())?;
/// metamodel.declare_component(flow.clone())?;
/// let stock = TypeTag::new("Stock")?;
/// metamodel.declare_type(stock.clone(), [description.clone(), flow.clone()])?;
///
/// let mut store = Store::create(metamodel);
///
/// store.begin_edit()?;
/// let tank = store.create_object(
///     stock,
///     [
///         (description, ComponentData::value("Tank")),
///         (flow.clone(), ComponentData::value(Value::Null)),
///     ]
///     .into_iter()
///     .collect(),
/// )?;
/// let first = store.commit()?;
///
/// store.begin_edit()?;
/// store.amend(tank, flow.clone(), ComponentData::value(10))?;
/// let second = store.commit()?;
///
/// store.undo()?;
/// assert!(store.current_view()?.component(tank, &flow)?.get("value").unwrap().is_null());
/// store.redo()?;
/// assert_eq!(store.head(), second);
/// # let _ = first;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Store {
    metamodel: Metamodel,
    store_id: Uuid,
    /// Snapshot pool: every historical object state reachable from a frame.
    snapshots: BTreeMap<SnapshotId, ObjectSnapshot>,
    /// The version graph.
    frames: BTreeMap<FrameId, Frame>,
    /// Frames in creation (= persistence) order.
    frame_order: Vec<FrameId>,
    head: FrameId,
    /// Per-frame redo slot: the child last departed from by undo.
    redo_targets: HashMap<FrameId, FrameId>,
    working: Option<WorkingSet>,
    object_ids: IdSequence,
    snapshot_ids: IdSequence,
    frame_ids: IdSequence,
    /// Held while the store is bound to a persisted file.
    lock: Option<StoreLock>,
}

/// State assembled by the persistence layer when loading a container.
pub(crate) struct LoadedState {
    pub(crate) store_id: Uuid,
    pub(crate) snapshots: BTreeMap<SnapshotId, ObjectSnapshot>,
    pub(crate) frames: BTreeMap<FrameId, Frame>,
    pub(crate) frame_order: Vec<FrameId>,
    pub(crate) head: FrameId,
}

impl Store {
    /// Create a new, empty in-memory store.
    ///
    /// The store starts with a single empty root frame as head.
    pub fn create(metamodel: Metamodel) -> Self {
        let mut frame_ids = IdSequence::new();
        let root_id = FrameId::new(frame_ids.next());
        let root = Frame::new(root_id, None, BTreeMap::new(), UtcTimestamp::now());

        let mut frames = BTreeMap::new();
        frames.insert(root_id, root);

        Self {
            metamodel,
            store_id: Uuid::new_v4(),
            snapshots: BTreeMap::new(),
            frames,
            frame_order: vec![root_id],
            head: root_id,
            redo_targets: HashMap::new(),
            working: None,
            object_ids: IdSequence::new(),
            snapshot_ids: IdSequence::new(),
            frame_ids,
            lock: None,
        }
    }

    /// Open a persisted store, acquiring its exclusive lock.
    ///
    /// The metamodel must be the one the container was written for.
    ///
    /// # Errors
    ///
    /// Any [`PersistError`]: the file may be missing, locked by another
    /// process, of an unrecognized format version, or structurally corrupt.
    /// A failed load acquires and releases the lock, leaving no store.
    pub fn open(path: &Path, metamodel: Metamodel) -> Result<Self, PersistError> {
        let lock = StoreLock::acquire(path)?;
        let mut store = persist::load(path, metamodel)?;
        store.lock = Some(lock);
        Ok(store)
    }

    /// Salvage what can be loaded from a damaged container.
    ///
    /// Undecodable or invalid records are skipped instead of failing the
    /// load; every skip is recorded in the returned [`RecoveryReport`]. An
    /// unrecognized format version remains fatal: no safe partial
    /// interpretation of an unknown format exists.
    pub fn recover(
        path: &Path,
        metamodel: Metamodel,
    ) -> Result<(Self, RecoveryReport), PersistError> {
        let lock = StoreLock::acquire(path)?;
        let (mut store, report) = persist::recover(path, metamodel)?;
        store.lock = Some(lock);
        Ok((store, report))
    }

    /// Persist the full snapshot pool and frame tree.
    ///
    /// Atomic from the caller's perspective: the container is written to a
    /// sibling temp file and renamed over the target, so a crash mid-write
    /// leaves the previous file intact.
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        persist::save(self, path)
    }

    pub(crate) fn from_loaded(metamodel: Metamodel, state: LoadedState) -> Self {
        let mut object_ids = IdSequence::new();
        let mut snapshot_ids = IdSequence::new();
        let mut frame_ids = IdSequence::new();

        for snapshot in state.snapshots.values() {
            object_ids.mark_used(snapshot.object_id().raw());
            snapshot_ids.mark_used(snapshot.snapshot_id().raw());
        }
        for frame in state.frames.values() {
            frame_ids.mark_used(frame.id().raw());
            for (&object, &snapshot) in frame.index() {
                object_ids.mark_used(object.raw());
                snapshot_ids.mark_used(snapshot.raw());
            }
        }

        Self {
            metamodel,
            store_id: state.store_id,
            snapshots: state.snapshots,
            frames: state.frames,
            frame_order: state.frame_order,
            head: state.head,
            redo_targets: HashMap::new(),
            working: None,
            object_ids,
            snapshot_ids,
            frame_ids,
            lock: None,
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// The metamodel this store validates against.
    pub fn metamodel(&self) -> &Metamodel {
        &self.metamodel
    }

    /// The persisted store identity.
    ///
    /// Generated at creation and preserved across save/load round trips.
    pub fn store_id(&self) -> Uuid {
        self.store_id
    }

    /// The frame the session is currently anchored to.
    pub fn head(&self) -> FrameId {
        self.head
    }

    /// Check whether a frame exists in the version graph.
    pub fn contains_frame(&self, frame: FrameId) -> bool {
        self.frames.contains_key(&frame)
    }

    /// Get a frame by identity.
    pub fn frame(&self, frame: FrameId) -> Result<&Frame, NavigationError> {
        self.frames
            .get(&frame)
            .ok_or(NavigationError::UnknownFrame { frame })
    }

    /// All frames in creation order.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frame_order
            .iter()
            .filter_map(move |id| self.frames.get(id))
    }

    /// The recorded redo target of a frame, if any.
    pub fn redo_target(&self, frame: FrameId) -> Option<FrameId> {
        self.redo_targets.get(&frame).copied()
    }

    /// Check whether an edit session is open.
    pub fn has_open_edit(&self) -> bool {
        self.working.is_some()
    }

    /// Check whether the open edit session has made any edits.
    ///
    /// `false` when no session is open.
    pub fn has_changes(&self) -> bool {
        self.working
            .as_ref()
            .map(|working| working.has_changes())
            .unwrap_or(false)
    }

    /// Check whether the store holds the exclusive lock of a persisted file.
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// A read-only view bound to the head frame.
    pub fn current_view(&self) -> Result<DomainView<'_>, NavigationError> {
        self.view(self.head)
    }

    /// A read-only view bound to any frame, current or historical.
    pub fn view(&self, frame: FrameId) -> Result<DomainView<'_>, NavigationError> {
        let frame = self.frame(frame)?;
        Ok(DomainView::new(self, frame))
    }

    /// Stable hash of a frame's object index, for version comparison.
    pub fn fingerprint(&self, frame: FrameId) -> Result<Fingerprint, NavigationError> {
        Ok(self.frame(frame)?.fingerprint())
    }

    pub(crate) fn pooled(&self, snapshot: SnapshotId) -> Option<&ObjectSnapshot> {
        self.snapshots.get(&snapshot)
    }

    pub(crate) fn snapshot_pool(&self) -> &BTreeMap<SnapshotId, ObjectSnapshot> {
        &self.snapshots
    }

    // ========================================================================
    // Edit protocol
    // ========================================================================

    /// Open an edit session seeded from the head frame.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::ConcurrentEdit`] if a session is already open.
    pub fn begin_edit(&mut self) -> Result<(), EditError> {
        if self.working.is_some() {
            return Err(EditError::ConcurrentEdit);
        }
        let head = self.head;
        let frame = self
            .frames
            .get(&head)
            .ok_or(NavigationError::UnknownFrame { frame: head })?;
        self.working = Some(WorkingSet::from_frame(frame));
        Ok(())
    }

    /// Discard the open edit session, if any.
    ///
    /// Returns whether a session was discarded. Has no effect on the stored
    /// frame tree.
    pub fn abandon(&mut self) -> bool {
        self.working.take().is_some()
    }

    /// Create a new object in the working set.
    ///
    /// Allocates a fresh object identity and its first snapshot. The
    /// component kind set must match the metamodel's declaration for
    /// `type_tag` exactly.
    ///
    /// # Errors
    ///
    /// - [`EditError::NoActiveEdit`] with no open session
    /// - [`EditError::Schema`] if the components disagree with the metamodel
    pub fn create_object(
        &mut self,
        type_tag: TypeTag,
        components: BTreeMap<ComponentKind, ComponentData>,
    ) -> Result<ObjectId, EditError> {
        if self.working.is_none() {
            return Err(EditError::NoActiveEdit);
        }
        self.metamodel.validate(&type_tag, components.keys())?;

        let object = ObjectId::new(self.object_ids.next());
        let snapshot_id = SnapshotId::new(self.snapshot_ids.next());
        let snapshot = ObjectSnapshot::new(snapshot_id, object, type_tag, components);

        let working = self.working.as_mut().ok_or(EditError::NoActiveEdit)?;
        working.insert(snapshot);
        Ok(object)
    }

    /// Replace one component of an object, deriving a new snapshot.
    ///
    /// The object identity is unchanged; the previous snapshot is retained
    /// and stays reachable from older frames. Returns the fresh snapshot
    /// identity.
    ///
    /// # Errors
    ///
    /// - [`EditError::NoActiveEdit`] with no open session
    /// - [`EditError::UnknownObject`] if the object is not in the working set
    /// - [`EditError::SchemaViolation`] if the kind is not declared for the
    ///   object's type
    pub fn amend(
        &mut self,
        object: ObjectId,
        kind: ComponentKind,
        data: ComponentData,
    ) -> Result<SnapshotId, EditError> {
        let working = self.working.as_ref().ok_or(EditError::NoActiveEdit)?;
        let current = working
            .index_of(object)
            .ok_or(EditError::UnknownObject { object })?;

        let base = match working.pending(current) {
            Some(snapshot) => snapshot.clone(),
            None => self
                .snapshots
                .get(&current)
                .cloned()
                .ok_or(EditError::DanglingSnapshot {
                    object,
                    snapshot: current,
                })?,
        };

        let spec = self
            .metamodel
            .type_spec(base.type_tag())
            .map_err(|source| EditError::SchemaViolation { object, source })?;
        if !spec.declares(&kind) {
            return Err(EditError::SchemaViolation {
                object,
                source: SchemaError::UndeclaredComponent {
                    tag: base.type_tag().clone(),
                    kind,
                },
            });
        }

        let snapshot_id = SnapshotId::new(self.snapshot_ids.next());
        let amended = base.amended(snapshot_id, kind, data);

        let working = self.working.as_mut().ok_or(EditError::NoActiveEdit)?;
        working.replace(object, amended);
        Ok(snapshot_id)
    }

    /// Remove an object from the working set, cascading to its dependents.
    ///
    /// Every object whose component values reference the removed object,
    /// directly or transitively, is removed with it (an edge cannot outlive
    /// its endpoint). Returns all removed identities, the requested object
    /// included.
    ///
    /// Removal is a tombstone: snapshots stay in the pool and historical
    /// frames still resolve the object.
    ///
    /// # Errors
    ///
    /// - [`EditError::NoActiveEdit`] with no open session
    /// - [`EditError::UnknownObject`] if the object is not in the working set
    pub fn remove(&mut self, object: ObjectId) -> Result<Vec<ObjectId>, EditError> {
        let working = self.working.as_ref().ok_or(EditError::NoActiveEdit)?;
        if !working.contains(object) {
            return Err(EditError::UnknownObject { object });
        }

        let mut doomed: BTreeSet<ObjectId> = BTreeSet::new();
        let mut queue = vec![object];
        while let Some(current) = queue.pop() {
            if !doomed.insert(current) {
                continue;
            }
            for (other, snapshot_id) in working.entries() {
                if doomed.contains(&other) {
                    continue;
                }
                let snapshot = match working.pending(snapshot_id) {
                    Some(snapshot) => snapshot,
                    None => {
                        self.snapshots
                            .get(&snapshot_id)
                            .ok_or(EditError::DanglingSnapshot {
                                object: other,
                                snapshot: snapshot_id,
                            })?
                    }
                };
                if snapshot.references().contains(&current) {
                    queue.push(other);
                }
            }
        }

        let working = self.working.as_mut().ok_or(EditError::NoActiveEdit)?;
        let removed: Vec<ObjectId> = doomed.into_iter().collect();
        for id in &removed {
            working.remove(*id);
        }
        Ok(removed)
    }

    /// Commit the working set, publishing it as a new frame.
    ///
    /// The whole working set is validated first; nothing is published on
    /// failure and the session stays open so the caller can fix or abandon
    /// it. A commit with no edits still creates a new frame identical in
    /// content to its parent - no-op detection is deliberately not
    /// performed.
    ///
    /// Committing discards the old head's redo target: the abandoned branch
    /// stays stored and reachable by explicit [`Store::goto`], but not via
    /// [`Store::redo`].
    ///
    /// # Errors
    ///
    /// - [`EditError::NoActiveEdit`] with no open session
    /// - [`EditError::SchemaViolation`] if a derived snapshot disagrees with
    ///   the metamodel
    /// - [`EditError::BrokenReference`] if component values reference
    ///   objects absent from the committed frame
    pub fn commit(&mut self) -> Result<FrameId, EditError> {
        let working = self.working.as_ref().ok_or(EditError::NoActiveEdit)?;

        // Validation pass: nothing is mutated until the whole set passes.
        for (object, snapshot_id) in working.entries() {
            let Some(snapshot) = working.pending(snapshot_id) else {
                // Unchanged entry, validated by the commit that created it.
                continue;
            };
            self.metamodel
                .validate(snapshot.type_tag(), snapshot.components().keys())
                .map_err(|source| EditError::SchemaViolation { object, source })?;

            let missing: Vec<ObjectId> = snapshot
                .references()
                .into_iter()
                .filter(|dep| !working.contains(*dep))
                .collect();
            if !missing.is_empty() {
                return Err(EditError::BrokenReference { object, missing });
            }
        }

        let working = self.working.take().ok_or(EditError::NoActiveEdit)?;
        // Navigation is blocked while a session is open, so the base frame
        // is still the head frame.
        let old_head = working.base();
        let (index, mut pending) = working.into_parts();

        // Publish only the snapshots the final index references; snapshots
        // superseded within this session never enter the pool.
        for &snapshot_id in index.values() {
            if let Some(snapshot) = pending.remove(&snapshot_id) {
                self.snapshots.insert(snapshot_id, snapshot);
            }
        }

        let frame_id = FrameId::new(self.frame_ids.next());
        let frame = Frame::new(frame_id, Some(old_head), index, UtcTimestamp::now());
        self.frames.insert(frame_id, frame);
        self.frame_order.push(frame_id);
        self.redo_targets.remove(&old_head);
        self.head = frame_id;
        Ok(frame_id)
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Move head to its parent frame.
    ///
    /// Records the departed frame as the parent's redo target.
    ///
    /// # Errors
    ///
    /// - [`NavigationError::NoParent`] at the root frame
    /// - [`NavigationError::EditInProgress`] while an edit session is open
    pub fn undo(&mut self) -> Result<FrameId, NavigationError> {
        if self.working.is_some() {
            return Err(NavigationError::EditInProgress);
        }
        let head = self.head;
        let frame = self
            .frames
            .get(&head)
            .ok_or(NavigationError::UnknownFrame { frame: head })?;
        let parent = frame
            .parent()
            .ok_or(NavigationError::NoParent { frame: head })?;

        self.redo_targets.insert(parent, head);
        self.head = parent;
        Ok(parent)
    }

    /// Move head to its recorded redo target.
    ///
    /// # Errors
    ///
    /// - [`NavigationError::NoRedoTarget`] if none was recorded, or a commit
    ///   from this frame invalidated it
    /// - [`NavigationError::EditInProgress`] while an edit session is open
    pub fn redo(&mut self) -> Result<FrameId, NavigationError> {
        if self.working.is_some() {
            return Err(NavigationError::EditInProgress);
        }
        let head = self.head;
        let target = self
            .redo_targets
            .get(&head)
            .copied()
            .ok_or(NavigationError::NoRedoTarget { frame: head })?;
        self.head = target;
        Ok(target)
    }

    /// Move head to any frame in the version graph.
    ///
    /// Explicit time travel for comparing versions, independent of the
    /// undo/redo chain. Does not alter redo bookkeeping.
    ///
    /// # Errors
    ///
    /// - [`NavigationError::UnknownFrame`] if the frame does not exist
    /// - [`NavigationError::EditInProgress`] while an edit session is open
    pub fn goto(&mut self, frame: FrameId) -> Result<FrameId, NavigationError> {
        if self.working.is_some() {
            return Err(NavigationError::EditInProgress);
        }
        if !self.frames.contains_key(&frame) {
            return Err(NavigationError::UnknownFrame { frame });
        }
        self.head = frame;
        Ok(frame)
    }

    // ========================================================================
    // Garbage collection
    // ========================================================================

    /// Remove frames and snapshots below the retention policy.
    ///
    /// Retains the ancestor closure of head plus every pinned frame's
    /// chain - so the tree stays single-rooted - then drops every other
    /// frame, every redo slot touching a dropped frame, and every snapshot
    /// no retained frame references.
    ///
    /// # Errors
    ///
    /// - [`NavigationError::UnknownFrame`] if a pinned frame does not exist
    /// - [`NavigationError::EditInProgress`] while an edit session is open
    pub fn prune(&mut self, policy: &RetentionPolicy) -> Result<PruneReport, NavigationError> {
        if self.working.is_some() {
            return Err(NavigationError::EditInProgress);
        }

        let mut retained: BTreeSet<FrameId> = BTreeSet::new();
        let mut pins = vec![self.head];
        pins.extend(policy.pinned());

        for pin in pins {
            if !self.frames.contains_key(&pin) {
                return Err(NavigationError::UnknownFrame { frame: pin });
            }
            let mut cursor = Some(pin);
            while let Some(id) = cursor {
                if !retained.insert(id) {
                    break;
                }
                cursor = self.frames.get(&id).and_then(|frame| frame.parent());
            }
        }

        let frames_removed: Vec<FrameId> = self
            .frames
            .keys()
            .copied()
            .filter(|id| !retained.contains(id))
            .collect();
        for id in &frames_removed {
            self.frames.remove(id);
        }
        self.frame_order.retain(|id| retained.contains(id));
        self.redo_targets
            .retain(|from, to| retained.contains(from) && retained.contains(to));

        let mut live: BTreeSet<SnapshotId> = BTreeSet::new();
        for frame in self.frames.values() {
            live.extend(frame.index().values().copied());
        }
        let snapshots_removed: Vec<SnapshotId> = self
            .snapshots
            .keys()
            .copied()
            .filter(|id| !live.contains(id))
            .collect();
        for id in &snapshots_removed {
            self.snapshots.remove(id);
        }

        Ok(PruneReport {
            frames_removed,
            snapshots_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;

    fn kind(name: &str) -> ComponentKind {
        ComponentKind::new(name).unwrap()
    }

    fn tag(name: &str) -> TypeTag {
        TypeTag::new(name).unwrap()
    }

    fn flows_metamodel() -> Metamodel {
        let mut metamodel = Metamodel::new("flows");
        metamodel.declare_component(kind("Description")).unwrap();
        metamodel.declare_component(kind("Flow")).unwrap();
        metamodel.declare_component(kind("Endpoints")).unwrap();
        metamodel
            .declare_type(tag("Stock"), [kind("Description"), kind("Flow")])
            .unwrap();
        metamodel
            .declare_type(tag("Link"), [kind("Endpoints")])
            .unwrap();
        metamodel
    }

    fn stock_components(description: &str, flow: Value) -> BTreeMap<ComponentKind, ComponentData> {
        [
            (kind("Description"), ComponentData::value(description)),
            (kind("Flow"), ComponentData::value(flow)),
        ]
        .into_iter()
        .collect()
    }

    /// Store with one committed stock object.
    fn store_with_stock() -> (Store, ObjectId, FrameId) {
        let mut store = Store::create(flows_metamodel());
        store.begin_edit().unwrap();
        let object = store
            .create_object(tag("Stock"), stock_components("Tank", Value::Null))
            .unwrap();
        let frame = store.commit().unwrap();
        (store, object, frame)
    }

    mod edit_protocol {
        use super::*;

        #[test]
        fn create_starts_with_empty_root() {
            let store = Store::create(flows_metamodel());
            let view = store.current_view().unwrap();
            assert!(view.is_empty());
            assert!(store.frame(store.head()).unwrap().parent().is_none());
        }

        #[test]
        fn second_begin_edit_fails() {
            let mut store = Store::create(flows_metamodel());
            store.begin_edit().unwrap();
            assert!(matches!(
                store.begin_edit(),
                Err(EditError::ConcurrentEdit)
            ));
        }

        #[test]
        fn mutation_without_edit_fails() {
            let mut store = Store::create(flows_metamodel());
            let result = store.create_object(tag("Stock"), stock_components("Tank", Value::Null));
            assert!(matches!(result, Err(EditError::NoActiveEdit)));
            assert!(matches!(store.commit(), Err(EditError::NoActiveEdit)));
        }

        #[test]
        fn create_object_validates_against_metamodel() {
            let mut store = Store::create(flows_metamodel());
            store.begin_edit().unwrap();

            // Missing the Flow component
            let components = [(kind("Description"), ComponentData::value("Tank"))]
                .into_iter()
                .collect();
            let result = store.create_object(tag("Stock"), components);
            assert!(matches!(result, Err(EditError::Schema(_))));
        }

        #[test]
        fn created_object_invisible_until_commit() {
            let mut store = Store::create(flows_metamodel());
            store.begin_edit().unwrap();
            let object = store
                .create_object(tag("Stock"), stock_components("Tank", Value::Null))
                .unwrap();

            let view = store.current_view().unwrap();
            assert!(!view.contains(object));

            store.commit().unwrap();
            let view = store.current_view().unwrap();
            assert!(view.contains(object));
        }

        #[test]
        fn amend_returns_fresh_snapshot_each_time() {
            let (mut store, object, _) = store_with_stock();
            store.begin_edit().unwrap();

            let first = store
                .amend(object, kind("Flow"), ComponentData::value(1))
                .unwrap();
            let second = store
                .amend(object, kind("Flow"), ComponentData::value(2))
                .unwrap();
            assert_ne!(first, second);

            let frame = store.commit().unwrap();
            assert_eq!(
                store.frame(frame).unwrap().snapshot_of(object),
                Some(second)
            );
        }

        #[test]
        fn amend_unknown_object_fails() {
            let (mut store, _, _) = store_with_stock();
            store.begin_edit().unwrap();
            let result = store.amend(ObjectId::new(999), kind("Flow"), ComponentData::value(1));
            assert!(matches!(result, Err(EditError::UnknownObject { .. })));
        }

        #[test]
        fn amend_undeclared_kind_fails() {
            let (mut store, object, _) = store_with_stock();
            store.begin_edit().unwrap();
            let result = store.amend(object, kind("Endpoints"), ComponentData::new());
            assert!(matches!(result, Err(EditError::SchemaViolation { .. })));
        }

        #[test]
        fn abandon_discards_edits() {
            let (mut store, object, frame) = store_with_stock();
            store.begin_edit().unwrap();
            store
                .amend(object, kind("Flow"), ComponentData::value(10))
                .unwrap();
            assert!(store.has_changes());

            assert!(store.abandon());
            assert!(!store.has_open_edit());
            assert_eq!(store.head(), frame);
            assert!(!store.abandon());
        }

        #[test]
        fn empty_commit_creates_identical_child() {
            let (mut store, _, parent) = store_with_stock();
            store.begin_edit().unwrap();
            let child = store.commit().unwrap();

            assert_ne!(child, parent);
            assert_eq!(store.frame(child).unwrap().parent(), Some(parent));
            assert_eq!(
                store.fingerprint(child).unwrap(),
                store.fingerprint(parent).unwrap()
            );
        }

        #[test]
        fn commit_rejects_broken_references() {
            let (mut store, _, _) = store_with_stock();
            store.begin_edit().unwrap();

            let components = [(
                kind("Endpoints"),
                ComponentData::new().with("target", ObjectId::new(777)),
            )]
            .into_iter()
            .collect();
            store.create_object(tag("Link"), components).unwrap();

            let result = store.commit();
            assert!(matches!(result, Err(EditError::BrokenReference { .. })));
            // Session survives the failed commit
            assert!(store.has_open_edit());
        }

        #[test]
        fn remove_cascades_to_dependents() {
            let (mut store, stock, _) = store_with_stock();

            store.begin_edit().unwrap();
            let components = [(
                kind("Endpoints"),
                ComponentData::new().with("target", stock),
            )]
            .into_iter()
            .collect();
            let link = store.create_object(tag("Link"), components).unwrap();
            store.commit().unwrap();

            store.begin_edit().unwrap();
            let removed = store.remove(stock).unwrap();
            assert!(removed.contains(&stock));
            assert!(removed.contains(&link));
            let frame = store.commit().unwrap();

            let view = store.view(frame).unwrap();
            assert!(!view.contains(stock));
            assert!(!view.contains(link));
        }

        #[test]
        fn removed_object_still_resolves_in_past_frames() {
            let (mut store, object, old_frame) = store_with_stock();

            store.begin_edit().unwrap();
            store.remove(object).unwrap();
            store.commit().unwrap();

            let past = store.view(old_frame).unwrap();
            let snapshot = past.resolve(object).unwrap();
            assert_eq!(snapshot.object_id(), object);
        }
    }

    mod navigation {
        use super::*;

        #[test]
        fn undo_at_root_fails() {
            let mut store = Store::create(flows_metamodel());
            assert!(matches!(
                store.undo(),
                Err(NavigationError::NoParent { .. })
            ));
        }

        #[test]
        fn undo_redo_symmetry() {
            let (mut store, _, frame) = store_with_stock();
            let root = store.frame(frame).unwrap().parent().unwrap();

            assert_eq!(store.undo().unwrap(), root);
            assert_eq!(store.head(), root);
            assert_eq!(store.redo().unwrap(), frame);
            assert_eq!(store.head(), frame);
        }

        #[test]
        fn redo_without_undo_fails() {
            let (mut store, _, _) = store_with_stock();
            assert!(matches!(
                store.redo(),
                Err(NavigationError::NoRedoTarget { .. })
            ));
        }

        #[test]
        fn commit_invalidates_redo_target() {
            let (mut store, object, abandoned) = store_with_stock();

            store.undo().unwrap();
            store.begin_edit().unwrap();
            store
                .create_object(tag("Stock"), stock_components("Basin", Value::Null))
                .unwrap();
            store.commit().unwrap();

            assert!(matches!(
                store.redo(),
                Err(NavigationError::NoRedoTarget { .. })
            ));

            // The discarded branch stays reachable explicitly
            store.goto(abandoned).unwrap();
            assert!(store.current_view().unwrap().contains(object));
        }

        #[test]
        fn goto_unknown_frame_fails() {
            let mut store = Store::create(flows_metamodel());
            assert!(matches!(
                store.goto(FrameId::new(999)),
                Err(NavigationError::UnknownFrame { .. })
            ));
        }

        #[test]
        fn navigation_blocked_during_edit() {
            let (mut store, _, frame) = store_with_stock();
            store.begin_edit().unwrap();

            assert_eq!(store.undo(), Err(NavigationError::EditInProgress));
            assert_eq!(store.redo(), Err(NavigationError::EditInProgress));
            assert_eq!(store.goto(frame), Err(NavigationError::EditInProgress));
        }

        #[test]
        fn repeated_undo_redo_walks_the_chain() {
            let (mut store, object, first) = store_with_stock();
            store.begin_edit().unwrap();
            store
                .amend(object, kind("Flow"), ComponentData::value(10))
                .unwrap();
            let second = store.commit().unwrap();

            store.undo().unwrap();
            store.undo().unwrap();
            assert_eq!(store.redo().unwrap(), first);
            assert_eq!(store.redo().unwrap(), second);
        }
    }

    mod pruning {
        use super::*;

        #[test]
        fn prune_drops_abandoned_branch() {
            let (mut store, _, abandoned) = store_with_stock();

            store.undo().unwrap();
            store.begin_edit().unwrap();
            store
                .create_object(tag("Stock"), stock_components("Basin", Value::Null))
                .unwrap();
            store.commit().unwrap();

            let report = store.prune(&RetentionPolicy::new()).unwrap();
            assert!(report.frames_removed.contains(&abandoned));
            assert!(!store.contains_frame(abandoned));
            // The abandoned branch's snapshot is gone with it
            assert!(!report.snapshots_removed.is_empty());
        }

        #[test]
        fn prune_keeps_pinned_branch() {
            let (mut store, _, pinned) = store_with_stock();

            store.undo().unwrap();
            store.begin_edit().unwrap();
            store
                .create_object(tag("Stock"), stock_components("Basin", Value::Null))
                .unwrap();
            store.commit().unwrap();

            let report = store
                .prune(&RetentionPolicy::new().pin(pinned))
                .unwrap();
            assert!(report.is_noop());
            assert!(store.contains_frame(pinned));
        }

        #[test]
        fn prune_with_unknown_pin_fails() {
            let (mut store, _, _) = store_with_stock();
            let result = store.prune(&RetentionPolicy::new().pin(FrameId::new(99)));
            assert_eq!(
                result.unwrap_err(),
                NavigationError::UnknownFrame {
                    frame: FrameId::new(99)
                }
            );
        }

        #[test]
        fn prune_of_linear_history_is_noop() {
            let (mut store, _, _) = store_with_stock();
            let report = store.prune(&RetentionPolicy::new()).unwrap();
            assert!(report.is_noop());
        }
    }
}
