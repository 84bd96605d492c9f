//! core::snapshot
//!
//! Immutable versioned object snapshots.
//!
//! An [`ObjectSnapshot`] records the complete component data of one logical
//! object at one point in time. Snapshots never mutate in place: every
//! change derives a new snapshot under a fresh [`SnapshotId`], which is what
//! keeps any frame referencing an older snapshot observing the old state
//! forever.

use std::collections::BTreeMap;

use super::component::ComponentData;
use super::types::{ComponentKind, ObjectId, SnapshotId, TypeTag};

/// One immutable historical state of one logical object.
///
/// # Invariant
///
/// The component kinds present must be exactly the kinds the metamodel
/// declares for `type_tag`. The store enforces this when the snapshot is
/// created and again at commit time.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use strata::core::component::ComponentData;
/// use strata::core::snapshot::ObjectSnapshot;
/// use strata::core::types::{ComponentKind, ObjectId, SnapshotId, TypeTag};
///
/// let kind = ComponentKind::new("Flow").unwrap();
/// let mut components = BTreeMap::new();
/// components.insert(kind.clone(), ComponentData::value(10));
///
/// let snapshot = ObjectSnapshot::new(
///     SnapshotId::new(1),
///     ObjectId::new(1),
///     TypeTag::new("Stock").unwrap(),
///     components,
/// );
///
/// // Deriving replaces one component under a new snapshot identity
/// let amended = snapshot.amended(SnapshotId::new(2), kind.clone(), ComponentData::value(20));
/// assert_eq!(amended.object_id(), snapshot.object_id());
/// assert_ne!(amended.snapshot_id(), snapshot.snapshot_id());
/// assert_eq!(snapshot.component(&kind).unwrap().get("value").unwrap().as_int(), Some(10));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSnapshot {
    snapshot_id: SnapshotId,
    object_id: ObjectId,
    type_tag: TypeTag,
    components: BTreeMap<ComponentKind, ComponentData>,
}

impl ObjectSnapshot {
    /// Create a snapshot from its parts.
    pub fn new(
        snapshot_id: SnapshotId,
        object_id: ObjectId,
        type_tag: TypeTag,
        components: BTreeMap<ComponentKind, ComponentData>,
    ) -> Self {
        Self {
            snapshot_id,
            object_id,
            type_tag,
            components,
        }
    }

    /// The snapshot's identity, unique within the store.
    pub fn snapshot_id(&self) -> SnapshotId {
        self.snapshot_id
    }

    /// The identity of the logical object this snapshot belongs to.
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// The object's type.
    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    /// All components in kind order.
    pub fn components(&self) -> &BTreeMap<ComponentKind, ComponentData> {
        &self.components
    }

    /// Get a component's data by kind.
    pub fn component(&self, kind: &ComponentKind) -> Option<&ComponentData> {
        self.components.get(kind)
    }

    /// Check whether the snapshot carries the given component kind.
    pub fn has_component(&self, kind: &ComponentKind) -> bool {
        self.components.contains_key(kind)
    }

    /// Derive a new snapshot with one component replaced.
    ///
    /// The object identity and type are unchanged; the receiver is not
    /// modified. The caller provides the fresh snapshot identity.
    pub fn amended(
        &self,
        snapshot_id: SnapshotId,
        kind: ComponentKind,
        data: ComponentData,
    ) -> Self {
        let mut components = self.components.clone();
        components.insert(kind, data);
        Self {
            snapshot_id,
            object_id: self.object_id,
            type_tag: self.type_tag.clone(),
            components,
        }
    }

    /// Object identities referenced from any component value.
    ///
    /// For example an edge references the nodes at its endpoints. Referenced
    /// identities must resolve within a committed frame.
    pub fn references(&self) -> Vec<ObjectId> {
        self.components
            .values()
            .flat_map(|data| data.references())
            .collect()
    }
}
