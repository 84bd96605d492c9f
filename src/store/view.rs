//! store::view
//!
//! Read-only domain views over one frame.
//!
//! A [`DomainView`] is bound at construction to one frame, current or
//! historical, and resolves object snapshots and component data from it.
//! Views hold only shared borrows of immutable data: any number of views
//! over any number of frames may coexist without coordination, because
//! nothing they read can change under them.

use thiserror::Error;

use crate::core::component::ComponentData;
use crate::core::frame::Frame;
use crate::core::snapshot::ObjectSnapshot;
use crate::core::types::{ComponentKind, Fingerprint, FrameId, ObjectId, SnapshotId};

use super::Store;

/// Errors from resolving through a domain view.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    /// The object does not exist in the viewed frame.
    #[error("object {object} does not exist in frame {frame}")]
    UnknownObject { frame: FrameId, object: ObjectId },

    /// The object exists but does not carry the requested component.
    ///
    /// Should not occur when metamodel validation held at commit time;
    /// seeing this signals a store-internal invariant violation.
    #[error("object {object} has no '{kind}' component")]
    MissingComponent { object: ObjectId, kind: ComponentKind },

    /// The frame's index references a snapshot absent from the pool.
    ///
    /// Signals a store-internal invariant violation.
    #[error("frame {frame} references snapshot {snapshot} missing from the pool")]
    DanglingSnapshot { frame: FrameId, snapshot: SnapshotId },
}

/// A read-only projection of the object graph as of one frame.
///
/// # Example
///
/// ```no_run
/// use strata::core::types::{ComponentKind, ObjectId};
/// use strata::store::Store;
///
/// # fn example(store: &Store, tank: ObjectId) -> anyhow::Result<()> {
/// let flow = ComponentKind::new("Flow")?;
/// let view = store.current_view()?;
/// let data = view.component(tank, &flow)?;
/// println!("flow of {}: {:?}", tank, data.get("value"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DomainView<'a> {
    store: &'a Store,
    frame: &'a Frame,
}

impl<'a> DomainView<'a> {
    pub(crate) fn new(store: &'a Store, frame: &'a Frame) -> Self {
        Self { store, frame }
    }

    /// The frame this view is bound to.
    pub fn frame_id(&self) -> FrameId {
        self.frame.id()
    }

    /// The underlying frame.
    pub fn frame(&self) -> &'a Frame {
        self.frame
    }

    /// Check whether an object is live in this frame.
    pub fn contains(&self, object: ObjectId) -> bool {
        self.frame.contains(object)
    }

    /// Object identities live in this frame, in id order.
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + 'a {
        self.frame.objects()
    }

    /// Number of live objects in this frame.
    pub fn len(&self) -> usize {
        self.frame.len()
    }

    /// Check whether the frame has no live objects.
    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    /// Resolve an object to its snapshot as of this frame.
    ///
    /// # Errors
    ///
    /// - [`ViewError::UnknownObject`] if the object is not in this frame
    /// - [`ViewError::DanglingSnapshot`] if the pool lost the snapshot
    ///   (internal invariant violation)
    pub fn resolve(&self, object: ObjectId) -> Result<&'a ObjectSnapshot, ViewError> {
        let snapshot = self
            .frame
            .snapshot_of(object)
            .ok_or(ViewError::UnknownObject {
                frame: self.frame.id(),
                object,
            })?;
        self.store
            .pooled(snapshot)
            .ok_or(ViewError::DanglingSnapshot {
                frame: self.frame.id(),
                snapshot,
            })
    }

    /// Get one component's data for an object as of this frame.
    ///
    /// # Errors
    ///
    /// - [`ViewError::UnknownObject`] if the object is not in this frame
    /// - [`ViewError::MissingComponent`] if the snapshot lacks the kind
    pub fn component(
        &self,
        object: ObjectId,
        kind: &ComponentKind,
    ) -> Result<&'a ComponentData, ViewError> {
        let snapshot = self.resolve(object)?;
        snapshot.component(kind).ok_or(ViewError::MissingComponent {
            object,
            kind: kind.clone(),
        })
    }

    /// Stable hash of this frame's object index, for version comparison.
    pub fn fingerprint(&self) -> Fingerprint {
        self.frame.fingerprint()
    }
}
