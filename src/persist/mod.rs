//! persist
//!
//! Durable persistence for the store.
//!
//! # Modules
//!
//! - [`format`] - Container records and version dispatch (format v1)
//! - Salvage loading with a typed [`RecoveryReport`]
//!
//! # Guarantees
//!
//! - **Atomic save**: the container is written to a sibling temp file,
//!   fsynced and renamed over the target. A crash mid-write leaves the
//!   previous file intact.
//! - **Precise errors**: every structural defect of a container surfaces as
//!   a named [`PersistError`] variant carrying the offending id, never as an
//!   opaque failure.
//! - **Repairability**: records are independent and keyed by stable ids;
//!   [`Store::recover`](crate::store::Store::recover) salvages the intact
//!   ones from a damaged container.
//!
//! An unrecognized format version is the one fatal case: no safe partial
//! interpretation of an unknown format exists, so neither the strict nor
//! the salvage loader proceeds past it.

pub mod format;
mod recover;

pub use recover::{RecoveryIssue, RecoveryReport};

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::frame::Frame;
use crate::core::metamodel::{Metamodel, SchemaError};
use crate::core::snapshot::ObjectSnapshot;
use crate::core::types::{FrameId, ObjectId, SnapshotId, UtcTimestamp};
use crate::store::{LoadedState, LockError, Store};

use format::{Container, FrameRecord, InfoRecord, SnapshotRecord, FORMAT_VERSION, STORE_KIND};

/// Errors from loading or saving a persisted store.
#[derive(Debug, Error)]
pub enum PersistError {
    /// File could not be read, created or replaced.
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The container is not a JSON document at all.
    #[error("store file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The store file is locked by another process.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The `info` header record is absent.
    #[error("missing 'info' header record")]
    MissingInfo,

    /// The `snapshots` collection is absent.
    #[error("missing 'snapshots' collection")]
    MissingSnapshotsCollection,

    /// The `frames` collection is absent.
    #[error("missing 'frames' collection")]
    MissingFramesCollection,

    /// The container was written by a different tool.
    #[error("unrecognized container kind '{found}', expected '{STORE_KIND}'")]
    InvalidKind { found: String },

    /// The container format version is not recognized. Fatal: no
    /// forward/backward compatibility shimming is attempted.
    #[error("unrecognized format version {found}, supported: {FORMAT_VERSION}")]
    UnknownVersion { found: u32 },

    /// The container was written for a different metamodel.
    #[error("container was written for metamodel '{found}', store opened with '{expected}'")]
    MetamodelMismatch { expected: String, found: String },

    /// A record in a collection could not be decoded.
    #[error("malformed record in '{collection}': {detail}")]
    MalformedRecord {
        collection: &'static str,
        detail: String,
    },

    /// A persisted snapshot disagrees with the metamodel.
    #[error("snapshot of object {object} violates the metamodel: {source}")]
    SchemaViolation {
        object: ObjectId,
        source: SchemaError,
    },

    /// Two snapshot records share one identity.
    #[error("duplicate snapshot id {snapshot}")]
    DuplicateSnapshot { snapshot: SnapshotId },

    /// Two frame records share one identity.
    #[error("duplicate frame id {frame}")]
    DuplicateFrame { frame: FrameId },

    /// A frame's index references a snapshot absent from the container.
    #[error("frame {frame} references unknown snapshot {snapshot}")]
    DanglingSnapshotReference {
        frame: FrameId,
        snapshot: SnapshotId,
    },

    /// The frame parent structure is not a single-rooted tree.
    #[error("malformed version graph: {detail}")]
    MalformedVersionGraph { detail: String },

    /// The header records a head frame the container does not contain.
    #[error("recorded head frame {frame} does not exist")]
    UnknownHeadFrame { frame: FrameId },
}

/// Load a store from a container file, strictly.
///
/// Follows the load algorithm: header first (with version dispatch), then
/// the snapshot collection validated against the metamodel, then the frame
/// collection validated for referential integrity and tree shape.
pub(crate) fn load(path: &Path, metamodel: Metamodel) -> Result<Store, PersistError> {
    let text = fs::read_to_string(path)?;
    let root = format::parse_root(&text)?;
    let info = format::parse_info(&root)?;

    if info.metamodel != metamodel.name() {
        return Err(PersistError::MetamodelMismatch {
            expected: metamodel.name().to_string(),
            found: info.metamodel,
        });
    }

    let snapshot_values =
        format::collection(&root, "snapshots")?.ok_or(PersistError::MissingSnapshotsCollection)?;
    let frame_values =
        format::collection(&root, "frames")?.ok_or(PersistError::MissingFramesCollection)?;

    // Snapshot pool
    let mut pool: BTreeMap<SnapshotId, ObjectSnapshot> = BTreeMap::new();
    for (position, value) in snapshot_values.into_iter().enumerate() {
        let record: SnapshotRecord =
            serde_json::from_value(value).map_err(|e| PersistError::MalformedRecord {
                collection: "snapshots",
                detail: format!("position {}: {}", position, e),
            })?;

        metamodel
            .validate(&record.type_tag, record.components.keys())
            .map_err(|source| PersistError::SchemaViolation {
                object: record.object_id,
                source,
            })?;

        let snapshot = record.into_snapshot();
        let id = snapshot.snapshot_id();
        if pool.insert(id, snapshot).is_some() {
            return Err(PersistError::DuplicateSnapshot { snapshot: id });
        }
    }

    // Frame tree
    let mut frames: BTreeMap<FrameId, Frame> = BTreeMap::new();
    let mut frame_order: Vec<FrameId> = Vec::new();
    for (position, value) in frame_values.into_iter().enumerate() {
        let record: FrameRecord =
            serde_json::from_value(value).map_err(|e| PersistError::MalformedRecord {
                collection: "frames",
                detail: format!("position {}: {}", position, e),
            })?;

        let mut index: BTreeMap<ObjectId, SnapshotId> = BTreeMap::new();
        for &(object, snapshot) in &record.objects {
            match pool.get(&snapshot) {
                None => {
                    return Err(PersistError::DanglingSnapshotReference {
                        frame: record.frame_id,
                        snapshot,
                    })
                }
                Some(pooled) if pooled.object_id() != object => {
                    return Err(PersistError::MalformedRecord {
                        collection: "frames",
                        detail: format!(
                            "frame {} maps object {} to snapshot {} of object {}",
                            record.frame_id,
                            object,
                            snapshot,
                            pooled.object_id()
                        ),
                    })
                }
                Some(_) => {}
            }
            if index.insert(object, snapshot).is_some() {
                return Err(PersistError::MalformedRecord {
                    collection: "frames",
                    detail: format!("frame {} lists object {} twice", record.frame_id, object),
                });
            }
        }

        let frame = Frame::new(record.frame_id, record.parent, index, record.created_at);
        let id = frame.id();
        if frames.insert(id, frame).is_some() {
            return Err(PersistError::DuplicateFrame { frame: id });
        }
        frame_order.push(id);
    }

    validate_tree(&frames)?;

    let head = match info.head {
        Some(frame) => {
            if !frames.contains_key(&frame) {
                return Err(PersistError::UnknownHeadFrame { frame });
            }
            frame
        }
        None => frame_order
            .last()
            .copied()
            .ok_or_else(|| PersistError::MalformedVersionGraph {
                detail: "container holds no frames".into(),
            })?,
    };

    Ok(Store::from_loaded(
        metamodel,
        LoadedState {
            store_id: info.store_id,
            snapshots: pool,
            frames,
            frame_order,
            head,
        },
    ))
}

/// Validate that the parent structure forms a tree with exactly one root.
fn validate_tree(frames: &BTreeMap<FrameId, Frame>) -> Result<(), PersistError> {
    let mut roots = frames.values().filter(|frame| frame.parent().is_none());
    let root = roots
        .next()
        .ok_or_else(|| PersistError::MalformedVersionGraph {
            detail: "no root frame".into(),
        })?;
    if let Some(extra) = roots.next() {
        return Err(PersistError::MalformedVersionGraph {
            detail: format!("multiple root frames: {} and {}", root.id(), extra.id()),
        });
    }

    // Every frame must reach the root through existing parents, acyclically.
    let mut resolved: std::collections::BTreeSet<FrameId> = std::collections::BTreeSet::new();
    resolved.insert(root.id());

    for frame in frames.values() {
        let mut path: Vec<FrameId> = Vec::new();
        let mut current = frame.id();
        loop {
            if resolved.contains(&current) {
                break;
            }
            if path.contains(&current) {
                return Err(PersistError::MalformedVersionGraph {
                    detail: format!("cycle involving frame {}", current),
                });
            }
            path.push(current);

            let node = frames
                .get(&current)
                .ok_or_else(|| PersistError::MalformedVersionGraph {
                    detail: format!("frame {} does not exist", current),
                })?;
            match node.parent() {
                Some(parent) => {
                    if !frames.contains_key(&parent) {
                        return Err(PersistError::MalformedVersionGraph {
                            detail: format!(
                                "frame {} references unknown parent {}",
                                current, parent
                            ),
                        });
                    }
                    current = parent;
                }
                None => break,
            }
        }
        resolved.extend(path);
    }

    Ok(())
}

/// Serialize the full store and write it atomically.
pub(crate) fn save(store: &Store, path: &Path) -> Result<(), PersistError> {
    let info = InfoRecord {
        kind: STORE_KIND.to_string(),
        format_version: FORMAT_VERSION,
        metamodel: store.metamodel().name().to_string(),
        store_id: store.store_id(),
        saved_at: UtcTimestamp::now(),
        head: Some(store.head()),
    };
    let snapshots: Vec<SnapshotRecord> = store
        .snapshot_pool()
        .values()
        .map(SnapshotRecord::from_snapshot)
        .collect();
    let frames: Vec<FrameRecord> = store.frames().map(FrameRecord::from_frame).collect();

    let container = Container {
        info,
        snapshots,
        frames,
    };
    let json = serde_json::to_string_pretty(&container)?;
    write_atomic(path, json.as_bytes())
}

/// Recover what can be loaded from a damaged container.
pub(crate) fn recover(
    path: &Path,
    metamodel: Metamodel,
) -> Result<(Store, RecoveryReport), PersistError> {
    let text = fs::read_to_string(path)?;
    recover::salvage(&text, metamodel)
}

/// The sibling temp path used by atomic writes (`<file>.tmp`).
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| std::ffi::OsString::from("store"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write to a sibling temp file, fsync, then rename over the target.
///
/// Either the whole new file becomes visible or the old one remains; a
/// crash mid-write cannot leave a half-written container.
///
/// # Fault Injection
///
/// When compiled with `cfg(test)` or the `fault_injection` feature, a crash
/// can be simulated between the temp write and the rename. Use
/// [`fault_injection::set_crash_after`] to configure.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    #[cfg(any(test, feature = "fault_injection"))]
    if fault_injection::should_crash() {
        return Err(PersistError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "simulated crash before container replace",
        )));
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Fault injection support for testing crash safety of saves.
///
/// Thread-local, so parallel tests stay isolated.
#[cfg(any(test, feature = "fault_injection"))]
pub mod fault_injection {
    use std::cell::Cell;

    thread_local! {
        /// Crash after N writes. 0 disables crash simulation.
        static CRASH_AFTER_WRITES: Cell<usize> = const { Cell::new(0) };

        /// Current write count.
        static WRITE_COUNT: Cell<usize> = const { Cell::new(0) };
    }

    /// After `n - 1` successful saves, the n-th save fails between the temp
    /// write and the rename. Set 0 to disable.
    pub fn set_crash_after(n: usize) {
        CRASH_AFTER_WRITES.with(|c| c.set(n));
        WRITE_COUNT.with(|c| c.set(0));
    }

    /// Called by the save path before replacing the container.
    pub fn should_crash() -> bool {
        CRASH_AFTER_WRITES.with(|threshold_cell| {
            let threshold = threshold_cell.get();
            if threshold == 0 {
                return false;
            }
            WRITE_COUNT.with(|count_cell| {
                let count = count_cell.get() + 1;
                count_cell.set(count);
                count >= threshold
            })
        })
    }

    /// Reset fault injection state. Call in test teardown.
    pub fn reset() {
        CRASH_AFTER_WRITES.with(|c| c.set(0));
        WRITE_COUNT.with(|c| c.set(0));
    }
}
