//! Strata - a versioned graph object store for interactive modelling tools
//!
//! Strata gives creative modelling applications (stock-and-flow simulators,
//! causal maps and similar editors) a graph-shaped domain model that can be
//! edited, versioned, branched, undone/redone and durably persisted in a
//! format tolerant of partial corruption.
//!
//! # Architecture
//!
//! The crate is layered bottom-up:
//!
//! - [`core`] - Domain types: identities, values, components, the metamodel
//!   schema, object snapshots and version frames
//! - [`store`] - The store engine: working set, commit protocol,
//!   undo/redo/time-travel navigation, read-only domain views, retention
//!   pruning and the cross-process store lock
//! - [`persist`] - The durable container: strict loading, atomic saving and
//!   salvage loading with a recovery report
//!
//! # Correctness Invariants
//!
//! Strata maintains the following invariants:
//!
//! 1. Object identities are assigned once and never reused
//! 2. Snapshots and committed frames never mutate; every change is a new
//!    snapshot published by a commit
//! 3. Structural validation happens in exactly one place, the metamodel
//! 4. Every failure path maps to a named error kind carrying enough context
//!    to act on

pub mod core;
pub mod persist;
pub mod store;
