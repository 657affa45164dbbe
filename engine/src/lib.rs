//! # Tether Engine
//!
//! The deterministic core of Tether's workspace/remote reconciliation.
//!
//! This crate holds the pure logic for change tracking, conflict resolution,
//! and history replay. It has no knowledge of clocks, networks, or storage -
//! the same inputs always produce the same outputs.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never reads a clock or touches the network;
//!   timestamps and ids are supplied by the caller
//! - **Deterministic**: checksums, diffs, folds, and resolutions are pure
//!   functions of their inputs
//! - **Closed types**: change actions, conflict outcomes, and cell values
//!   are tagged enums, so every consumer match is exhaustive
//!
//! ## Core Concepts
//!
//! ### Change Records
//!
//! Every mutation - local edit, sync application, rewind - is captured as an
//! immutable [`ChangeRecord`] carrying before/after values and their
//! checksums. Records are append-only: history is never rewritten, recovery
//! is always a new record.
//!
//! ### Checksums
//!
//! [`checksum`](checksum::checksum) fingerprints a JSON value tree with
//! object keys sorted recursively, so two structurally equal values always
//! fingerprint identically regardless of construction order. Diffing and
//! conflict detection are built on checksum equality, not deep comparison.
//!
//! ### Superposition
//!
//! When local and remote disagree on a field and their [`ValueContext`]s
//! differ (how the value was obtained, at what scale, or in which
//! timeframe), the [`Resolver`] keeps *both* values as a [`SuperposedCell`]
//! instead of discarding one. A dominant side is chosen for display only;
//! the non-dominant value stays retrievable.
//!
//! ### Rewind
//!
//! [`Snapshot::fold`] reconstructs an entity's state at any past instant by
//! replaying its change records in creation order. Snapshots are derived,
//! never authoritative - the log is the source of truth.

pub mod cell;
pub mod change;
pub mod checksum;
pub mod context;
pub mod error;
pub mod history;
pub mod resolve;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use cell::{CellValue, SuperposedCell};
pub use change::{ChangeAction, ChangeRecord};
pub use checksum::{checksum, diff_fields, values_equal, FieldChange, FieldDiff};
pub use context::{Agent, AuthorityRanking, CaptureMethod, ContextualValue, Scale, ValueContext};
pub use error::Error;
pub use history::BoundedStack;
pub use resolve::{Conflict, ConflictOutcome, ConflictStrategy, Resolver, Side};
pub use snapshot::{ActivitySummary, Snapshot};
pub use store::{EntityState, EntityStore};

/// Type aliases for clarity
pub type EntityId = String;
pub type EntityType = String;
pub type FieldName = String;
pub type ChangeId = String;
pub type Version = u64;
pub type Timestamp = u64;
pub type Fingerprint = u32;
