//! Error types for the Tether engine.

use crate::{EntityId, FieldName, Timestamp};
use thiserror::Error;

/// All possible errors from the Tether engine.
///
/// These are validation errors: the caller supplied something malformed and
/// is responsible for fixing it. Transient I/O and consistency failures
/// live in the sync layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A raw value reached a resolution or fold path without provenance.
    /// [`Resolver::resolve`](crate::Resolver::resolve) makes this
    /// unrepresentable by taking [`ContextualValue`](crate::ContextualValue)s;
    /// adapters converting raw payloads surface it instead of inventing
    /// provenance silently.
    #[error("missing context for value on field '{0}'")]
    MissingContext(FieldName),

    #[error("no snapshot exists at or before {at} for entity {entity_id}")]
    NoSnapshot { entity_id: EntityId, at: Timestamp },

    #[error("cannot rewind to future state: {at} is after {now}")]
    FutureTimestamp { at: Timestamp, now: Timestamp },

    #[error("entity has unsaved local changes: {0}")]
    DirtyEntity(EntityId),

    #[error("invalid superposition: {0}")]
    InvalidSuperposition(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
