//! Error types for the sync runtime.
//!
//! Three families, matching how callers must react: validation errors are
//! the caller's to fix, transient adapter errors clear on retry, and
//! consistency errors mark a pass that must not be considered reconciled.

use crate::adapter::AdapterError;
use tether_engine::EntityId;
use thiserror::Error;

/// The step of a sync pass an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Diffing,
    Resolving,
    Applying,
    Logging,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Diffing => "diffing",
            SyncPhase::Resolving => "resolving",
            SyncPhase::Applying => "applying",
            SyncPhase::Logging => "logging",
        };
        write!(f, "{name}")
    }
}

/// All possible errors from the sync runtime.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A pass was requested while one is already running
    #[error("sync pass already in progress")]
    Busy,

    /// A rewind was requested while one is already in flight
    #[error("rewind already in progress for entity {0}")]
    RewindInProgress(EntityId),

    /// Malformed input; the caller must fix it
    #[error(transparent)]
    Validation(#[from] tether_engine::Error),

    /// The remote store failed during a pass step
    #[error("remote store failed while {step}: {source}")]
    Remote {
        step: SyncPhase,
        #[source]
        source: AdapterError,
    },

    /// The activity log failed
    #[error("activity log failed while {step}: {source}")]
    ActivityLog {
        step: SyncPhase,
        #[source]
        source: AdapterError,
    },

    /// A pass partially applied before failing; the named entities keep
    /// their dirty flags so nothing is silently considered reconciled
    #[error("consistency failure while {step} ({detail}); entities left dirty: {entities:?}")]
    Consistency {
        step: SyncPhase,
        entities: Vec<EntityId>,
        detail: String,
    },
}

impl SyncError {
    /// Stable reason category for reporting.
    pub fn reason(&self) -> &'static str {
        match self {
            SyncError::Busy => "busy",
            SyncError::RewindInProgress(_) => "rewind-in-progress",
            SyncError::Validation(_) => "validation",
            SyncError::Remote { .. } => "remote",
            SyncError::ActivityLog { .. } => "activity-log",
            SyncError::Consistency { .. } => "consistency",
        }
    }

    /// Whether a retry on the next scheduled pass can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Busy => true,
            SyncError::Remote { source, .. } | SyncError::ActivityLog { source, .. } => {
                source.is_transient()
            }
            SyncError::RewindInProgress(_) => true,
            SyncError::Validation(_) => false,
            SyncError::Consistency { .. } => false,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_stable() {
        assert_eq!(SyncError::Busy.reason(), "busy");
        assert_eq!(
            SyncError::Validation(tether_engine::Error::DirtyEntity("rec_1".into())).reason(),
            "validation"
        );
        assert_eq!(
            SyncError::Remote {
                step: SyncPhase::Fetching,
                source: AdapterError::Unavailable("down".into()),
            }
            .reason(),
            "remote"
        );
    }

    #[test]
    fn transience_follows_adapter() {
        let transient = SyncError::Remote {
            step: SyncPhase::Fetching,
            source: AdapterError::Unavailable("down".into()),
        };
        assert!(transient.is_transient());

        let permanent = SyncError::Remote {
            step: SyncPhase::Applying,
            source: AdapterError::Unauthorized("bad key".into()),
        };
        assert!(!permanent.is_transient());

        let consistency = SyncError::Consistency {
            step: SyncPhase::Applying,
            entities: vec!["rec_1".into()],
            detail: "partial write".into(),
        };
        assert!(!consistency.is_transient());
    }

    #[test]
    fn display_includes_step() {
        let err = SyncError::Remote {
            step: SyncPhase::Applying,
            source: AdapterError::Unavailable("503".into()),
        };
        assert_eq!(
            err.to_string(),
            "remote store failed while applying: temporarily unavailable: 503"
        );
    }
}
