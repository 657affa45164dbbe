//! Conflict resolution between a local and a remote value for one field.
//!
//! The resolver deliberately avoids silent last-writer-wins. Under the
//! default superposition strategy, two differing values whose contexts
//! diverge are both retained; only values that are genuinely the same fact
//! (compatible contexts) collapse to one side.
//!
//! # Outcomes
//!
//! - *not-a-conflict*: values equal under checksum
//! - *override*: one side supersedes the other under the active strategy
//! - *superposed*: both values are retained, with a dominant pointer chosen
//!   for display only

use crate::{
    cell::SuperposedCell,
    checksum::checksum,
    context::{AuthorityRanking, ContextualValue, Scale},
    error::Result,
    EntityId, FieldName,
};
use serde::{Deserialize, Serialize};

/// Which side of a comparison a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

/// Strategy for resolving divergent values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictStrategy {
    /// Local always supersedes
    LocalWins,
    /// Remote always supersedes
    RemoteWins,
    /// More recent capture supersedes; exact ties go to remote, which
    /// represents the last reconciled external truth
    NewestWins,
    /// Retain both when contexts diverge; override toward the more
    /// authoritative context when they are compatible (default)
    #[default]
    Superposition,
}

/// How a comparison was decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConflictOutcome {
    /// Values equal under checksum; nothing to resolve
    Identical,
    /// One side supersedes the other
    Override { winner: Side },
    /// Both values retained; `dominant` is for display only
    Superposed { dominant: Side },
}

/// The decision record for one field comparison during a sync pass.
///
/// Transient: if the outcome is superposed, what persists is the
/// multi-valued cell, not this record. `remote_collapsed` is set by the
/// applying step when a superposed cell is written remotely as its dominant
/// value only, so the information loss stays auditable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Entity the field belongs to
    pub entity_id: EntityId,
    /// Field under comparison
    pub field: FieldName,
    /// Local value and provenance
    pub local: ContextualValue,
    /// Remote value and provenance
    pub remote: ContextualValue,
    /// The decision
    pub outcome: ConflictOutcome,
    /// True when a superposed result was written remotely as dominant-only
    pub remote_collapsed: bool,
}

impl Conflict {
    /// The value that won (or dominates) this comparison.
    pub fn winning_value(&self) -> &ContextualValue {
        match &self.outcome {
            ConflictOutcome::Identical => &self.remote,
            ConflictOutcome::Override { winner } => self.side(*winner),
            ConflictOutcome::Superposed { dominant } => self.side(*dominant),
        }
    }

    fn side(&self, side: Side) -> &ContextualValue {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }

    /// Build the superposed cell for a superposed outcome, dominant last
    /// pointer preserved. Returns an error for other outcomes.
    pub fn superposed_cell(&self) -> Result<SuperposedCell> {
        match &self.outcome {
            ConflictOutcome::Superposed { dominant } => {
                let dominant_index = match dominant {
                    Side::Local => 0,
                    Side::Remote => 1,
                };
                SuperposedCell::new(
                    vec![self.local.clone(), self.remote.clone()],
                    dominant_index,
                )
            }
            _ => Err(crate::Error::InvalidSuperposition(
                "outcome is not superposed".into(),
            )),
        }
    }

    /// Resolution metadata for the sync change record.
    pub fn resolution_metadata(&self) -> serde_json::Value {
        let outcome = match &self.outcome {
            ConflictOutcome::Identical => "identical",
            ConflictOutcome::Override { .. } => "override",
            ConflictOutcome::Superposed { .. } => "superposed",
        };
        let winner = match &self.outcome {
            ConflictOutcome::Identical => None,
            ConflictOutcome::Override { winner } => Some(*winner),
            ConflictOutcome::Superposed { dominant } => Some(*dominant),
        };
        serde_json::json!({
            "outcome": outcome,
            "winner": winner,
            "remoteCollapsed": self.remote_collapsed,
        })
    }
}

/// Default window within which two captures count as the same timeframe.
pub const DEFAULT_TIMEFRAME_TOLERANCE_MS: u64 = 24 * 60 * 60 * 1000;

/// Resolves local/remote value pairs under a configured strategy.
#[derive(Debug, Clone)]
pub struct Resolver {
    strategy: ConflictStrategy,
    authority: AuthorityRanking,
    /// Captures further apart than this are "non-overlapping timeframes"
    timeframe_tolerance: u64,
    /// Active view context filter; biases dominance toward its scale
    view_scale: Option<Scale>,
}

impl Resolver {
    /// Create a resolver with default authority ranking and tolerance.
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self {
            strategy,
            authority: AuthorityRanking::default(),
            timeframe_tolerance: DEFAULT_TIMEFRAME_TOLERANCE_MS,
            view_scale: None,
        }
    }

    /// Replace the authority ranking.
    pub fn with_authority(mut self, authority: AuthorityRanking) -> Self {
        self.authority = authority;
        self
    }

    /// Replace the timeframe tolerance.
    pub fn with_timeframe_tolerance(mut self, tolerance_ms: u64) -> Self {
        self.timeframe_tolerance = tolerance_ms;
        self
    }

    /// Set the view's context filter, biasing dominance toward a scale.
    pub fn with_view_scale(mut self, scale: Option<Scale>) -> Self {
        self.view_scale = scale;
        self
    }

    /// The active strategy.
    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Resolve one field comparison. Total over well-formed input: always
    /// returns exactly one outcome, never fails. Contexts are required by
    /// construction of [`ContextualValue`].
    pub fn resolve(
        &self,
        entity_id: impl Into<EntityId>,
        field: impl Into<FieldName>,
        local: ContextualValue,
        remote: ContextualValue,
    ) -> Conflict {
        let outcome = if checksum(&local.value) == checksum(&remote.value) {
            ConflictOutcome::Identical
        } else {
            match self.strategy {
                ConflictStrategy::LocalWins => ConflictOutcome::Override { winner: Side::Local },
                ConflictStrategy::RemoteWins => ConflictOutcome::Override {
                    winner: Side::Remote,
                },
                ConflictStrategy::NewestWins => ConflictOutcome::Override {
                    winner: self.newest(&local, &remote),
                },
                ConflictStrategy::Superposition => {
                    if self.contexts_diverge(&local, &remote) {
                        ConflictOutcome::Superposed {
                            dominant: self.dominant(&local, &remote),
                        }
                    } else {
                        ConflictOutcome::Override {
                            winner: self.more_authoritative(&local, &remote),
                        }
                    }
                }
            }
        };

        Conflict {
            entity_id: entity_id.into(),
            field: field.into(),
            local,
            remote,
            outcome,
            remote_collapsed: false,
        }
    }

    /// Contexts diverge when the values were obtained differently, apply at
    /// different scales, or were captured in non-overlapping timeframes.
    fn contexts_diverge(&self, local: &ContextualValue, remote: &ContextualValue) -> bool {
        let lc = &local.context;
        let rc = &remote.context;
        lc.method != rc.method
            || lc.scale != rc.scale
            || lc.captured_at.abs_diff(rc.captured_at) > self.timeframe_tolerance
    }

    /// Newer capture wins; exact ties go to remote.
    fn newest(&self, local: &ContextualValue, remote: &ContextualValue) -> Side {
        if local.context.captured_at > remote.context.captured_at {
            Side::Local
        } else {
            Side::Remote
        }
    }

    /// Higher authority rank wins; rank ties fall back to recency.
    fn more_authoritative(&self, local: &ContextualValue, remote: &ContextualValue) -> Side {
        let local_rank = self.authority.rank(local.context.method);
        let remote_rank = self.authority.rank(remote.context.method);
        match local_rank.cmp(&remote_rank) {
            std::cmp::Ordering::Greater => Side::Local,
            std::cmp::Ordering::Less => Side::Remote,
            std::cmp::Ordering::Equal => self.newest(local, remote),
        }
    }

    /// Dominance for display: the view's scale filter if it singles out one
    /// side, else the newer capture, else the authority ranking.
    fn dominant(&self, local: &ContextualValue, remote: &ContextualValue) -> Side {
        if let Some(scale) = self.view_scale {
            match (local.context.scale == scale, remote.context.scale == scale) {
                (true, false) => return Side::Local,
                (false, true) => return Side::Remote,
                _ => {}
            }
        }
        if local.context.captured_at != remote.context.captured_at {
            return self.newest(local, remote);
        }
        self.more_authoritative(local, remote)
    }
}
