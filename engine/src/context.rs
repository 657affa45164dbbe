//! Value provenance: who asserted a value, how, at what scale, and when.
//!
//! Contexts are what let the resolver tell a genuine contradiction apart
//! from two facets of the same fact. Two differing values with differing
//! contexts can coexist (superposition); two differing values with
//! compatible contexts cannot, and one must override.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// How a value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMethod {
    /// Stated by a person without measurement
    Declared,
    /// Directly observed or instrumented
    Measured,
    /// Rolled up from multiple measurements
    Aggregated,
    /// Guessed by a model or heuristic
    Inferred,
    /// Computed from other stored values
    Derived,
    /// Provenance not known (synthesized contexts)
    Unknown,
}

/// Organizational scale a value applies at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Individual,
    Team,
    Organization,
    Unknown,
}

/// The acting agent behind a change or assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agent {
    /// A named user
    User(String),
    /// The system itself (sync passes, synthesized contexts)
    System,
}

impl Agent {
    /// Display name for activity summaries.
    pub fn name(&self) -> &str {
        match self {
            Agent::User(name) => name,
            Agent::System => "system",
        }
    }
}

/// Metadata describing how a value was asserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueContext {
    /// How the value was obtained
    pub method: CaptureMethod,
    /// Scale the value applies at
    pub scale: Scale,
    /// When the value was captured (milliseconds since epoch)
    pub captured_at: Timestamp,
    /// Who asserted it
    pub agent: Agent,
}

impl ValueContext {
    /// Create a context.
    pub fn new(method: CaptureMethod, scale: Scale, captured_at: Timestamp, agent: Agent) -> Self {
        Self {
            method,
            scale,
            captured_at,
            agent,
        }
    }

    /// The synthesized "unknown/system/now" context, for values whose
    /// provenance the caller cannot supply (e.g. raw remote payloads).
    pub fn system(captured_at: Timestamp) -> Self {
        Self {
            method: CaptureMethod::Unknown,
            scale: Scale::Unknown,
            captured_at,
            agent: Agent::System,
        }
    }
}

/// A value together with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextualValue {
    /// The JSON value
    pub value: serde_json::Value,
    /// Its context
    pub context: ValueContext,
}

impl ContextualValue {
    /// Pair a value with its context.
    pub fn new(value: serde_json::Value, context: ValueContext) -> Self {
        Self { value, context }
    }
}

/// Named, configurable authority ordering over capture methods.
///
/// Used as a tie-break when two differing values have compatible contexts:
/// the more authoritative method overrides. The default ascending order is
/// unknown < inferred < derived < declared < measured < aggregated. This is
/// policy, not physics - construct a custom ranking to change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityRanking {
    /// Methods in ascending authority; unlisted methods rank lowest
    order: Vec<CaptureMethod>,
}

impl AuthorityRanking {
    /// Build a ranking from methods listed in ascending authority.
    pub fn new(order: Vec<CaptureMethod>) -> Self {
        Self { order }
    }

    /// Rank of a method; higher means more authoritative.
    pub fn rank(&self, method: CaptureMethod) -> usize {
        self.order
            .iter()
            .position(|m| *m == method)
            .map(|p| p + 1)
            .unwrap_or(0)
    }
}

impl Default for AuthorityRanking {
    fn default() -> Self {
        Self::new(vec![
            CaptureMethod::Unknown,
            CaptureMethod::Inferred,
            CaptureMethod::Derived,
            CaptureMethod::Declared,
            CaptureMethod::Measured,
            CaptureMethod::Aggregated,
        ])
    }
}
