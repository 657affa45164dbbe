//! Cell values: single or superposed.
//!
//! A superposed cell is the stored consequence of a superposition decision:
//! the field keeps every contextually-distinct value, with one marked
//! dominant for default display. Dominance never discards the others.

use crate::{
    context::ContextualValue,
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};

/// Two or more coexisting values for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperposedCell {
    /// All retained alternatives, in the order they were superposed
    alternatives: Vec<ContextualValue>,
    /// Index of the dominant alternative (display default)
    dominant: usize,
}

impl SuperposedCell {
    /// Build a superposed cell. Requires at least two alternatives and a
    /// valid dominant index.
    pub fn new(alternatives: Vec<ContextualValue>, dominant: usize) -> Result<Self> {
        if alternatives.len() < 2 {
            return Err(Error::InvalidSuperposition(format!(
                "need at least 2 alternatives, got {}",
                alternatives.len()
            )));
        }
        if dominant >= alternatives.len() {
            return Err(Error::InvalidSuperposition(format!(
                "dominant index {} out of range for {} alternatives",
                dominant,
                alternatives.len()
            )));
        }
        Ok(Self {
            alternatives,
            dominant,
        })
    }

    /// The dominant alternative.
    pub fn dominant(&self) -> &ContextualValue {
        &self.alternatives[self.dominant]
    }

    /// Index of the dominant alternative.
    pub fn dominant_index(&self) -> usize {
        self.dominant
    }

    /// All alternatives, dominant included.
    pub fn alternatives(&self) -> &[ContextualValue] {
        &self.alternatives
    }

    /// Add another alternative, optionally making it dominant.
    pub fn push(&mut self, value: ContextualValue, make_dominant: bool) {
        self.alternatives.push(value);
        if make_dominant {
            self.dominant = self.alternatives.len() - 1;
        }
    }

    /// Re-point dominance without touching the alternatives.
    pub fn set_dominant(&mut self, index: usize) -> Result<()> {
        if index >= self.alternatives.len() {
            return Err(Error::InvalidSuperposition(format!(
                "dominant index {} out of range for {} alternatives",
                index,
                self.alternatives.len()
            )));
        }
        self.dominant = index;
        Ok(())
    }

    /// Collapse to the dominant value, e.g. for a remote store that cannot
    /// represent superposition. This is lossy by design and must be audited
    /// by the caller; the cell itself stays intact locally.
    pub fn collapse(&self) -> &ContextualValue {
        self.dominant()
    }
}

/// A field's stored value: one value, or several in superposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CellValue {
    Single(ContextualValue),
    Superposed(SuperposedCell),
}

impl CellValue {
    /// The value shown by default: the single value, or the dominant
    /// alternative of a superposition.
    pub fn display_value(&self) -> &serde_json::Value {
        match self {
            CellValue::Single(cv) => &cv.value,
            CellValue::Superposed(cell) => &cell.dominant().value,
        }
    }

    /// Context of the displayed value.
    pub fn display_context(&self) -> &crate::context::ValueContext {
        match self {
            CellValue::Single(cv) => &cv.context,
            CellValue::Superposed(cell) => &cell.dominant().context,
        }
    }

    /// Whether this cell holds more than one value.
    pub fn is_superposed(&self) -> bool {
        matches!(self, CellValue::Superposed(_))
    }
}
