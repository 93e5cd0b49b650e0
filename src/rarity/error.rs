//! Error types for the rarity engine

use thiserror::Error;

use crate::db::models::Scope;

/// Failures that stop a single record from being rated.
///
/// Partition read failures are not represented here: the population layer
/// absorbs them (logged, zero contribution) and reports them through the
/// degraded flag instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RarityError {
    /// Sport name with no rarity table
    #[error("unknown sport: {0}")]
    UnknownSport(String),

    /// Position name that is not a roster slot
    #[error("unknown position: {0}")]
    UnknownPosition(String),

    /// Valid sport and position, but no adapter registered for the pair
    #[error("no rarity adapter registered for {0}")]
    UnregisteredScope(Scope),

    /// Record handed to an engine built for a different scope
    #[error("record scope {found} does not match engine scope {expected}")]
    ScopeMismatch { expected: Scope, found: Scope },

    /// A value fell outside every bucket of a rule. Only possible when a rule
    /// is missing its open top bucket.
    #[error("bucket rule for '{stat}' has no bucket for value {value}")]
    BucketRuleGap { stat: String, value: f64 },

    /// A bucket table failed validation
    #[error("invalid bucket rule for '{stat}': {reason}")]
    InvalidBucketRule { stat: String, reason: String },
}

impl RarityError {
    /// Whether the error points at a defect in the bucket tables rather than
    /// at the record being rated.
    pub fn is_configuration_defect(&self) -> bool {
        matches!(
            self,
            RarityError::BucketRuleGap { .. } | RarityError::InvalidBucketRule { .. }
        )
    }
}
