//! Error types for the battle simulation.

use thiserror::Error;

use crate::components::EntityId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all battle simulation errors.
///
/// Expected combat outcomes (an attack on a dead target, an orphaned
/// projectile, a full splash list) are not errors and never surface here.
#[derive(Debug, Error)]
pub enum GameError {
    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// An entity with this id is already registered.
    #[error("Entity already registered: {0}")]
    DuplicateEntity(EntityId),

    /// A configuration value is out of its allowed range.
    #[error("Invalid configuration '{field}': {reason}")]
    InvalidConfig {
        /// Dotted path of the offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The unit catalog has no entry for this type and level.
    #[error("Unknown unit type '{type_id}' at level {level}")]
    UnknownUnitType {
        /// Catalog type identifier.
        type_id: String,
        /// Upgrade level.
        level: u8,
    },

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Invalid battle state.
    #[error("Invalid battle state: {0}")]
    InvalidState(String),

    /// Desync detected between two hosts of the same battle.
    #[error("Desync detected at tick {tick}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Local simulation hash.
        local_hash: u64,
        /// Remote simulation hash.
        remote_hash: u64,
    },
}

impl GameError {
    /// Shorthand for an [`GameError::InvalidConfig`] error.
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
