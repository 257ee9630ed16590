//! # Arena Battle Host
//!
//! Runs matched battles without rendering. Each battle is its own tokio
//! task paced at the battle tick rate; a semaphore caps how many run at
//! once.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

use std::path::{Path, PathBuf};

use arena_core::pacing::DriftPolicy;
use serde::{Deserialize, Serialize};

pub mod host;

pub use host::{BattleHost, BattleReport, HostError, HostHandle, MatchedPair};

/// Tower types placed for every hosted battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TowerTypes {
    /// Catalog type of the side towers.
    pub side_tower: String,
    /// Catalog type of the king towers.
    pub king_tower: String,
    /// Tower level.
    #[serde(default = "default_level")]
    pub level: u8,
}

const fn default_level() -> u8 {
    1
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Battles allowed to run at once.
    pub max_concurrent_battles: usize,
    /// Matched pairs buffered before senders wait.
    pub queue_capacity: usize,
    /// Pace ticks against the wall clock; otherwise run flat out.
    pub paced: bool,
    /// What a paced battle does when a tick is late.
    pub drift_policy: DriftPolicy,
    /// Unit catalog file.
    pub catalog_path: PathBuf,
    /// Battle tuning file; defaults apply when absent.
    pub battle_config_path: Option<PathBuf>,
    /// Towers placed before each pair's own setup.
    pub towers: Option<TowerTypes>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_battles: 64,
            queue_capacity: 256,
            paced: true,
            drift_policy: DriftPolicy::AcceptDrift,
            catalog_path: PathBuf::from("data/units.ron"),
            battle_config_path: Some(PathBuf::from("data/battle.ron")),
            towers: Some(TowerTypes {
                side_tower: "princess_tower".to_string(),
                king_tower: "king_tower".to_string(),
                level: 1,
            }),
        }
    }
}

impl ServerConfig {
    /// Load a configuration from a RON file.
    pub fn load(path: &Path) -> Result<Self, HostError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Parse a configuration from RON text.
    pub fn from_ron_str(source: &str) -> Result<Self, HostError> {
        let config: Self = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check limits.
    pub fn validate(&self) -> Result<(), HostError> {
        if self.max_concurrent_battles == 0 {
            return Err(HostError::Config(
                "max_concurrent_battles must be positive".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(HostError::Config("queue_capacity must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = ServerConfig::from_ron_str(
            "(max_concurrent_battles: 4, drift_policy: SkipToPreservePacing)",
        )
        .unwrap();
        assert_eq!(config.max_concurrent_battles, 4);
        assert_eq!(config.drift_policy, DriftPolicy::SkipToPreservePacing);
        assert_eq!(config.queue_capacity, 256);
        assert!(config.paced);
    }

    #[test]
    fn test_shipped_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data/server.ron");
        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = ServerConfig::from_ron_str("(max_concurrent_battles: 0)");
        assert!(matches!(result, Err(HostError::Config(_))));
    }
}
