//! Scenario loading and configuration.
//!
//! A scenario bundles everything needed to start a battle headlessly: the
//! unit catalog (a file or inline entries), battle tuning, the tower layout
//! and the timed deployments of each side.

use std::path::{Path, PathBuf};

use arena_core::config::BattleConfig;
use arena_core::data::{UnitCatalog, UnitStats};
use arena_core::error::GameError;
use arena_core::scheduler::Battle;
use arena_core::setup::BattleSetup;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The battle could not be built from the scenario.
    #[error("Invalid scenario: {0}")]
    Game(#[from] GameError),
    /// The batch worker pool could not be started.
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Where the unit catalog comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CatalogSource {
    /// A RON catalog file, relative to the scenario file.
    File(PathBuf),
    /// Entries written directly into the scenario.
    Inline(Vec<UnitStats>),
}

/// Standard six-tower layout placed before any scenario placements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TowerLayout {
    /// Catalog type of the four side towers.
    pub side_tower: String,
    /// Catalog type of the two king towers.
    pub king_tower: String,
    /// Level of every tower.
    #[serde(default = "default_tower_level")]
    pub level: u8,
}

const fn default_tower_level() -> u8 {
    1
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Seed used when none is given on the command line.
    #[serde(default)]
    pub seed: u64,
    /// Unit catalog.
    pub catalog: CatalogSource,
    /// Battle tuning; every field defaults.
    #[serde(default)]
    pub config: BattleConfig,
    /// Towers to place, if any.
    #[serde(default)]
    pub towers: Option<TowerLayout>,
    /// Placements and deployments.
    #[serde(default)]
    pub setup: BattleSetup,
    /// Directory relative catalog paths are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut scenario = Self::from_ron_str(&contents)?;
        scenario.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    ///
    /// Relative catalog paths resolve against the working directory.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Resolve the unit catalog.
    pub fn load_catalog(&self) -> Result<UnitCatalog, ScenarioError> {
        match &self.catalog {
            CatalogSource::Inline(units) => Ok(UnitCatalog::from_units(units.iter().cloned())?),
            CatalogSource::File(relative) => {
                let path = self.base_dir.join(relative);
                if !path.exists() {
                    return Err(ScenarioError::FileNotFound(path.display().to_string()));
                }
                let contents = std::fs::read_to_string(&path)?;
                Ok(UnitCatalog::from_ron_str(
                    &contents,
                    &path.display().to_string(),
                )?)
            }
        }
    }

    /// Full setup: tower layout first, then the scenario's own entries.
    #[must_use]
    pub fn battle_setup(&self) -> BattleSetup {
        let Some(towers) = &self.towers else {
            return self.setup.clone();
        };
        let mut setup =
            BattleSetup::standard_arena(&towers.side_tower, &towers.king_tower, towers.level);
        setup.placements.extend(self.setup.placements.iter().cloned());
        setup.deployments.extend(self.setup.deployments.iter().cloned());
        setup
    }

    /// Build a fresh battle with `seed`, or the scenario's own seed.
    pub fn build_battle(&self, seed: Option<u64>) -> Result<Battle, ScenarioError> {
        let catalog = self.load_catalog()?;
        self.build_battle_with(&catalog, seed)
    }

    /// Build a battle from an already resolved catalog.
    ///
    /// Batch runs load the catalog once and share it across threads.
    pub fn build_battle_with(
        &self,
        catalog: &UnitCatalog,
        seed: Option<u64>,
    ) -> Result<Battle, ScenarioError> {
        let seed = seed.unwrap_or(self.seed);
        Ok(Battle::from_setup(
            self.config.clone(),
            catalog,
            &self.battle_setup(),
            seed,
        )?)
    }
}
