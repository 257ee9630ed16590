//! Initial layout of a battle.
//!
//! A [`BattleSetup`] lists the combatants present at tick 0 (normally the
//! towers) and the deployments that enter later. It is data only; catalog
//! lookups happen when the battle is built.

use serde::{Deserialize, Serialize};

use crate::components::PlayerId;
use crate::data::UnitCatalog;
use crate::error::{GameError, Result};
use crate::math::{vec2_decimal, Fixed, Vec2Fixed};

/// One combatant to place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Owning player.
    pub owner: PlayerId,
    /// Catalog type id.
    pub unit_type: String,
    /// Catalog level.
    #[serde(default = "default_level")]
    pub level: u8,
    /// Position in tiles.
    #[serde(with = "vec2_decimal")]
    pub position: Vec2Fixed,
}

const fn default_level() -> u8 {
    1
}

impl Placement {
    /// Create a placement.
    #[must_use]
    pub fn new(owner: PlayerId, unit_type: impl Into<String>, level: u8, position: Vec2Fixed) -> Self {
        Self {
            owner,
            unit_type: unit_type.into(),
            level,
            position,
        }
    }
}

/// A placement that enters the arena at a given tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    /// Tick at which the unit appears.
    pub tick: u64,
    /// What to place.
    pub unit: Placement,
}

/// Everything needed to start a battle besides configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattleSetup {
    /// Combatants present at tick 0.
    #[serde(default)]
    pub placements: Vec<Placement>,
    /// Combatants entering later.
    #[serde(default)]
    pub deployments: Vec<Deployment>,
}

/// Arena width in tiles.
pub const ARENA_WIDTH: i32 = 18;
/// Arena height in tiles.
pub const ARENA_HEIGHT: i32 = 32;

impl BattleSetup {
    /// Two players facing each other with two side towers and one king
    /// tower each, on an 18x32 arena. Player 0 holds the bottom half.
    #[must_use]
    pub fn standard_arena(side_tower: &str, king_tower: &str, level: u8) -> Self {
        let half = Fixed::from_num(0.5);
        let at = |x: i32, y: i32| Vec2Fixed::new(Fixed::from_num(x) + half, Fixed::from_num(y) + half);
        let mut placements = Vec::with_capacity(6);
        for (owner, side_y, king_y) in [(0, 6, 2), (1, ARENA_HEIGHT - 7, ARENA_HEIGHT - 3)] {
            placements.push(Placement::new(owner, side_tower, level, at(3, side_y)));
            placements.push(Placement::new(owner, side_tower, level, at(ARENA_WIDTH - 4, side_y)));
            placements.push(Placement::new(owner, king_tower, level, at(ARENA_WIDTH / 2 - 1, king_y)));
        }
        Self {
            placements,
            deployments: Vec::new(),
        }
    }

    /// Add a deployment.
    #[must_use]
    pub fn with_deployment(mut self, tick: u64, unit: Placement) -> Self {
        self.deployments.push(Deployment { tick, unit });
        self
    }

    /// Check that every referenced type exists and that two sides are present.
    pub fn validate(&self, catalog: &UnitCatalog) -> Result<()> {
        let all = self
            .placements
            .iter()
            .chain(self.deployments.iter().map(|d| &d.unit));
        let mut owners = Vec::new();
        for placement in all {
            catalog.get(&placement.unit_type, placement.level)?;
            if !owners.contains(&placement.owner) {
                owners.push(placement.owner);
            }
        }
        if owners.len() < 2 {
            return Err(GameError::config(
                "setup",
                format!("a battle needs at least two players, found {}", owners.len()),
            ));
        }
        Ok(())
    }

    /// Players appearing in the setup, ascending.
    #[must_use]
    pub fn players(&self) -> Vec<PlayerId> {
        let mut players: Vec<PlayerId> = self
            .placements
            .iter()
            .chain(self.deployments.iter().map(|d| &d.unit))
            .map(|p| p.owner)
            .collect();
        players.sort_unstable();
        players.dedup();
        players
    }
}
