//! Per-battle tuning parameters.
//!
//! A [`BattleConfig`] is validated once when a battle is constructed so that
//! malformed values fail fast instead of surfacing mid-tick. Every field has
//! a default, so RON files only need to name what they override.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::{fixed_decimal, Fixed};

/// Reference simulation rate in ticks per second.
pub const DEFAULT_TICK_RATE: u32 = 20;

/// Lower bound of the splash dropoff curve.
pub const SPLASH_DROPOFF_FLOOR: f64 = 0.3;

/// Top-level configuration of one battle instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Battle ends when this many ticks have elapsed.
    pub max_duration_ticks: u64,
    /// Projectile impacts resolved per tick; the rest wait for the next tick.
    pub max_projectile_resolutions_per_tick: usize,
    /// Target selection tuning.
    pub targeting: TargetingConfig,
    /// Damage resolution tuning.
    pub combat: CombatConfig,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            // Three minutes of play.
            max_duration_ticks: 3 * 60 * u64::from(DEFAULT_TICK_RATE),
            max_projectile_resolutions_per_tick: 64,
            targeting: TargetingConfig::default(),
            combat: CombatConfig::default(),
        }
    }
}

/// Target scoring weights and switching policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetingConfig {
    /// Hard cap on targeting distance, applied on top of each unit's sight range.
    #[serde(with = "fixed_decimal")]
    pub max_range: Fixed,
    /// Numerator of the inverse-distance bonus.
    #[serde(with = "fixed_decimal")]
    pub distance_weight: Fixed,
    /// Maximum contribution of the distance bonus.
    #[serde(with = "fixed_decimal")]
    pub distance_bonus_cap: Fixed,
    /// Distances below this are treated as this value when scoring.
    #[serde(with = "fixed_decimal")]
    pub min_distance: Fixed,
    /// Flat bonus for structures.
    #[serde(with = "fixed_decimal")]
    pub structure_bonus: Fixed,
    /// Weight of the missing-health bonus, applied below half health.
    #[serde(with = "fixed_decimal")]
    pub low_hp_weight: Fixed,
    /// Flat bonus for tanks.
    #[serde(with = "fixed_decimal")]
    pub tank_bonus: Fixed,
    /// Max hit points at or above which a candidate counts as a tank.
    pub tank_hp_threshold: u32,
    /// Flat bonus for the attacker's current target.
    #[serde(with = "fixed_decimal")]
    pub hysteresis_bonus: Fixed,
    /// Flat penalty for a candidate any attacker selected recently.
    #[serde(with = "fixed_decimal")]
    pub recency_penalty: Fixed,
    /// Length of the "recently selected" window.
    pub recency_window_ticks: u64,
    /// How often stale recency entries are pruned.
    pub recency_prune_interval_ticks: u64,
    /// Score gap that maps to full confidence.
    #[serde(with = "fixed_decimal")]
    pub confidence_normalizer: Fixed,
    /// Confidence required to abandon a still-valid current target.
    #[serde(with = "fixed_decimal")]
    pub switch_threshold: Fixed,
    /// Confidence reported when the current target is kept.
    #[serde(with = "fixed_decimal")]
    pub retained_confidence: Fixed,
    /// Runner-up candidates reported per decision.
    pub max_runner_ups: usize,
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self {
            max_range: Fixed::from_num(12),
            distance_weight: Fixed::from_num(10),
            distance_bonus_cap: Fixed::from_num(20),
            min_distance: Fixed::from_num(0.5),
            structure_bonus: Fixed::from_num(4),
            low_hp_weight: Fixed::from_num(10),
            tank_bonus: Fixed::from_num(3),
            tank_hp_threshold: 3000,
            hysteresis_bonus: Fixed::from_num(5),
            recency_penalty: Fixed::from_num(2),
            recency_window_ticks: 40,
            recency_prune_interval_ticks: 100,
            confidence_normalizer: Fixed::from_num(10),
            switch_threshold: Fixed::from_num(0.3),
            retained_confidence: Fixed::from_num(0.5),
            max_runner_ups: 3,
        }
    }
}

/// Damage pipeline tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Roll for critical hits.
    pub crit_enabled: bool,
    /// Chance of a critical hit, in `[0, 1]`.
    #[serde(with = "fixed_decimal")]
    pub crit_chance: Fixed,
    /// Damage multiplier on a critical hit, at least 1.
    #[serde(with = "fixed_decimal")]
    pub crit_multiplier: Fixed,
    /// Multiplier applied to damage against crown towers, in `(0, 1]`.
    #[serde(with = "fixed_decimal")]
    pub crown_tower_damage_factor: Fixed,
    /// Secondary targets hit by one splash, nearest first.
    pub max_splash_targets: usize,
    /// Upper bound on knockback displacement, in tiles.
    #[serde(with = "fixed_decimal")]
    pub max_knockback_distance: Fixed,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            crit_enabled: false,
            crit_chance: Fixed::from_num(0.1),
            crit_multiplier: Fixed::from_num(1.5),
            crown_tower_damage_factor: Fixed::from_num(0.35),
            max_splash_targets: 12,
            max_knockback_distance: Fixed::from_num(2),
        }
    }
}

impl BattleConfig {
    /// Parse a configuration from RON text and validate it.
    ///
    /// `origin` names the source in error messages.
    pub fn from_ron_str(source: &str, origin: &str) -> Result<Self> {
        let config: Self = ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Duration of one tick in whole milliseconds.
    #[must_use]
    pub fn tick_duration_ms(&self) -> u32 {
        1000 / self.tick_rate.max(1)
    }

    /// Check every numeric range.
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(GameError::config("tick_rate", "must be in 1..=1000"));
        }
        if self.max_duration_ticks == 0 {
            return Err(GameError::config("max_duration_ticks", "must be positive"));
        }
        if self.max_projectile_resolutions_per_tick == 0 {
            return Err(GameError::config(
                "max_projectile_resolutions_per_tick",
                "must be positive",
            ));
        }
        self.targeting.validate()?;
        self.combat.validate()
    }
}

impl TargetingConfig {
    fn validate(&self) -> Result<()> {
        positive("targeting.max_range", self.max_range)?;
        positive("targeting.min_distance", self.min_distance)?;
        positive("targeting.confidence_normalizer", self.confidence_normalizer)?;
        for (field, value) in [
            ("targeting.distance_weight", self.distance_weight),
            ("targeting.distance_bonus_cap", self.distance_bonus_cap),
            ("targeting.structure_bonus", self.structure_bonus),
            ("targeting.low_hp_weight", self.low_hp_weight),
            ("targeting.tank_bonus", self.tank_bonus),
            ("targeting.hysteresis_bonus", self.hysteresis_bonus),
            ("targeting.recency_penalty", self.recency_penalty),
        ] {
            non_negative(field, value)?;
        }
        unit_interval("targeting.switch_threshold", self.switch_threshold)?;
        unit_interval("targeting.retained_confidence", self.retained_confidence)?;
        if self.recency_prune_interval_ticks == 0 {
            return Err(GameError::config(
                "targeting.recency_prune_interval_ticks",
                "must be positive",
            ));
        }
        Ok(())
    }
}

impl CombatConfig {
    fn validate(&self) -> Result<()> {
        unit_interval("combat.crit_chance", self.crit_chance)?;
        if self.crit_multiplier < Fixed::ONE {
            return Err(GameError::config("combat.crit_multiplier", "must be at least 1"));
        }
        positive("combat.crown_tower_damage_factor", self.crown_tower_damage_factor)?;
        unit_interval("combat.crown_tower_damage_factor", self.crown_tower_damage_factor)?;
        if self.max_splash_targets == 0 {
            return Err(GameError::config("combat.max_splash_targets", "must be positive"));
        }
        non_negative("combat.max_knockback_distance", self.max_knockback_distance)
    }
}

fn positive(field: &str, value: Fixed) -> Result<()> {
    if value <= Fixed::ZERO {
        return Err(GameError::config(field, format!("must be positive, got {value}")));
    }
    Ok(())
}

fn non_negative(field: &str, value: Fixed) -> Result<()> {
    if value < Fixed::ZERO {
        return Err(GameError::config(field, format!("must not be negative, got {value}")));
    }
    Ok(())
}

pub(crate) fn unit_interval(field: &str, value: Fixed) -> Result<()> {
    if value < Fixed::ZERO || value > Fixed::ONE {
        return Err(GameError::config(field, format!("must be in [0, 1], got {value}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BattleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_duration_ms(), 50);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = BattleConfig::from_ron_str(
            "(tick_rate: 10, combat: (crit_enabled: true, crit_chance: 0.25))",
            "inline",
        )
        .unwrap();
        assert_eq!(config.tick_rate, 10);
        assert!(config.combat.crit_enabled);
        assert_eq!(config.combat.crit_chance, Fixed::from_num(0.25));
        assert_eq!(config.targeting, TargetingConfig::default());
    }

    #[test]
    fn test_rejects_zero_tick_rate() {
        let config = BattleConfig {
            tick_rate: 0,
            ..BattleConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, GameError::InvalidConfig { ref field, .. } if field == "tick_rate"));
    }

    #[test]
    fn test_rejects_out_of_range_fractions() {
        let mut config = BattleConfig::default();
        config.targeting.switch_threshold = Fixed::from_num(1.5);
        assert!(config.validate().is_err());

        let mut config = BattleConfig::default();
        config.combat.crown_tower_damage_factor = Fixed::ZERO;
        assert!(config.validate().is_err());

        let mut config = BattleConfig::default();
        config.combat.crit_multiplier = Fixed::from_num(0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_ron_reports_origin() {
        let err = BattleConfig::from_ron_str("(tick_rate: \"fast\")", "battle.ron").unwrap_err();
        assert!(matches!(err, GameError::DataParseError { ref path, .. } if path == "battle.ron"));
    }
}
