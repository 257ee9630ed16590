//! Unit data structures for data-driven unit definitions.

use serde::{Deserialize, Serialize};

use crate::components::{
    AttackProfile, Capabilities, Classification, Combatant, DamageCategory, EntityId, EntityKind,
    PlayerId, ProjectileParams, SplashParams, StatusEffectParams,
};
use crate::config::unit_interval;
use crate::error::{GameError, Result};
use crate::math::{fixed_decimal, Fixed, Vec2Fixed};

/// Tag marking a unit as a tank for targeting.
pub const TAG_TANK: &str = "tank";
/// Tag marking a unit as airborne.
pub const TAG_FLYING: &str = "flying";
/// Tag marking a structure as a crown tower.
pub const TAG_CROWN_TOWER: &str = "crown_tower";
/// Tag allowing a unit to target flying combatants.
pub const TAG_TARGETS_AIR: &str = "targets_air";
/// Tag restricting a unit to flying targets only.
pub const TAG_AIR_ONLY: &str = "air_only";

/// Splash definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplashStats {
    /// Radius in tiles.
    #[serde(with = "fixed_decimal")]
    pub radius: Fixed,
    /// Fraction of base damage dealt to secondary targets.
    #[serde(with = "fixed_decimal")]
    pub damage_fraction: Fixed,
    /// Whether damage drops off with distance.
    #[serde(default)]
    pub dropoff: bool,
}

/// Projectile definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileStats {
    /// Travel speed in tiles per second.
    #[serde(with = "fixed_decimal")]
    pub speed: Fixed,
}

/// Attack definition. Units without one never attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackStats {
    /// Base damage per attack.
    pub damage: u32,
    /// Attack range in tiles.
    #[serde(with = "fixed_decimal")]
    pub range: Fixed,
    /// Ticks between attacks.
    pub cooldown_ticks: u32,
    /// Damage category.
    #[serde(default)]
    pub category: DamageCategory,
    /// Splash payload.
    #[serde(default)]
    pub splash: Option<SplashStats>,
    /// Projectile payload; absent for instant attacks.
    #[serde(default)]
    pub projectile: Option<ProjectileStats>,
    /// Stun applied on hit, in ticks.
    #[serde(default)]
    pub stun_ticks: u32,
    /// Knockback applied on hit, in tiles.
    #[serde(default, with = "fixed_decimal")]
    pub knockback: Fixed,
}

/// Data-driven definition of one unit type at one upgrade level.
///
/// # Example RON
///
/// ```ron
/// UnitStats(
///     id: "archer",
///     level: 1,
///     hit_points: 250,
///     walk_speed: 1.0,
///     sight_range: 6.0,
///     attack: Some(AttackStats(
///         damage: 90,
///         range: 5.0,
///         cooldown_ticks: 24,
///         projectile: Some(ProjectileStats(speed: 12.0)),
///     )),
///     tags: ["targets_air"],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Type identifier.
    pub id: String,
    /// Upgrade level.
    #[serde(default = "default_level")]
    pub level: u8,
    /// Unit or structure.
    #[serde(default)]
    pub kind: EntityKind,
    /// Maximum hit points.
    pub hit_points: u32,
    /// Starting shield points.
    #[serde(default)]
    pub shield: u32,
    /// Flat physical damage reduction.
    #[serde(default)]
    pub armor: u32,
    /// Fractional spell damage reduction.
    #[serde(default, with = "fixed_decimal")]
    pub spell_resistance: Fixed,
    /// Walking speed in tiles per second.
    #[serde(default, with = "fixed_decimal")]
    pub walk_speed: Fixed,
    /// Distance at which enemies are noticed.
    #[serde(with = "fixed_decimal")]
    pub sight_range: Fixed,
    /// Attack definition.
    #[serde(default)]
    pub attack: Option<AttackStats>,
    /// Relative mass.
    #[serde(default = "default_mass")]
    pub mass: u32,
    /// Tags such as `tank`, `flying`, `crown_tower`, `targets_air`.
    #[serde(default)]
    pub tags: Vec<String>,
}

const fn default_level() -> u8 {
    1
}

const fn default_mass() -> u32 {
    1
}

impl UnitStats {
    /// Check if this unit has the specified tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Catalog key.
    #[must_use]
    pub fn key(&self) -> (String, u8) {
        (self.id.clone(), self.level)
    }

    /// Resolve the capability set from tags and attack data.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        let air_only = self.has_tag(TAG_AIR_ONLY);
        Capabilities {
            can_target_air: air_only || self.has_tag(TAG_TARGETS_AIR),
            can_target_ground: !air_only,
            has_splash: self.attack.as_ref().is_some_and(|a| a.splash.is_some()),
            launches_projectiles: self.attack.as_ref().is_some_and(|a| a.projectile.is_some()),
        }
    }

    /// Classification hints derived from tags.
    #[must_use]
    pub fn classification(&self) -> Classification {
        Classification {
            flying: self.has_tag(TAG_FLYING),
            tank: self.has_tag(TAG_TANK),
            crown_tower: self.has_tag(TAG_CROWN_TOWER),
            mass: self.mass,
        }
    }

    /// Runtime attack profile.
    #[must_use]
    pub fn attack_profile(&self) -> AttackProfile {
        let Some(attack) = &self.attack else {
            return AttackProfile {
                sight_range: self.sight_range,
                ..AttackProfile::default()
            };
        };
        AttackProfile {
            can_attack: attack.damage > 0,
            range: attack.range,
            sight_range: self.sight_range,
            damage: attack.damage,
            category: attack.category,
            cooldown_ticks: attack.cooldown_ticks,
            last_attack_tick: None,
            splash: attack.splash.as_ref().map(|s| SplashParams {
                radius: s.radius,
                damage_fraction: s.damage_fraction,
                dropoff: s.dropoff,
            }),
            projectile: attack
                .projectile
                .as_ref()
                .map(|p| ProjectileParams { speed: p.speed }),
            effects: StatusEffectParams {
                stun_ticks: attack.stun_ticks,
                knockback: attack.knockback,
            },
        }
    }

    /// Build a live combatant of this type.
    ///
    /// Capabilities are resolved here, once, and never recomputed.
    #[must_use]
    pub fn spawn(&self, id: EntityId, owner: PlayerId, position: Vec2Fixed) -> Combatant {
        let walk_speed = match self.kind {
            EntityKind::Unit => self.walk_speed,
            EntityKind::Structure => Fixed::ZERO,
        };
        Combatant::new(id, owner, self.kind, position, self.hit_points)
            .with_type(self.id.clone(), self.level)
            .with_attack(self.attack_profile())
            .with_shield(self.shield)
            .with_armor(self.armor)
            .with_spell_resistance(self.spell_resistance)
            .with_classification(self.classification())
            .with_capabilities(self.capabilities())
            .with_walk_speed(walk_speed)
    }

    /// Reject values the simulation cannot handle.
    pub fn validate(&self) -> Result<()> {
        let field = |name: &str| format!("{}@{}.{name}", self.id, self.level);
        if self.id.is_empty() {
            return Err(GameError::config("id", "unit id must not be empty"));
        }
        if self.hit_points == 0 {
            return Err(GameError::config(field("hit_points"), "must be positive"));
        }
        unit_interval(&field("spell_resistance"), self.spell_resistance)?;
        if self.walk_speed < Fixed::ZERO {
            return Err(GameError::config(field("walk_speed"), "must not be negative"));
        }
        if self.sight_range <= Fixed::ZERO {
            return Err(GameError::config(field("sight_range"), "must be positive"));
        }
        if let Some(attack) = &self.attack {
            if attack.range <= Fixed::ZERO {
                return Err(GameError::config(field("attack.range"), "must be positive"));
            }
            if attack.cooldown_ticks == 0 {
                return Err(GameError::config(field("attack.cooldown_ticks"), "must be positive"));
            }
            if attack.knockback < Fixed::ZERO {
                return Err(GameError::config(field("attack.knockback"), "must not be negative"));
            }
            if let Some(splash) = &attack.splash {
                if splash.radius <= Fixed::ZERO {
                    return Err(GameError::config(field("attack.splash.radius"), "must be positive"));
                }
                unit_interval(&field("attack.splash.damage_fraction"), splash.damage_fraction)?;
            }
            if let Some(projectile) = &attack.projectile {
                if projectile.speed <= Fixed::ZERO {
                    return Err(GameError::config(
                        field("attack.projectile.speed"),
                        "must be positive",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_unit() -> UnitStats {
        UnitStats {
            id: "musketeer".to_string(),
            level: 1,
            kind: EntityKind::Unit,
            hit_points: 600,
            shield: 0,
            armor: 0,
            spell_resistance: Fixed::ZERO,
            walk_speed: Fixed::ONE,
            sight_range: Fixed::from_num(6),
            attack: Some(AttackStats {
                damage: 180,
                range: Fixed::from_num(6),
                cooldown_ticks: 22,
                category: DamageCategory::Physical,
                splash: None,
                projectile: Some(ProjectileStats {
                    speed: Fixed::from_num(10),
                }),
                stun_ticks: 0,
                knockback: Fixed::ZERO,
            }),
            mass: 3,
            tags: vec![TAG_TARGETS_AIR.to_string()],
        }
    }

    #[test]
    fn test_has_tag() {
        let unit = create_test_unit();
        assert!(unit.has_tag(TAG_TARGETS_AIR));
        assert!(!unit.has_tag(TAG_TANK));
    }

    #[test]
    fn test_capabilities_resolved_from_data() {
        let caps = create_test_unit().capabilities();
        assert!(caps.can_target_air);
        assert!(caps.can_target_ground);
        assert!(caps.launches_projectiles);
        assert!(!caps.has_splash);
    }

    #[test]
    fn test_air_only_excludes_ground() {
        let mut unit = create_test_unit();
        unit.tags = vec![TAG_AIR_ONLY.to_string()];
        let caps = unit.capabilities();
        assert!(caps.can_target_air);
        assert!(!caps.can_target_ground);
    }

    #[test]
    fn test_spawned_structure_never_walks() {
        let mut tower = create_test_unit();
        tower.kind = EntityKind::Structure;
        tower.walk_speed = Fixed::from_num(3);
        let combatant = tower.spawn(9, 1, Vec2Fixed::ZERO);
        assert_eq!(combatant.walk_speed, Fixed::ZERO);
        assert!(combatant.is_structure());
        assert!(combatant.is_alive());
        assert_eq!(combatant.attack.damage, 180);
    }

    #[test]
    fn test_validate_rejects_bad_splash_fraction() {
        let mut unit = create_test_unit();
        if let Some(attack) = unit.attack.as_mut() {
            attack.splash = Some(SplashStats {
                radius: Fixed::ONE,
                damage_fraction: Fixed::from_num(1.5),
                dropoff: false,
            });
        }
        assert!(unit.validate().is_err());
    }
}
