//! Entity model shared by every combat participant.
//!
//! Components are pure data with invariants and no decision logic. A
//! [`Combatant`] is anything that can deal or take damage: a mobile unit or
//! a defensive structure.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for combatants.
pub type EntityId = u64;

/// Unique identifier for in-flight projectiles.
pub type ProjectileId = u64;

/// Identifier of the player owning a combatant.
pub type PlayerId = u8;

// ============================================================================
// Classification
// ============================================================================

/// Broad kind of a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EntityKind {
    /// Mobile unit that walks toward objectives.
    #[default]
    Unit,
    /// Immobile defensive structure.
    Structure,
}

/// Damage category, selecting the mitigation rule applied to a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DamageCategory {
    /// Reduced by flat armor, never below 1.
    #[default]
    Physical,
    /// Reduced by fractional spell resistance.
    Spell,
}

/// Classification hints consulted by targeting and mitigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Classification {
    /// Airborne; only attackers that can target air may engage it.
    pub flying: bool,
    /// Tagged as a tank by the catalog.
    pub tank: bool,
    /// Crown/objective tower: reduced incoming damage, destruction awards a crown.
    pub crown_tower: bool,
    /// Relative mass from the catalog. Informational: knockback distance
    /// does not depend on it.
    pub mass: u32,
}

/// What a combatant is able to do, resolved once from catalog data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    /// May select flying combatants as targets.
    pub can_target_air: bool,
    /// May select ground combatants as targets.
    pub can_target_ground: bool,
    /// Attacks carry splash parameters.
    pub has_splash: bool,
    /// Attacks travel as projectiles.
    pub launches_projectiles: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_target_air: false,
            can_target_ground: true,
            has_splash: false,
            launches_projectiles: false,
        }
    }
}

impl Capabilities {
    /// Whether a candidate with the given flying flag can be engaged.
    #[must_use]
    pub const fn can_engage(&self, flying: bool) -> bool {
        if flying {
            self.can_target_air
        } else {
            self.can_target_ground
        }
    }
}

// ============================================================================
// Vitals
// ============================================================================

/// Hit points, shield and mitigation stats.
///
/// `hp` never exceeds `max_hp` and never goes negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vitals {
    /// Current hit points.
    pub hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Temporary shield points, consumed before hit points.
    pub shield: u32,
    /// Flat reduction applied to physical damage.
    pub armor: u32,
    /// Fractional reduction applied to spell damage, in `[0, 1]`.
    #[serde(with = "fixed_serde")]
    pub spell_resistance: Fixed,
}

impl Vitals {
    /// Create vitals at full health with no mitigation.
    #[must_use]
    pub const fn new(max_hp: u32) -> Self {
        Self {
            hp: max_hp,
            max_hp,
            shield: 0,
            armor: 0,
            spell_resistance: Fixed::ZERO,
        }
    }

    /// Hit point fraction in `[0, 1]`.
    #[must_use]
    pub fn hp_fraction(&self) -> Fixed {
        if self.max_hp == 0 {
            return Fixed::ZERO;
        }
        Fixed::from_num(self.hp) / Fixed::from_num(self.max_hp)
    }

    /// Absorb damage with the shield first, then hit points.
    ///
    /// Hit point loss is capped at the remaining hit points; damage beyond
    /// lethal is not credited.
    pub fn absorb(&mut self, amount: u32) -> (u32, u32) {
        let absorbed = amount.min(self.shield);
        self.shield -= absorbed;
        let remaining = amount - absorbed;
        let hp_lost = remaining.min(self.hp);
        self.hp -= hp_lost;
        (absorbed, hp_lost)
    }
}

/// Outcome of applying one damage amount to a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DamageOutcome {
    /// Damage soaked by the shield.
    pub absorbed: u32,
    /// Hit points actually removed.
    pub hp_lost: u32,
    /// This hit performed the alive → dead transition.
    pub killed: bool,
}

impl DamageOutcome {
    /// Damage credited for bookkeeping: shield absorption plus hit points lost.
    #[must_use]
    pub const fn dealt(&self) -> u32 {
        self.absorbed.saturating_add(self.hp_lost)
    }
}

// ============================================================================
// Attack payloads
// ============================================================================

/// Area-of-effect parameters of an attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplashParams {
    /// Radius around the impact point, in tiles.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Fraction of base damage dealt to secondary targets, in `[0, 1]`.
    #[serde(with = "fixed_serde")]
    pub damage_fraction: Fixed,
    /// Scale splash damage down with distance from the impact point.
    pub dropoff: bool,
}

/// Ranged attack travel parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectileParams {
    /// Travel speed in tiles per second.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
}

/// Status effects carried by an attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct StatusEffectParams {
    /// Stun duration in ticks; zero disables stun.
    pub stun_ticks: u32,
    /// Knockback magnitude in tiles; zero disables knockback.
    #[serde(with = "fixed_serde")]
    pub knockback: Fixed,
}

impl StatusEffectParams {
    /// Whether any effect is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stun_ticks == 0 && self.knockback <= Fixed::ZERO
    }
}

/// Attack capability of a combatant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackProfile {
    /// Whether the combatant attacks at all.
    pub can_attack: bool,
    /// Maximum attack distance in tiles.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Distance at which candidates are considered by targeting.
    #[serde(with = "fixed_serde")]
    pub sight_range: Fixed,
    /// Base damage per attack.
    pub damage: u32,
    /// Damage category.
    pub category: DamageCategory,
    /// Ticks between attacks.
    pub cooldown_ticks: u32,
    /// Tick of the most recent attack.
    pub last_attack_tick: Option<u64>,
    /// Splash payload.
    pub splash: Option<SplashParams>,
    /// Projectile payload; `None` for instant attacks.
    pub projectile: Option<ProjectileParams>,
    /// Status effects applied on hit.
    pub effects: StatusEffectParams,
}

impl Default for AttackProfile {
    fn default() -> Self {
        Self {
            can_attack: false,
            range: Fixed::ONE,
            sight_range: Fixed::from_num(5),
            damage: 0,
            category: DamageCategory::Physical,
            cooldown_ticks: 20,
            last_attack_tick: None,
            splash: None,
            projectile: None,
            effects: StatusEffectParams::default(),
        }
    }
}

impl AttackProfile {
    /// Whether the cooldown has elapsed at `tick`.
    #[must_use]
    pub fn is_ready(&self, tick: u64) -> bool {
        match self.last_attack_tick {
            None => true,
            Some(last) => tick.saturating_sub(last) >= u64::from(self.cooldown_ticks),
        }
    }

    /// Whether `to` lies within attack range of `from`.
    #[must_use]
    pub fn in_range(&self, from: Vec2Fixed, to: Vec2Fixed) -> bool {
        from.distance_squared(to) <= self.range.saturating_mul(self.range)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Timed status flags. A flag is active while `tick < expiry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct StatusEffects {
    /// Expiry tick of the current stun.
    pub stunned_until: Option<u64>,
    /// Expiry tick of the current invulnerability.
    pub invulnerable_until: Option<u64>,
}

impl StatusEffects {
    /// Whether the combatant is stunned at `tick`.
    #[must_use]
    pub fn is_stunned(&self, tick: u64) -> bool {
        self.stunned_until.is_some_and(|end| tick < end)
    }

    /// Whether the combatant is invulnerable at `tick`.
    #[must_use]
    pub fn is_invulnerable(&self, tick: u64) -> bool {
        self.invulnerable_until.is_some_and(|end| tick < end)
    }

    /// Extend the stun so that it lasts at least until `until`.
    pub fn stun_until(&mut self, until: u64) {
        self.stunned_until = Some(self.stunned_until.map_or(until, |end| end.max(until)));
    }

    /// Clear flags whose expiry tick has passed. Returns how many were cleared.
    pub fn expire(&mut self, tick: u64) -> u32 {
        let mut cleared = 0;
        if self.stunned_until.is_some_and(|end| end <= tick) {
            self.stunned_until = None;
            cleared += 1;
        }
        if self.invulnerable_until.is_some_and(|end| end <= tick) {
            self.invulnerable_until = None;
            cleared += 1;
        }
        cleared
    }
}

// ============================================================================
// Combatant
// ============================================================================

/// Anything that can deal or take damage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combatant {
    /// Unique id within a battle.
    pub id: EntityId,
    /// Owning player.
    pub owner: PlayerId,
    /// Unit or structure.
    pub kind: EntityKind,
    /// Catalog type identifier.
    pub unit_type: String,
    /// Catalog upgrade level.
    pub level: u8,
    /// Position in arena tiles.
    pub position: Vec2Fixed,
    /// Hit points and mitigation.
    pub vitals: Vitals,
    /// Attack capability.
    pub attack: AttackProfile,
    /// Timed status flags.
    pub status: StatusEffects,
    /// Targeting hints.
    pub classification: Classification,
    /// Resolved capability set.
    pub capabilities: Capabilities,
    /// Walking speed in tiles per second; zero for structures.
    #[serde(with = "fixed_serde")]
    pub walk_speed: Fixed,
    alive: bool,
}

impl Combatant {
    /// Create a live combatant with full health and no attack.
    #[must_use]
    pub fn new(id: EntityId, owner: PlayerId, kind: EntityKind, position: Vec2Fixed, max_hp: u32) -> Self {
        Self {
            id,
            owner,
            kind,
            unit_type: String::new(),
            level: 1,
            position,
            vitals: Vitals::new(max_hp),
            attack: AttackProfile::default(),
            status: StatusEffects::default(),
            classification: Classification::default(),
            capabilities: Capabilities::default(),
            walk_speed: Fixed::ZERO,
            alive: max_hp > 0,
        }
    }

    /// Set catalog identity.
    #[must_use]
    pub fn with_type(mut self, unit_type: impl Into<String>, level: u8) -> Self {
        self.unit_type = unit_type.into();
        self.level = level;
        self
    }

    /// Set the attack profile.
    #[must_use]
    pub fn with_attack(mut self, attack: AttackProfile) -> Self {
        self.capabilities.has_splash = attack.splash.is_some();
        self.capabilities.launches_projectiles = attack.projectile.is_some();
        self.attack = attack;
        self
    }

    /// Set flat armor.
    #[must_use]
    pub fn with_armor(mut self, armor: u32) -> Self {
        self.vitals.armor = armor;
        self
    }

    /// Set spell resistance.
    #[must_use]
    pub fn with_spell_resistance(mut self, resistance: Fixed) -> Self {
        self.vitals.spell_resistance = resistance;
        self
    }

    /// Set shield points.
    #[must_use]
    pub fn with_shield(mut self, shield: u32) -> Self {
        self.vitals.shield = shield;
        self
    }

    /// Set classification hints.
    #[must_use]
    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }

    /// Set the capability set.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set walking speed.
    #[must_use]
    pub fn with_walk_speed(mut self, speed: Fixed) -> Self {
        self.walk_speed = speed;
        self
    }

    /// Whether the combatant is alive. Once false, it stays false.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.alive && self.vitals.hp > 0
    }

    /// Whether this is a structure.
    #[must_use]
    pub fn is_structure(&self) -> bool {
        self.kind == EntityKind::Structure
    }

    /// Whether `other` belongs to a different player.
    #[must_use]
    pub fn is_hostile_to(&self, other: &Combatant) -> bool {
        self.owner != other.owner
    }

    /// Apply already-mitigated damage: shield first, then hit points.
    ///
    /// Returns [`DamageOutcome::killed`] exactly once, on the hit that drops
    /// hit points to zero. Dead combatants ignore further damage.
    pub fn take_damage(&mut self, amount: u32) -> DamageOutcome {
        if !self.is_alive() || amount == 0 {
            return DamageOutcome::default();
        }
        let (absorbed, hp_lost) = self.vitals.absorb(amount);
        let killed = self.vitals.hp == 0;
        if killed {
            self.alive = false;
        }
        DamageOutcome {
            absorbed,
            hp_lost,
            killed,
        }
    }

    /// Read-only view used by targeting.
    #[must_use]
    pub fn view(&self) -> TargetView {
        TargetView {
            id: self.id,
            owner: self.owner,
            position: self.position,
            hp: self.vitals.hp,
            max_hp: self.vitals.max_hp,
            alive: self.is_alive(),
            structure: self.is_structure(),
            classification: self.classification,
            capabilities: self.capabilities,
            sight_range: self.attack.sight_range,
        }
    }
}

/// Copyable snapshot of the fields targeting reads.
///
/// Views are rebuilt by the scheduler every tick and never retained across
/// ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetView {
    /// Combatant id.
    pub id: EntityId,
    /// Owning player.
    pub owner: PlayerId,
    /// Position at snapshot time.
    pub position: Vec2Fixed,
    /// Current hit points.
    pub hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Alive flag.
    pub alive: bool,
    /// Structure flag.
    pub structure: bool,
    /// Classification hints.
    pub classification: Classification,
    /// Capability set.
    pub capabilities: Capabilities,
    /// Targeting range of this combatant when it acts as attacker.
    pub sight_range: Fixed,
}

impl TargetView {
    /// Hit point fraction in `[0, 1]`.
    #[must_use]
    pub fn hp_fraction(&self) -> Fixed {
        if self.max_hp == 0 {
            return Fixed::ZERO;
        }
        Fixed::from_num(self.hp) / Fixed::from_num(self.max_hp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knight() -> Combatant {
        Combatant::new(1, 0, EntityKind::Unit, Vec2Fixed::ZERO, 100)
    }

    #[test]
    fn test_take_damage_clamps_at_zero() {
        let mut unit = knight();
        let outcome = unit.take_damage(250);
        assert_eq!(outcome.hp_lost, 100);
        assert!(outcome.killed);
        assert_eq!(unit.vitals.hp, 0);
        assert!(!unit.is_alive());
    }

    #[test]
    fn test_death_is_reported_once() {
        let mut unit = knight();
        assert!(unit.take_damage(100).killed);
        let again = unit.take_damage(10);
        assert!(!again.killed);
        assert_eq!(again.dealt(), 0);
    }

    #[test]
    fn test_shield_absorbs_exactly() {
        let mut unit = knight().with_shield(50);
        let outcome = unit.take_damage(30);
        assert_eq!(outcome.absorbed, 30);
        assert_eq!(outcome.hp_lost, 0);
        assert_eq!(unit.vitals.shield, 20);
        assert_eq!(unit.vitals.hp, 100);

        let overflow = unit.take_damage(45);
        assert_eq!(overflow.absorbed, 20);
        assert_eq!(overflow.hp_lost, 25);
        assert_eq!(unit.vitals.shield, 0);
        assert_eq!(unit.vitals.hp, 75);
    }

    #[test]
    fn test_cooldown_readiness() {
        let mut attack = AttackProfile {
            cooldown_ticks: 10,
            ..AttackProfile::default()
        };
        assert!(attack.is_ready(0));
        attack.last_attack_tick = Some(5);
        assert!(!attack.is_ready(14));
        assert!(attack.is_ready(15));
    }

    #[test]
    fn test_status_expiry() {
        let mut status = StatusEffects::default();
        status.stun_until(10);
        status.invulnerable_until = Some(4);
        assert!(status.is_stunned(9));
        assert!(!status.is_stunned(10));
        assert!(status.is_invulnerable(3));

        assert_eq!(status.expire(5), 1);
        assert_eq!(status.invulnerable_until, None);
        assert_eq!(status.stunned_until, Some(10));
        assert_eq!(status.expire(10), 1);
        assert_eq!(status, StatusEffects::default());
    }

    #[test]
    fn test_stun_never_shortens() {
        let mut status = StatusEffects::default();
        status.stun_until(30);
        status.stun_until(12);
        assert_eq!(status.stunned_until, Some(30));
    }

    #[test]
    fn test_capabilities_engage_rules() {
        let ground_only = Capabilities::default();
        assert!(ground_only.can_engage(false));
        assert!(!ground_only.can_engage(true));

        let anti_air = Capabilities {
            can_target_air: true,
            ..Capabilities::default()
        };
        assert!(anti_air.can_engage(true));
    }
}
