//! Test fixtures and helpers.
//!
//! A small unit catalog, a standard two-player setup and builders for
//! hand-placed combatants.

use arena_core::components::{AttackProfile, Combatant, EntityId, EntityKind, PlayerId};
use arena_core::config::BattleConfig;
use arena_core::data::UnitCatalog;
use arena_core::math::Vec2Fixed;
use arena_core::scheduler::Battle;
use arena_core::setup::{BattleSetup, Placement};
use fixed::types::I32F32;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Position from float tile coordinates.
#[must_use]
pub fn tile(x: f64, y: f64) -> Vec2Fixed {
    Vec2Fixed::new(fixed_f(x), fixed_f(y))
}

/// Catalog used across test suites.
pub const TEST_CATALOG_RON: &str = r#"[
    UnitStats(
        id: "knight",
        hit_points: 1400,
        walk_speed: 1.0,
        sight_range: 5.5,
        attack: Some(AttackStats(damage: 160, range: 1.2, cooldown_ticks: 24)),
        mass: 6,
        tags: ["tank"],
    ),
    UnitStats(
        id: "archer",
        hit_points: 250,
        walk_speed: 1.0,
        sight_range: 6.0,
        attack: Some(AttackStats(
            damage: 90,
            range: 5.0,
            cooldown_ticks: 24,
            projectile: Some(ProjectileStats(speed: 12.0)),
        )),
        mass: 2,
        tags: ["targets_air"],
    ),
    UnitStats(
        id: "wizard",
        hit_points: 600,
        walk_speed: 1.0,
        sight_range: 5.5,
        attack: Some(AttackStats(
            damage: 230,
            range: 5.0,
            cooldown_ticks: 28,
            category: Spell,
            splash: Some(SplashStats(radius: 1.5, damage_fraction: 0.8, dropoff: true)),
            projectile: Some(ProjectileStats(speed: 10.0)),
        )),
        mass: 3,
        tags: ["targets_air"],
    ),
    UnitStats(
        id: "minion",
        hit_points: 190,
        walk_speed: 1.5,
        sight_range: 5.5,
        attack: Some(AttackStats(damage: 84, range: 2.0, cooldown_ticks: 20)),
        mass: 1,
        tags: ["flying", "targets_air"],
    ),
    UnitStats(
        id: "princess_tower",
        kind: Structure,
        hit_points: 2500,
        sight_range: 7.5,
        attack: Some(AttackStats(
            damage: 90,
            range: 7.5,
            cooldown_ticks: 16,
            projectile: Some(ProjectileStats(speed: 15.0)),
        )),
        tags: ["crown_tower", "targets_air"],
    ),
    UnitStats(
        id: "king_tower",
        kind: Structure,
        hit_points: 4000,
        sight_range: 7.0,
        attack: Some(AttackStats(
            damage: 110,
            range: 7.0,
            cooldown_ticks: 20,
            projectile: Some(ProjectileStats(speed: 15.0)),
        )),
        tags: ["crown_tower", "targets_air"],
    ),
]"#;

/// Parse [`TEST_CATALOG_RON`].
///
/// # Panics
///
/// Panics if the embedded catalog no longer parses.
#[must_use]
pub fn test_catalog() -> UnitCatalog {
    UnitCatalog::from_ron_str(TEST_CATALOG_RON, "test_catalog").expect("test catalog parses")
}

/// Standard towers plus a knight, archer and wizard for each side.
#[must_use]
pub fn duel_setup() -> BattleSetup {
    BattleSetup::standard_arena("princess_tower", "king_tower", 1)
        .with_deployment(0, Placement::new(0, "knight", 1, tile(3.5, 13.0)))
        .with_deployment(0, Placement::new(1, "knight", 1, tile(3.5, 19.0)))
        .with_deployment(20, Placement::new(0, "archer", 1, tile(4.5, 11.0)))
        .with_deployment(20, Placement::new(1, "wizard", 1, tile(4.5, 21.0)))
        .with_deployment(60, Placement::new(0, "minion", 1, tile(14.5, 12.0)))
        .with_deployment(60, Placement::new(1, "archer", 1, tile(14.5, 20.0)))
}

/// Battle built from [`duel_setup`] with default configuration.
///
/// # Panics
///
/// Panics if the fixture setup stops validating.
#[must_use]
pub fn duel_battle(seed: u64) -> Battle {
    Battle::from_setup(BattleConfig::default(), &test_catalog(), &duel_setup(), seed)
        .expect("duel setup is valid")
}

/// Instant attack with the given damage and range.
#[must_use]
pub fn melee_attack(damage: u32, range: i32) -> AttackProfile {
    AttackProfile {
        can_attack: true,
        range: fixed(range),
        sight_range: fixed(range + 4),
        damage,
        cooldown_ticks: 20,
        ..AttackProfile::default()
    }
}

/// Mobile combatant without an attack.
#[must_use]
pub fn test_unit(id: EntityId, owner: PlayerId, position: Vec2Fixed, hp: u32) -> Combatant {
    Combatant::new(id, owner, EntityKind::Unit, position, hp)
}

/// Mobile combatant with an instant attack.
#[must_use]
pub fn test_attacker(
    id: EntityId,
    owner: PlayerId,
    position: Vec2Fixed,
    damage: u32,
    range: i32,
) -> Combatant {
    test_unit(id, owner, position, 1000).with_attack(melee_attack(damage, range))
}

/// Immobile structure without an attack.
#[must_use]
pub fn test_structure(id: EntityId, owner: PlayerId, position: Vec2Fixed, hp: u32) -> Combatant {
    Combatant::new(id, owner, EntityKind::Structure, position, hp)
}
