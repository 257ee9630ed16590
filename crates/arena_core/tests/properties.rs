//! Property tests for battle invariants.

use std::collections::BTreeSet;

use arena_core::combat::{calculate_damage, splash_dropoff, AttackIntent, CombatEngine};
use arena_core::components::{Combatant, EntityKind, TargetView, Vitals};
use arena_core::config::{BattleConfig, CombatConfig, TargetingConfig};
use arena_core::math::{Fixed, Vec2Fixed};
use arena_core::registry::BattleWorld;
use arena_core::scheduler::Battle;
use arena_core::targeting::{TargetReason, TargetingEngine};
use arena_test_utils::determinism::strategies::{
    arb_category, arb_damage, arb_fraction, arb_health, arb_roster, arb_vec2_position,
};
use proptest::prelude::*;

fn views(positions: &[Vec2Fixed], owner: u8) -> Vec<TargetView> {
    positions
        .iter()
        .enumerate()
        .map(|(i, &position)| {
            Combatant::new(i as u64 + 10, owner, EntityKind::Unit, position, 500).view()
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Hit points stay within bounds and death is final.
    #[test]
    fn prop_battle_keeps_hp_in_bounds(roster in arb_roster(12)) {
        let mut battle = Battle::new(BattleConfig::default(), 4).unwrap();
        for (i, params) in roster.iter().enumerate() {
            battle.register_combatant(params.build(i as u64 + 1)).unwrap();
        }

        let mut dead = BTreeSet::new();
        for _ in 0..150 {
            let report = battle.tick();
            for result in &report.results {
                for hit in &result.hits {
                    prop_assert!(!dead.contains(&hit.target));
                }
            }
            for death in &report.deaths {
                prop_assert!(dead.insert(death.entity));
            }
            for combatant in battle.world().combatants.iter() {
                prop_assert!(combatant.vitals.hp <= combatant.vitals.max_hp);
                prop_assert_eq!(combatant.is_alive(), !dead.contains(&combatant.id));
            }
        }
    }

    /// A shield at least as large as the hit absorbs it exactly.
    #[test]
    fn prop_shield_absorbs_exactly(hp in arb_health(), shield in 1u32..1000, damage in 1u32..1000) {
        prop_assume!(shield >= damage);
        let mut vitals = Vitals::new(hp);
        vitals.shield = shield;
        let (absorbed, hp_lost) = vitals.absorb(damage);
        prop_assert_eq!(absorbed, damage);
        prop_assert_eq!(hp_lost, 0);
        prop_assert_eq!(vitals.hp, hp);
        prop_assert_eq!(vitals.shield, shield - damage);
    }

    /// Mitigated damage never exceeds the base and is at least 1 for physical hits.
    #[test]
    fn prop_mitigation_bounds(
        base in arb_damage(),
        armor in 0u32..600,
        resistance in arb_fraction(),
        category in arb_category(),
        crown in any::<bool>(),
    ) {
        let mut vitals = Vitals::new(1000);
        vitals.armor = armor;
        vitals.spell_resistance = resistance;
        let damage = calculate_damage(base, category, &vitals, crown, &CombatConfig::default());
        prop_assert!(damage <= base);
    }

    /// Splash victims never take more than the primary target.
    #[test]
    fn prop_splash_not_above_primary(
        base in arb_damage(),
        fraction in arb_fraction(),
        distance in arb_fraction(),
    ) {
        let radius = Fixed::from_num(2);
        let primary = calculate_damage(
            base,
            arena_core::components::DamageCategory::Physical,
            &Vitals::new(1000),
            false,
            &CombatConfig::default(),
        );
        let factor = fraction * splash_dropoff(distance * radius, radius);
        let splash = arena_core::math::scale_u32(base, factor);
        prop_assert!(splash <= primary);
    }

    /// Launching through the engine records a consistent expected tick.
    #[test]
    fn prop_launched_projectile_is_in_future(to in arb_vec2_position(), tick in 0u64..1000) {
        let mut world = BattleWorld::new();
        let attacker = Combatant::new(1, 0, EntityKind::Unit, Vec2Fixed::ZERO, 100).with_attack(
            arena_core::components::AttackProfile {
                can_attack: true,
                range: Fixed::from_num(64),
                sight_range: Fixed::from_num(64),
                damage: 10,
                projectile: Some(arena_core::components::ProjectileParams { speed: Fixed::from_num(7) }),
                ..Default::default()
            },
        );
        let intent = AttackIntent::from_profile(&attacker, 2);
        world.combatants.insert(attacker).unwrap();
        world.combatants.insert(Combatant::new(2, 1, EntityKind::Unit, to, 100)).unwrap();

        let config = BattleConfig::default();
        let mut engine = CombatEngine::new(config.combat, config.tick_rate, 64, 1);
        let result = engine.resolve_attack(&intent, &mut world, tick).unwrap();
        let id = result.launched_projectile.unwrap();
        let projectile = world.projectiles.get(id).unwrap();
        prop_assert!(projectile.expected_hit_tick >= projectile.launch_tick);
        prop_assert_eq!(projectile.launch_tick, tick);
    }

    /// Confidence is a fraction; one candidate is certain; none is reported.
    #[test]
    fn prop_confidence_in_unit_interval(
        positions in proptest::collection::vec(arb_vec2_position(), 0..8),
        tick in 0u64..500,
    ) {
        let mut engine = TargetingEngine::new(TargetingConfig::default());
        let attacker = Combatant::new(1, 0, EntityKind::Unit, Vec2Fixed::from_tiles(8, 8), 500);
        let mut attacker_view = attacker.view();
        attacker_view.sight_range = Fixed::from_num(100);
        let candidates = views(&positions, 1);

        let decision = engine.select_target(&attacker_view, &candidates, None, tick);
        prop_assert!(decision.confidence >= Fixed::ZERO && decision.confidence <= Fixed::ONE);
        let valid = candidates
            .iter()
            .filter(|c| engine.is_valid_candidate(&attacker_view, c))
            .count();
        match valid {
            0 => {
                prop_assert_eq!(decision.target, None);
                prop_assert_eq!(decision.reason, TargetReason::NoValidTargets);
            }
            1 => prop_assert_eq!(decision.confidence, Fixed::ONE),
            _ => prop_assert!(decision.target.is_some()),
        }
    }
}
