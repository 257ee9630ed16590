//! Combat resolution.
//!
//! The [`CombatEngine`] turns an [`AttackIntent`] into damage. Instant
//! attacks resolve in the tick they are issued; ranged attacks become
//! [`Projectile`]s and resolve on their impact tick. Invalid intents are an
//! expected, frequent outcome and resolve to `None` without touching state.
//!
//! Damage pipeline for every entity that receives damage:
//!
//! 1. critical roll (once per resolution, off by default)
//! 2. category mitigation, then the crown tower reduction
//! 3. invulnerability
//! 4. shield absorption
//! 5. hit point subtraction and the death transition

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::components::{
    Combatant, DamageCategory, EntityId, EntityKind, PlayerId, ProjectileId, ProjectileParams,
    SplashParams, StatusEffectParams, Vitals,
};
use crate::config::{CombatConfig, SPLASH_DROPOFF_FLOOR};
use crate::math::{scale_u32, Fixed, Vec2Fixed};
use crate::projectile::{flight_ticks, Projectile, ProjectileTarget};
use crate::registry::BattleWorld;
use crate::rng::BattleRng;

// ============================================================================
// Intents, results and events
// ============================================================================

/// Ephemeral request to attack. Consumed immediately by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackIntent {
    /// Attacking combatant.
    pub attacker: EntityId,
    /// Primary target.
    pub target: EntityId,
    /// Base damage.
    pub damage: u32,
    /// Damage category.
    pub category: DamageCategory,
    /// Splash payload.
    pub splash: Option<SplashParams>,
    /// Projectile payload; `None` resolves instantly.
    pub projectile: Option<ProjectileParams>,
    /// Status effects applied to every entity hit.
    pub effects: StatusEffectParams,
}

impl AttackIntent {
    /// Intent carrying the attacker's own attack profile.
    #[must_use]
    pub fn from_profile(attacker: &Combatant, target: EntityId) -> Self {
        let attack = &attacker.attack;
        Self {
            attacker: attacker.id,
            target,
            damage: attack.damage,
            category: attack.category,
            splash: attack.splash,
            projectile: attack.projectile,
            effects: attack.effects,
        }
    }
}

/// One entity actually hit by a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetHit {
    /// Entity hit.
    pub target: EntityId,
    /// Damage credited: shield absorption plus hit points lost.
    pub damage: u32,
    /// This hit killed the entity.
    pub killed: bool,
    /// Entity position at impact.
    pub position: Vec2Fixed,
}

/// Report of one resolved attack. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatResult {
    /// Attacking combatant.
    pub attacker: EntityId,
    /// Primary target of the intent.
    pub primary_target: EntityId,
    /// Sum of damage over all hits.
    pub total_damage: u32,
    /// Every entity hit, primary first, then splash victims nearest first.
    pub hits: Vec<TargetHit>,
    /// Entities displaced by knockback.
    pub knocked_back: Vec<EntityId>,
    /// Entities stunned.
    pub stunned: Vec<EntityId>,
    /// Damage category.
    pub category: DamageCategory,
    /// Tick of resolution.
    pub tick: u64,
    /// Whether the critical roll succeeded.
    pub critical: bool,
    /// Set when the intent only launched a projectile; hits follow on impact.
    pub launched_projectile: Option<ProjectileId>,
}

impl CombatResult {
    /// Whether this is the placeholder returned at projectile launch.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.launched_projectile.is_some()
    }

    /// Ids killed by this resolution.
    pub fn killed(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.hits.iter().filter(|h| h.killed).map(|h| h.target)
    }
}

/// Emitted once per combatant, on its alive → dead transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathEvent {
    /// Combatant that died.
    pub entity: EntityId,
    /// Its owner.
    pub owner: PlayerId,
    /// Combatant credited with the kill; `None` for damage applied from outside combat.
    pub killer: Option<EntityId>,
    /// Owner of the killer.
    pub killer_owner: Option<PlayerId>,
    /// Tick of death.
    pub tick: u64,
    /// Whether it was a structure.
    pub structure: bool,
    /// Whether it was a crown tower.
    pub crown_tower: bool,
}

// ============================================================================
// Damage math
// ============================================================================

/// Apply category mitigation and the crown tower reduction.
///
/// Physical damage loses flat armor but never drops below 1; spell damage
/// is scaled by `1 - spell_resistance`.
#[must_use]
pub fn calculate_damage(
    base: u32,
    category: DamageCategory,
    vitals: &Vitals,
    crown_tower: bool,
    config: &CombatConfig,
) -> u32 {
    if base == 0 {
        return 0;
    }
    let mitigated = match category {
        DamageCategory::Physical => base.saturating_sub(vitals.armor).max(1),
        DamageCategory::Spell => scale_u32(base, Fixed::ONE - vitals.spell_resistance),
    };
    if crown_tower {
        scale_u32(mitigated, config.crown_tower_damage_factor)
    } else {
        mitigated
    }
}

/// Splash scale at `distance` from the impact point.
///
/// Linear from 1 at the center to [`SPLASH_DROPOFF_FLOOR`] and never below it.
#[must_use]
pub fn splash_dropoff(distance: Fixed, radius: Fixed) -> Fixed {
    let floor = Fixed::from_num(SPLASH_DROPOFF_FLOOR);
    if radius <= Fixed::ZERO {
        return floor;
    }
    (Fixed::ONE - distance / radius).clamp(floor, Fixed::ONE)
}

// ============================================================================
// Engine
// ============================================================================

/// Where and how an attack lands.
struct Impact {
    source: EntityId,
    source_owner: PlayerId,
    /// Knockback pushes away from this point.
    origin: Vec2Fixed,
    intended_target: EntityId,
    /// `None` for orphaned detonations.
    primary: Option<EntityId>,
    center: Vec2Fixed,
    damage: u32,
    category: DamageCategory,
    splash: Option<SplashParams>,
    effects: StatusEffectParams,
}

/// Outcome of one projectile phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectilePhase {
    /// One result per resolved projectile.
    pub results: Vec<CombatResult>,
    /// Due projectiles left for the next tick by the per-tick cap.
    pub deferred: usize,
}

/// Per-battle combat engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatEngine {
    #[serde(skip)]
    config: CombatConfig,
    tick_rate: u32,
    max_resolutions_per_tick: usize,
    rng: BattleRng,
    #[serde(skip)]
    deaths: Vec<DeathEvent>,
}

impl CombatEngine {
    /// Create an engine. `seed` drives critical rolls.
    #[must_use]
    pub fn new(config: CombatConfig, tick_rate: u32, max_resolutions_per_tick: usize, seed: u64) -> Self {
        Self {
            config,
            tick_rate,
            max_resolutions_per_tick,
            rng: BattleRng::new(seed),
            deaths: Vec::new(),
        }
    }

    /// Replace the configuration, keeping the RNG state.
    pub fn set_config(&mut self, config: CombatConfig, tick_rate: u32, max_resolutions_per_tick: usize) {
        self.config = config;
        self.tick_rate = tick_rate;
        self.max_resolutions_per_tick = max_resolutions_per_tick;
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// Feed the RNG position into a state hash.
    pub(crate) fn hash_state<H: Hasher>(&self, state: &mut H) {
        self.rng.hash(state);
    }

    /// Drain death events produced since the last call, in order.
    pub fn take_deaths(&mut self) -> Vec<DeathEvent> {
        std::mem::take(&mut self.deaths)
    }

    /// Resolve an attack intent.
    ///
    /// Returns `None`, with no mutation, when the attacker cannot currently
    /// attack this target. Projectile intents return a pending placeholder.
    pub fn resolve_attack(
        &mut self,
        intent: &AttackIntent,
        world: &mut BattleWorld,
        tick: u64,
    ) -> Option<CombatResult> {
        let attacker = world.combatants.get(intent.attacker)?;
        let target = world.combatants.get(intent.target)?;
        if !attacker.is_alive()
            || !attacker.attack.can_attack
            || attacker.status.is_stunned(tick)
            || !attacker.attack.is_ready(tick)
            || !target.is_alive()
            || !attacker.is_hostile_to(target)
            || !attacker.attack.in_range(attacker.position, target.position)
        {
            return None;
        }

        let origin = attacker.position;
        let source_owner = attacker.owner;
        let target_position = target.position;

        if let Some(params) = intent.projectile {
            let flight = flight_ticks(origin.distance(target_position), params.speed, self.tick_rate)?;
            let id = world.projectiles.allocate_id();
            world.projectiles.insert(Projectile {
                id,
                source: intent.attacker,
                source_owner,
                intended_target: intent.target,
                target: ProjectileTarget::Entity(intent.target),
                launch_position: origin,
                target_position,
                position: origin,
                damage: intent.damage,
                category: intent.category,
                splash: intent.splash,
                effects: intent.effects,
                speed: params.speed,
                launch_tick: tick,
                expected_hit_tick: tick.saturating_add(flight),
            });
            mark_attacked(world, intent.attacker, tick);
            tracing::trace!(projectile = id, source = intent.attacker, target = intent.target, tick, "Projectile launched");
            return Some(CombatResult {
                attacker: intent.attacker,
                primary_target: intent.target,
                total_damage: 0,
                hits: Vec::new(),
                knocked_back: Vec::new(),
                stunned: Vec::new(),
                category: intent.category,
                tick,
                critical: false,
                launched_projectile: Some(id),
            });
        }

        mark_attacked(world, intent.attacker, tick);
        Some(self.apply_impact(
            &Impact {
                source: intent.attacker,
                source_owner,
                origin,
                intended_target: intent.target,
                primary: Some(intent.target),
                center: target_position,
                damage: intent.damage,
                category: intent.category,
                splash: intent.splash,
                effects: intent.effects,
            },
            world,
            tick,
        ))
    }

    /// Advance every projectile by one tick.
    ///
    /// Due projectiles resolve oldest first, up to the per-tick cap; the
    /// rest stay active and resolve on a later tick. Resolved projectiles
    /// are removed before their effects apply, so none resolves twice.
    pub fn update(&mut self, tick: u64, world: &mut BattleWorld) -> ProjectilePhase {
        let due = world.projectiles.due(tick);
        let deferred = due.len().saturating_sub(self.max_resolutions_per_tick);
        if deferred > 0 {
            tracing::debug!(tick, deferred, "Projectile cap reached, deferring impacts");
        }

        let mut results = Vec::with_capacity(due.len() - deferred);
        for id in due.into_iter().take(self.max_resolutions_per_tick) {
            if let Some(projectile) = world.projectiles.remove(id) {
                results.push(self.detonate(&projectile, world, tick));
            }
        }

        for projectile in world.projectiles.iter_mut() {
            projectile.interpolate(tick);
        }

        ProjectilePhase { results, deferred }
    }

    fn detonate(&mut self, projectile: &Projectile, world: &mut BattleWorld, tick: u64) -> CombatResult {
        let live_target = match projectile.target {
            ProjectileTarget::Entity(id) => world
                .combatants
                .get(id)
                .filter(|c| c.is_alive())
                .map(|c| (id, c.position)),
            ProjectileTarget::Orphaned => None,
        };
        let (primary, center) = match live_target {
            Some((id, position)) => (Some(id), position),
            None => (None, projectile.target_position),
        };
        tracing::trace!(
            projectile = projectile.id,
            orphaned = primary.is_none(),
            tick,
            "Projectile impact"
        );
        self.apply_impact(
            &Impact {
                source: projectile.source,
                source_owner: projectile.source_owner,
                // Orphaned detonations push away from the impact point.
                origin: if primary.is_some() { projectile.launch_position } else { center },
                intended_target: projectile.intended_target,
                primary,
                center,
                damage: projectile.damage,
                category: projectile.category,
                splash: projectile.splash,
                effects: projectile.effects,
            },
            world,
            tick,
        )
    }

    fn apply_impact(&mut self, impact: &Impact, world: &mut BattleWorld, tick: u64) -> CombatResult {
        let critical = self.config.crit_enabled && self.rng.roll(self.config.crit_chance);
        let base = if critical {
            scale_u32(impact.damage, self.config.crit_multiplier)
        } else {
            impact.damage
        };

        let mut hits = Vec::new();
        if let Some(primary) = impact.primary {
            if let Some(hit) = self.strike(world, primary, base, impact, tick) {
                hits.push(hit);
            }
        }

        if let Some(splash) = impact.splash {
            let victims = world
                .combatants
                .hostiles_within(impact.center, splash.radius, impact.source_owner);
            let mut struck = 0;
            for (id, distance) in victims {
                if Some(id) == impact.primary || struck >= self.config.max_splash_targets {
                    continue;
                }
                let mut factor = splash.damage_fraction;
                if splash.dropoff {
                    factor *= splash_dropoff(distance, splash.radius);
                }
                if let Some(hit) = self.strike(world, id, scale_u32(base, factor), impact, tick) {
                    hits.push(hit);
                    struck += 1;
                }
            }
        }

        let (stunned, knocked_back) = self.apply_status_effects(&hits, impact, world, tick);
        let total_damage = hits.iter().fold(0u32, |sum, h| sum.saturating_add(h.damage));

        CombatResult {
            attacker: impact.source,
            primary_target: impact.intended_target,
            total_damage,
            hits,
            knocked_back,
            stunned,
            category: impact.category,
            tick,
            critical,
            launched_projectile: None,
        }
    }

    /// Run the per-entity part of the damage pipeline on one combatant.
    fn strike(
        &mut self,
        world: &mut BattleWorld,
        id: EntityId,
        nominal: u32,
        impact: &Impact,
        tick: u64,
    ) -> Option<TargetHit> {
        let target = world.combatants.get_mut(id)?;
        if !target.is_alive() {
            return None;
        }

        let mut damage = calculate_damage(
            nominal,
            impact.category,
            &target.vitals,
            target.classification.crown_tower,
            &self.config,
        );
        if target.status.is_invulnerable(tick) {
            damage = 0;
        }

        let outcome = target.take_damage(damage);
        if outcome.killed {
            self.deaths.push(DeathEvent {
                entity: id,
                owner: target.owner,
                killer: Some(impact.source),
                killer_owner: Some(impact.source_owner),
                tick,
                structure: target.is_structure(),
                crown_tower: target.classification.crown_tower,
            });
        }

        Some(TargetHit {
            target: id,
            damage: outcome.dealt(),
            killed: outcome.killed,
            position: target.position,
        })
    }

    /// Apply stun and knockback to surviving, non-invulnerable hits.
    fn apply_status_effects(
        &self,
        hits: &[TargetHit],
        impact: &Impact,
        world: &mut BattleWorld,
        tick: u64,
    ) -> (Vec<EntityId>, Vec<EntityId>) {
        let mut stunned = Vec::new();
        let mut knocked_back = Vec::new();
        if impact.effects.is_empty() {
            return (stunned, knocked_back);
        }

        let push = impact.effects.knockback.min(self.config.max_knockback_distance);
        for hit in hits {
            if hit.target == impact.source {
                continue;
            }
            let Some(target) = world.combatants.get_mut(hit.target) else {
                continue;
            };
            if !target.is_alive() || target.status.is_invulnerable(tick) {
                continue;
            }
            if impact.effects.stun_ticks > 0 {
                target
                    .status
                    .stun_until(tick.saturating_add(u64::from(impact.effects.stun_ticks)));
                stunned.push(hit.target);
            }
            if push > Fixed::ZERO && target.kind == EntityKind::Unit {
                let direction = (target.position - impact.origin).normalize();
                target.position = target.position + direction.scale(push);
                knocked_back.push(hit.target);
            }
        }
        (stunned, knocked_back)
    }
}

fn mark_attacked(world: &mut BattleWorld, attacker: EntityId, tick: u64) {
    if let Some(attacker) = world.combatants.get_mut(attacker) {
        attacker.attack.last_attack_tick = Some(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AttackProfile, Classification, Combatant, EntityKind};
    use crate::config::BattleConfig;

    fn engine() -> CombatEngine {
        let config = BattleConfig::default();
        CombatEngine::new(config.combat, config.tick_rate, config.max_projectile_resolutions_per_tick, 1)
    }

    fn melee(damage: u32) -> AttackProfile {
        AttackProfile {
            can_attack: true,
            range: Fixed::from_num(2),
            damage,
            cooldown_ticks: 10,
            ..AttackProfile::default()
        }
    }

    fn world_with(attacker: Combatant, targets: Vec<Combatant>) -> BattleWorld {
        let mut world = BattleWorld::new();
        world.combatants.insert(attacker).unwrap();
        for target in targets {
            world.combatants.insert(target).unwrap();
        }
        world
    }

    fn unit(id: EntityId, owner: PlayerId, x: i32, hp: u32) -> Combatant {
        Combatant::new(id, owner, EntityKind::Unit, Vec2Fixed::from_tiles(x, 0), hp)
    }

    #[test]
    fn test_hundred_damage_kills_only_at_or_below_hundred() {
        for (hp, killed) in [(100, true), (99, true), (101, false)] {
            let mut engine = engine();
            let attacker = unit(1, 0, 0, 500).with_attack(melee(100));
            let mut world = world_with(attacker, vec![unit(2, 1, 1, hp)]);
            let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 2);

            let result = engine.resolve_attack(&intent, &mut world, 0).unwrap();
            assert_eq!(result.hits.len(), 1);
            assert_eq!(result.hits[0].killed, killed);
            assert_eq!(world.combatants.get(2).unwrap().vitals.hp, hp.saturating_sub(100));
            if !killed {
                assert_eq!(result.total_damage, 100);
            }
        }
    }

    #[test]
    fn test_spell_resistance_halves_damage() {
        let vitals = Vitals {
            spell_resistance: Fixed::from_num(0.5),
            ..Vitals::new(1000)
        };
        let config = CombatConfig::default();
        assert_eq!(calculate_damage(200, DamageCategory::Spell, &vitals, false, &config), 100);
    }

    #[test]
    fn test_armor_floor_is_one() {
        let vitals = Vitals {
            armor: 500,
            ..Vitals::new(1000)
        };
        let config = CombatConfig::default();
        assert_eq!(calculate_damage(40, DamageCategory::Physical, &vitals, false, &config), 1);
        assert_eq!(calculate_damage(0, DamageCategory::Physical, &vitals, false, &config), 0);
    }

    #[test]
    fn test_crown_tower_reduction() {
        let config = CombatConfig::default();
        let vitals = Vitals::new(4000);
        let reduced = calculate_damage(1000, DamageCategory::Spell, &vitals, true, &config);
        assert_eq!(reduced, 350);
    }

    #[test]
    fn test_invalid_intents_have_no_side_effects() {
        let mut engine = engine();
        let attacker = unit(1, 0, 0, 500).with_attack(melee(50));
        let far = unit(3, 1, 10, 100);
        let mut world = world_with(attacker, vec![unit(2, 0, 1, 100), far]);
        let before = world.clone();

        // Same owner.
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 2);
        assert!(engine.resolve_attack(&intent, &mut world, 0).is_none());
        // Out of range.
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 3);
        assert!(engine.resolve_attack(&intent, &mut world, 0).is_none());
        // Missing target.
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 99);
        assert!(engine.resolve_attack(&intent, &mut world, 0).is_none());

        assert_eq!(world, before);
    }

    #[test]
    fn test_cooldown_and_stun_block_attacks() {
        let mut engine = engine();
        let attacker = unit(1, 0, 0, 500).with_attack(melee(10));
        let mut world = world_with(attacker, vec![unit(2, 1, 1, 100)]);
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 2);

        assert!(engine.resolve_attack(&intent, &mut world, 0).is_some());
        assert!(engine.resolve_attack(&intent, &mut world, 5).is_none());
        assert!(engine.resolve_attack(&intent, &mut world, 10).is_some());

        world.combatants.get_mut(1).unwrap().status.stun_until(40);
        assert!(engine.resolve_attack(&intent, &mut world, 20).is_none());
    }

    #[test]
    fn test_shield_fully_absorbs() {
        let mut engine = engine();
        let attacker = unit(1, 0, 0, 500).with_attack(melee(60));
        let target = unit(2, 1, 1, 100).with_shield(80);
        let mut world = world_with(attacker, vec![target]);
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 2);

        let result = engine.resolve_attack(&intent, &mut world, 0).unwrap();
        let target = world.combatants.get(2).unwrap();
        assert_eq!(target.vitals.hp, 100);
        assert_eq!(target.vitals.shield, 20);
        assert_eq!(result.total_damage, 60);
        assert!(!result.hits[0].killed);
    }

    #[test]
    fn test_invulnerable_target_takes_nothing() {
        let mut engine = engine();
        let attacker = unit(1, 0, 0, 500).with_attack(melee(60));
        let mut target = unit(2, 1, 1, 100);
        target.status.invulnerable_until = Some(10);
        let mut world = world_with(attacker, vec![target]);
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 2);

        let result = engine.resolve_attack(&intent, &mut world, 3).unwrap();
        assert_eq!(result.total_damage, 0);
        assert_eq!(world.combatants.get(2).unwrap().vitals.hp, 100);
    }

    #[test]
    fn test_death_event_emitted_once() {
        let mut engine = engine();
        let attacker = unit(1, 0, 0, 500).with_attack(melee(100));
        let mut world = world_with(attacker, vec![unit(2, 1, 1, 50)]);
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 2);

        engine.resolve_attack(&intent, &mut world, 0).unwrap();
        assert!(engine.resolve_attack(&intent, &mut world, 20).is_none());
        let deaths = engine.take_deaths();
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].entity, 2);
        assert_eq!(deaths[0].killer, Some(1));
        assert_eq!(deaths[0].killer_owner, Some(0));
        assert!(engine.take_deaths().is_empty());
    }

    #[test]
    fn test_splash_is_capped_nearest_first() {
        let mut config = BattleConfig::default();
        config.combat.max_splash_targets = 2;
        let mut engine = CombatEngine::new(config.combat, 20, 64, 1);
        let mut profile = melee(100);
        profile.splash = Some(SplashParams {
            radius: Fixed::from_num(5),
            damage_fraction: Fixed::from_num(0.5),
            dropoff: false,
        });
        let attacker = unit(1, 0, 0, 500).with_attack(profile);
        let targets = vec![
            unit(2, 1, 1, 1000),
            unit(3, 1, 4, 1000),
            unit(4, 1, 2, 1000),
            unit(5, 1, 3, 1000),
        ];
        let mut world = world_with(attacker, targets);
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 2);

        let result = engine.resolve_attack(&intent, &mut world, 0).unwrap();
        let ids: Vec<EntityId> = result.hits.iter().map(|h| h.target).collect();
        assert_eq!(ids, vec![2, 4, 5]);
        assert_eq!(result.hits[1].damage, 50);
        assert_eq!(world.combatants.get(3).unwrap().vitals.hp, 1000);
    }

    #[test]
    fn test_splash_dropoff_bounds() {
        let radius = Fixed::from_num(4);
        assert_eq!(splash_dropoff(Fixed::ZERO, radius), Fixed::ONE);
        assert_eq!(splash_dropoff(Fixed::from_num(2), radius), Fixed::from_num(0.5));
        assert_eq!(splash_dropoff(radius, radius), Fixed::from_num(SPLASH_DROPOFF_FLOOR));
    }

    #[test]
    fn test_stun_and_knockback_apply_to_hits_only() {
        let mut engine = engine();
        let mut profile = melee(10);
        profile.effects = StatusEffectParams {
            stun_ticks: 15,
            knockback: Fixed::from_num(5),
        };
        let attacker = unit(1, 0, 0, 500).with_attack(profile);
        let mut world = world_with(attacker, vec![unit(2, 1, 1, 100), unit(3, 1, 8, 100)]);
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 2);

        let result = engine.resolve_attack(&intent, &mut world, 4).unwrap();
        assert_eq!(result.stunned, vec![2]);
        assert_eq!(result.knocked_back, vec![2]);

        let victim = world.combatants.get(2).unwrap();
        assert_eq!(victim.status.stunned_until, Some(19));
        // Pushed away from the attacker by the capped distance.
        assert_eq!(victim.position, Vec2Fixed::from_tiles(3, 0));

        let attacker = world.combatants.get(1).unwrap();
        assert_eq!(attacker.status.stunned_until, None);
        assert_eq!(attacker.position, Vec2Fixed::ZERO);
        assert_eq!(world.combatants.get(3).unwrap().status.stunned_until, None);
    }

    #[test]
    fn test_knockback_ignores_mass() {
        let mut engine = engine();
        let mut profile = melee(10);
        profile.effects = StatusEffectParams {
            stun_ticks: 0,
            knockback: Fixed::ONE,
        };
        let heavy = unit(2, 1, 1, 1000).with_classification(Classification {
            mass: 18,
            ..Classification::default()
        });
        let attacker = unit(1, 0, 0, 500).with_attack(profile);
        let mut world = world_with(attacker, vec![heavy]);
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 2);

        engine.resolve_attack(&intent, &mut world, 0).unwrap();
        assert_eq!(world.combatants.get(2).unwrap().position, Vec2Fixed::from_tiles(2, 0));
    }

    #[test]
    fn test_orphaned_detonation_pushes_away_from_impact_point() {
        let mut engine = engine();
        let mut profile = melee(100);
        profile.range = Fixed::from_num(6);
        profile.projectile = Some(ProjectileParams {
            speed: Fixed::from_num(5),
        });
        profile.splash = Some(SplashParams {
            radius: Fixed::from_num(2),
            damage_fraction: Fixed::from_num(0.5),
            dropoff: false,
        });
        profile.effects = StatusEffectParams {
            stun_ticks: 0,
            knockback: Fixed::ONE,
        };
        let attacker = unit(1, 0, 0, 500).with_attack(profile);
        let mut world = world_with(attacker, vec![unit(2, 1, 5, 100), unit(3, 1, 4, 1000)]);
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 2);
        let launched = engine.resolve_attack(&intent, &mut world, 0).unwrap();
        assert!(launched.is_pending());

        world.combatants.get_mut(2).unwrap().take_damage(5000);
        let phase = engine.update(20, &mut world);
        assert_eq!(phase.results.len(), 1);
        let result = &phase.results[0];
        assert_eq!(result.knocked_back, vec![3]);

        // The bystander sat between launch and impact; it moves back toward
        // the launcher, away from the detonation.
        let bystander = world.combatants.get(3).unwrap();
        assert_eq!(bystander.position, Vec2Fixed::from_tiles(3, 0));
        assert_eq!(world.combatants.get(1).unwrap().position, Vec2Fixed::ZERO);
    }

    #[test]
    fn test_crit_multiplies_damage_when_certain() {
        let mut config = BattleConfig::default();
        config.combat.crit_enabled = true;
        config.combat.crit_chance = Fixed::ONE;
        config.combat.crit_multiplier = Fixed::from_num(2);
        let mut engine = CombatEngine::new(config.combat, 20, 64, 9);
        let attacker = unit(1, 0, 0, 500).with_attack(melee(40));
        let mut world = world_with(attacker, vec![unit(2, 1, 1, 1000)]);
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 2);

        let result = engine.resolve_attack(&intent, &mut world, 0).unwrap();
        assert!(result.critical);
        assert_eq!(result.total_damage, 80);
    }

    #[test]
    fn test_projectile_launch_returns_pending_result() {
        let mut engine = engine();
        let mut profile = melee(70);
        profile.range = Fixed::from_num(6);
        profile.projectile = Some(ProjectileParams {
            speed: Fixed::from_num(5),
        });
        let attacker = unit(1, 0, 0, 500).with_attack(profile);
        let mut world = world_with(attacker, vec![unit(2, 1, 5, 100)]);
        let intent = AttackIntent::from_profile(world.combatants.get(1).unwrap(), 2);

        let result = engine.resolve_attack(&intent, &mut world, 0).unwrap();
        assert!(result.is_pending());
        assert!(result.hits.is_empty());
        let projectile = world.projectiles.get(result.launched_projectile.unwrap()).unwrap();
        assert_eq!(projectile.expected_hit_tick, 20);
        assert_eq!(world.combatants.get(2).unwrap().vitals.hp, 100);
        assert_eq!(world.combatants.get(1).unwrap().attack.last_attack_tick, Some(0));
    }
}
