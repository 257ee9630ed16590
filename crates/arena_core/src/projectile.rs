//! In-flight ranged attacks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{
    DamageCategory, EntityId, PlayerId, ProjectileId, SplashParams, StatusEffectParams,
};
use crate::math::{fixed_serde, round_to_u64, Fixed, Vec2Fixed};

/// What a projectile will hit on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectileTarget {
    /// The intended combatant, still alive at the last prune.
    Entity(EntityId),
    /// The intended combatant is gone; detonate at the captured position.
    Orphaned,
}

/// A ranged attack travelling toward a captured position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Projectile {
    /// Unique id.
    pub id: ProjectileId,
    /// Launching combatant.
    pub source: EntityId,
    /// Owner of the launching combatant, kept for orphaned splash.
    pub source_owner: PlayerId,
    /// Target id chosen at launch.
    pub intended_target: EntityId,
    /// Live target reference, redirected to [`ProjectileTarget::Orphaned`] on death.
    pub target: ProjectileTarget,
    /// Where the projectile left.
    pub launch_position: Vec2Fixed,
    /// Target position captured at launch.
    pub target_position: Vec2Fixed,
    /// Current interpolated position.
    pub position: Vec2Fixed,
    /// Base damage.
    pub damage: u32,
    /// Damage category.
    pub category: DamageCategory,
    /// Splash payload.
    pub splash: Option<SplashParams>,
    /// Status effects applied on impact.
    pub effects: StatusEffectParams,
    /// Travel speed in tiles per second.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Tick of launch.
    pub launch_tick: u64,
    /// Tick at which the projectile resolves. Never before `launch_tick`.
    pub expected_hit_tick: u64,
}

/// Whole ticks needed to cover `distance` at `speed` tiles per second.
///
/// Returns `None` for a non-positive speed.
#[must_use]
pub fn flight_ticks(distance: Fixed, speed: Fixed, tick_rate: u32) -> Option<u64> {
    if speed <= Fixed::ZERO {
        return None;
    }
    let seconds = distance.checked_div(speed)?;
    Some(round_to_u64(seconds.saturating_mul(Fixed::from_num(tick_rate))))
}

impl Projectile {
    /// Whether the projectile resolves at `tick`.
    #[must_use]
    pub fn is_due(&self, tick: u64) -> bool {
        tick >= self.expected_hit_tick
    }

    /// Whether the target has been redirected to the orphan sentinel.
    #[must_use]
    pub fn is_orphaned(&self) -> bool {
        self.target == ProjectileTarget::Orphaned
    }

    /// Redirect to the orphan sentinel. The captured position is kept.
    pub fn orphan(&mut self) {
        self.target = ProjectileTarget::Orphaned;
    }

    /// Move along the straight line from launch to the captured target.
    pub fn interpolate(&mut self, tick: u64) {
        let total = self.expected_hit_tick.saturating_sub(self.launch_tick);
        if total == 0 {
            self.position = self.target_position;
            return;
        }
        let elapsed = tick.saturating_sub(self.launch_tick).min(total);
        let t = Fixed::from_num(elapsed) / Fixed::from_num(total);
        self.position = self.launch_position.lerp(self.target_position, t);
    }
}

/// Active projectiles of one battle, ordered by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectileRegistry {
    projectiles: BTreeMap<ProjectileId, Projectile>,
    next_id: ProjectileId,
}

impl Default for ProjectileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectileRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            projectiles: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Allocate the next projectile id.
    pub(crate) fn allocate_id(&mut self) -> ProjectileId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Add a projectile.
    pub(crate) fn insert(&mut self, projectile: Projectile) {
        self.projectiles.insert(projectile.id, projectile);
    }

    /// Remove a projectile; once removed it can never resolve again.
    pub(crate) fn remove(&mut self, id: ProjectileId) -> Option<Projectile> {
        self.projectiles.remove(&id)
    }

    /// Get a projectile.
    #[must_use]
    pub fn get(&self, id: ProjectileId) -> Option<&Projectile> {
        self.projectiles.get(&id)
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.values()
    }

    /// Iterate mutably in id order.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Projectile> {
        self.projectiles.values_mut()
    }

    /// Due projectiles, oldest expected impact first.
    #[must_use]
    pub fn due(&self, tick: u64) -> Vec<ProjectileId> {
        let mut due: Vec<(u64, ProjectileId)> = self
            .projectiles
            .values()
            .filter(|p| p.is_due(tick))
            .map(|p| (p.expected_hit_tick, p.id))
            .collect();
        due.sort_unstable();
        due.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of active projectiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrow(launch_tick: u64, expected_hit_tick: u64) -> Projectile {
        Projectile {
            id: 1,
            source: 1,
            source_owner: 0,
            intended_target: 2,
            target: ProjectileTarget::Entity(2),
            launch_position: Vec2Fixed::ZERO,
            target_position: Vec2Fixed::from_tiles(10, 0),
            position: Vec2Fixed::ZERO,
            damage: 50,
            category: DamageCategory::Physical,
            splash: None,
            effects: StatusEffectParams::default(),
            speed: Fixed::from_num(5),
            launch_tick,
            expected_hit_tick,
        }
    }

    #[test]
    fn test_flight_ticks_five_tiles_at_five_per_second() {
        assert_eq!(flight_ticks(Fixed::from_num(5), Fixed::from_num(5), 20), Some(20));
        assert_eq!(flight_ticks(Fixed::ZERO, Fixed::from_num(5), 20), Some(0));
        assert_eq!(flight_ticks(Fixed::ONE, Fixed::ZERO, 20), None);
    }

    #[test]
    fn test_interpolation_is_linear_and_clamped() {
        let mut p = arrow(0, 20);
        p.interpolate(10);
        assert_eq!(p.position, Vec2Fixed::from_tiles(5, 0));
        p.interpolate(40);
        assert_eq!(p.position, p.target_position);
    }

    #[test]
    fn test_due_order_is_oldest_first() {
        let mut registry = ProjectileRegistry::new();
        for expected in [12, 5, 9] {
            let mut p = arrow(0, expected);
            p.id = registry.allocate_id();
            registry.insert(p);
        }
        assert_eq!(registry.due(10), vec![2, 3]);
        assert_eq!(registry.due(4), Vec::<ProjectileId>::new());
    }

    #[test]
    fn test_orphan_keeps_captured_position() {
        let mut p = arrow(0, 20);
        p.orphan();
        assert!(p.is_orphaned());
        assert_eq!(p.target_position, Vec2Fixed::from_tiles(10, 0));
    }
}
