//! Id-keyed storage for the combatants of one battle.
//!
//! Iteration is always in ascending id order, which keeps every system
//! that walks the registry deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{Combatant, EntityId, PlayerId, TargetView};
use crate::error::{GameError, Result};
use crate::math::{Fixed, Vec2Fixed};
use crate::projectile::ProjectileRegistry;

/// Combatant storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatantRegistry {
    entities: BTreeMap<EntityId, Combatant>,
    next_id: EntityId,
}

impl Default for CombatantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CombatantRegistry {
    /// Create an empty registry. Ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Reserve a fresh id.
    pub fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Insert a combatant under its own id.
    pub fn insert(&mut self, combatant: Combatant) -> Result<EntityId> {
        let id = combatant.id;
        if self.entities.contains_key(&id) {
            return Err(GameError::DuplicateEntity(id));
        }
        self.next_id = self.next_id.max(id + 1);
        self.entities.insert(id, combatant);
        Ok(id)
    }

    /// Remove a combatant.
    pub fn remove(&mut self, id: EntityId) -> Result<Combatant> {
        self.entities.remove(&id).ok_or(GameError::EntityNotFound(id))
    }

    /// Get a combatant.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Combatant> {
        self.entities.get(&id)
    }

    /// Get a combatant mutably.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Combatant> {
        self.entities.get_mut(&id)
    }

    /// Whether the id is registered and alive.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.get(&id).is_some_and(Combatant::is_alive)
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Combatant> {
        self.entities.values()
    }

    /// Iterate mutably in id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Combatant> {
        self.entities.values_mut()
    }

    /// Ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    /// Number of registered combatants, dead ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Targeting views of every combatant, in id order.
    #[must_use]
    pub fn views(&self) -> Vec<TargetView> {
        self.entities.values().map(Combatant::view).collect()
    }

    /// Live combatants hostile to `owner` within `radius` of `center`,
    /// nearest first with ties broken by id.
    #[must_use]
    pub fn hostiles_within(
        &self,
        center: Vec2Fixed,
        radius: Fixed,
        owner: PlayerId,
    ) -> Vec<(EntityId, Fixed)> {
        let radius_sq = radius.saturating_mul(radius);
        let mut found: Vec<(Fixed, EntityId)> = self
            .entities
            .values()
            .filter(|c| c.is_alive() && c.owner != owner)
            .filter_map(|c| {
                let dist_sq = center.distance_squared(c.position);
                (dist_sq <= radius_sq).then_some((dist_sq, c.id))
            })
            .collect();
        found.sort_unstable();
        found
            .into_iter()
            .map(|(dist_sq, id)| (id, crate::math::fixed_sqrt(dist_sq)))
            .collect()
    }
}

/// Everything the combat engine mutates: combatants and projectiles.
///
/// Owned by the battle scheduler and lent out for the duration of a tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleWorld {
    /// Combatants by id.
    pub combatants: CombatantRegistry,
    /// Active projectiles by id.
    pub projectiles: ProjectileRegistry,
}

impl BattleWorld {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::EntityKind;

    fn unit(id: EntityId, owner: PlayerId, x: i32) -> Combatant {
        Combatant::new(id, owner, EntityKind::Unit, Vec2Fixed::from_tiles(x, 0), 100)
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut registry = CombatantRegistry::new();
        registry.insert(unit(3, 0, 0)).unwrap();
        assert!(matches!(
            registry.insert(unit(3, 1, 0)),
            Err(GameError::DuplicateEntity(3))
        ));
        assert_eq!(registry.allocate_id(), 4);
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let mut registry = CombatantRegistry::new();
        assert!(matches!(registry.remove(9), Err(GameError::EntityNotFound(9))));
    }

    #[test]
    fn test_hostiles_within_sorted_nearest_first() {
        let mut registry = CombatantRegistry::new();
        registry.insert(unit(1, 0, 0)).unwrap();
        registry.insert(unit(2, 1, 3)).unwrap();
        registry.insert(unit(3, 1, 1)).unwrap();
        registry.insert(unit(4, 1, 9)).unwrap();
        let mut dead = unit(5, 1, 1);
        dead.take_damage(100);
        registry.insert(dead).unwrap();

        let found = registry.hostiles_within(Vec2Fixed::ZERO, Fixed::from_num(4), 0);
        let ids: Vec<EntityId> = found.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
