//! Per-entity behavior.
//!
//! A [`UnitSimulation`] is the controller of one combatant. Each tick it
//! asks the targeting engine for a target among the candidates the
//! scheduler injected, then either issues a single attack intent or walks
//! toward its goal. Structures use the same controller with zero walk speed.

use serde::{Deserialize, Serialize};

use crate::combat::AttackIntent;
use crate::components::{Combatant, EntityId, TargetView};
use crate::error::{GameError, Result};
use crate::math::{Fixed, Vec2Fixed};
use crate::targeting::TargetingEngine;

/// Behavior state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UnitState {
    /// Nothing to do.
    #[default]
    Idle,
    /// Advancing toward a target or objective.
    Seeking,
    /// Target in range, attacking on cooldown.
    Engaging,
    /// Cannot act until the stun expires.
    Stunned,
    /// Terminal.
    Dead,
}

/// Snapshot of a unit for external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CombatInfo {
    /// Combatant id.
    pub id: EntityId,
    /// Current position.
    pub position: Vec2Fixed,
    /// Behavior state.
    pub state: UnitState,
    /// Current hit points.
    pub hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Current target.
    pub current_target: Option<EntityId>,
}

/// Read-only inputs of one unit update, lent by the scheduler.
pub struct UnitContext<'a> {
    /// The battle's targeting engine.
    pub targeting: &'a mut TargetingEngine,
    /// Views of every combatant this tick.
    pub candidates: &'a [TargetView],
}

/// Controller of one combatant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitSimulation {
    entity: EntityId,
    state: UnitState,
    /// State to resume when a stun ends.
    resume_state: UnitState,
    current_target: Option<EntityId>,
    objective: Option<EntityId>,
}

impl UnitSimulation {
    /// Create an idle controller for `entity`.
    #[must_use]
    pub const fn new(entity: EntityId) -> Self {
        Self {
            entity,
            state: UnitState::Idle,
            resume_state: UnitState::Idle,
            current_target: None,
            objective: None,
        }
    }

    /// Controlled combatant.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> UnitState {
        self.state
    }

    /// Current target.
    #[must_use]
    pub const fn current_target(&self) -> Option<EntityId> {
        self.current_target
    }

    /// Enemy structure currently walked toward.
    #[must_use]
    pub const fn objective(&self) -> Option<EntityId> {
        self.objective
    }

    /// Whether the controller reached its terminal state.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.state == UnitState::Dead
    }

    /// Report position, state, hit points and target.
    #[must_use]
    pub fn combat_info(&self, combatant: &Combatant) -> CombatInfo {
        CombatInfo {
            id: self.entity,
            position: combatant.position,
            state: self.state,
            hp: combatant.vitals.hp,
            max_hp: combatant.vitals.max_hp,
            current_target: self.current_target,
        }
    }

    /// Advance this unit by one tick.
    ///
    /// Returns at most one attack intent. Movement is applied to
    /// `combatant` directly.
    pub fn update(
        &mut self,
        combatant: &mut Combatant,
        ctx: &mut UnitContext<'_>,
        tick: u64,
        tick_duration_ms: u32,
    ) -> Result<Option<AttackIntent>> {
        if combatant.id != self.entity {
            return Err(GameError::InvalidState(format!(
                "controller for {} was given combatant {}",
                self.entity, combatant.id
            )));
        }
        if self.state == UnitState::Dead {
            return Ok(None);
        }
        if !combatant.is_alive() {
            self.state = UnitState::Dead;
            self.current_target = None;
            return Ok(None);
        }
        if combatant.status.is_stunned(tick) {
            if self.state != UnitState::Stunned {
                self.resume_state = self.state;
                self.state = UnitState::Stunned;
            }
            return Ok(None);
        }
        if self.state == UnitState::Stunned {
            self.state = self.resume_state;
        }

        // Non-attackers never select, so they leave no recency marks.
        let selected = if combatant.attack.can_attack {
            ctx.targeting
                .select_target(&combatant.view(), ctx.candidates, self.current_target, tick)
                .target
        } else {
            None
        };
        self.current_target = selected;

        let target = match selected {
            Some(id) => Some(
                ctx.candidates
                    .iter()
                    .find(|c| c.id == id)
                    .ok_or(GameError::EntityNotFound(id))?,
            ),
            None => None,
        };

        if let Some(target) = target {
            if combatant.attack.can_attack
                && combatant.attack.in_range(combatant.position, target.position)
            {
                self.state = UnitState::Engaging;
                if combatant.attack.is_ready(tick) {
                    return Ok(Some(AttackIntent::from_profile(combatant, target.id)));
                }
                return Ok(None);
            }
        }

        self.objective = nearest_enemy_structure(combatant, ctx.candidates);
        let goal = target.map(|t| t.position).or_else(|| {
            self.objective
                .and_then(|id| ctx.candidates.iter().find(|c| c.id == id))
                .map(|c| c.position)
        });

        match goal {
            Some(goal) if combatant.walk_speed > Fixed::ZERO => {
                self.state = UnitState::Seeking;
                advance(combatant, goal, tick_duration_ms);
            }
            _ => self.state = UnitState::Idle,
        }
        Ok(None)
    }
}

/// Nearest live structure owned by another player, ties broken by id.
fn nearest_enemy_structure(combatant: &Combatant, candidates: &[TargetView]) -> Option<EntityId> {
    candidates
        .iter()
        .filter(|c| c.structure && c.alive && c.owner != combatant.owner)
        .min_by_key(|c| (combatant.position.distance_squared(c.position), c.id))
        .map(|c| c.id)
}

/// Distance a unit steps past the range boundary when it arrives, so the
/// squared-distance range test agrees with the rounded square root.
const ARRIVAL_SLACK: Fixed = Fixed::from_bits(1 << 16);

/// Walk toward `goal`, stopping once it is within attack range.
fn advance(combatant: &mut Combatant, goal: Vec2Fixed, tick_duration_ms: u32) {
    if combatant.attack.in_range(combatant.position, goal) {
        return;
    }
    let step = combatant.walk_speed * Fixed::from_num(tick_duration_ms) / Fixed::from_num(1000);
    let remaining = (combatant.position.distance(goal) - combatant.attack.range).max(Fixed::ZERO);
    if step < remaining {
        combatant.position = combatant.position.move_towards(goal, step);
        return;
    }
    combatant.position = combatant
        .position
        .move_towards(goal, remaining + ARRIVAL_SLACK);
}
