//! Target selection.
//!
//! The [`TargetingEngine`] scores every valid candidate and picks the best
//! one, with a hysteresis policy that keeps the current target unless a
//! rival wins decisively. Selection is a pure decision: it never touches
//! hit points, positions or cooldowns. The only state it keeps is the
//! recency map used to spread damage across targets.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, TargetView};
use crate::config::TargetingConfig;
use crate::math::{clamp01, Fixed};

/// Why a decision came out the way it did. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetReason {
    /// Nothing passed the filters.
    NoValidTargets,
    /// Exactly one candidate passed the filters.
    OnlyCandidate,
    /// Best-scoring candidate, no competing current target.
    BestScore,
    /// Current target kept because the rival did not win decisively.
    Retained,
    /// Current target abandoned for a decisively better candidate.
    Switched,
}

/// A scored candidate, reported as a runner-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredCandidate {
    /// Candidate id.
    pub id: EntityId,
    /// Total score.
    pub score: Fixed,
    /// Straight-line distance from the attacker.
    pub distance: Fixed,
}

/// Output of one targeting pass. Never cached beyond one decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetingDecision {
    /// Selected target.
    pub target: Option<EntityId>,
    /// How decisively the selection won, in `[0, 1]`.
    pub confidence: Fixed,
    /// Diagnostic reason.
    pub reason: TargetReason,
    /// Best candidates that were not selected, best first.
    pub runner_ups: Vec<ScoredCandidate>,
}

impl TargetingDecision {
    fn none() -> Self {
        Self {
            target: None,
            confidence: Fixed::ZERO,
            reason: TargetReason::NoValidTargets,
            runner_ups: Vec::new(),
        }
    }
}

/// Per-battle targeting engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetingEngine {
    #[serde(skip)]
    config: TargetingConfig,
    /// Last tick each target id was selected, by any attacker.
    recent: BTreeMap<EntityId, u64>,
    last_prune_tick: u64,
}

impl TargetingEngine {
    /// Create an engine with empty recency history.
    #[must_use]
    pub fn new(config: TargetingConfig) -> Self {
        Self {
            config,
            recent: BTreeMap::new(),
            last_prune_tick: 0,
        }
    }

    /// Replace the configuration, keeping recency history.
    pub fn set_config(&mut self, config: TargetingConfig) {
        self.config = config;
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &TargetingConfig {
        &self.config
    }

    /// Feed the recency history into a state hash.
    pub(crate) fn hash_state<H: Hasher>(&self, state: &mut H) {
        self.recent.hash(state);
        self.last_prune_tick.hash(state);
    }

    /// Pick a target for `attacker` among `candidates`.
    ///
    /// `current_target` is the attacker's target from its previous decision.
    /// If it is still valid, a different candidate only replaces it when the
    /// confidence exceeds the configured switch threshold.
    pub fn select_target(
        &mut self,
        attacker: &TargetView,
        candidates: &[TargetView],
        current_target: Option<EntityId>,
        tick: u64,
    ) -> TargetingDecision {
        if tick.saturating_sub(self.last_prune_tick) >= self.config.recency_prune_interval_ticks {
            self.prune(tick);
        }

        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .filter(|candidate| self.is_valid_candidate(attacker, candidate))
            .map(|candidate| {
                let distance = attacker.position.distance(candidate.position);
                ScoredCandidate {
                    id: candidate.id,
                    score: self.score(candidate, distance, current_target, tick),
                    distance,
                }
            })
            .collect();

        if scored.is_empty() {
            return TargetingDecision::none();
        }

        // Highest score first; lower id wins ties so the order is total.
        scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));

        let top = scored[0];
        let confidence = match scored.get(1) {
            None => Fixed::ONE,
            Some(second) => clamp01((top.score - second.score) / self.config.confidence_normalizer),
        };
        let current_valid = current_target.filter(|id| scored.iter().any(|c| c.id == *id));

        let (target, confidence, reason) = match current_valid {
            Some(current) if current == top.id => (current, confidence, self.plain_reason(&scored)),
            Some(current) if confidence <= self.config.switch_threshold => {
                (current, self.config.retained_confidence, TargetReason::Retained)
            }
            Some(current) => {
                tracing::debug!(
                    attacker = attacker.id,
                    from = current,
                    to = top.id,
                    tick,
                    "Target switch"
                );
                self.recent.insert(top.id, tick);
                (top.id, confidence, TargetReason::Switched)
            }
            None => {
                self.recent.insert(top.id, tick);
                (top.id, confidence, self.plain_reason(&scored))
            }
        };

        let runner_ups = scored
            .into_iter()
            .filter(|c| c.id != target)
            .take(self.config.max_runner_ups)
            .collect();

        TargetingDecision {
            target: Some(target),
            confidence,
            reason,
            runner_ups,
        }
    }

    fn plain_reason(&self, scored: &[ScoredCandidate]) -> TargetReason {
        if scored.len() == 1 {
            TargetReason::OnlyCandidate
        } else {
            TargetReason::BestScore
        }
    }

    /// Whether `candidate` passes every filter for `attacker`.
    #[must_use]
    pub fn is_valid_candidate(&self, attacker: &TargetView, candidate: &TargetView) -> bool {
        if candidate.owner == attacker.owner || !candidate.alive || candidate.hp == 0 {
            return false;
        }
        if !attacker.capabilities.can_engage(candidate.classification.flying) {
            return false;
        }
        let range = attacker.sight_range.min(self.config.max_range);
        attacker.position.distance_squared(candidate.position) <= range.saturating_mul(range)
    }

    /// Additive score of a candidate; higher is better.
    #[must_use]
    pub fn score(
        &self,
        candidate: &TargetView,
        distance: Fixed,
        current_target: Option<EntityId>,
        tick: u64,
    ) -> Fixed {
        let cfg = &self.config;
        let mut score = (cfg.distance_weight / distance.max(cfg.min_distance)).min(cfg.distance_bonus_cap);

        if candidate.structure {
            score += cfg.structure_bonus;
        }

        let hp_fraction = candidate.hp_fraction();
        if hp_fraction < Fixed::from_num(0.5) {
            score += cfg.low_hp_weight * (Fixed::ONE - hp_fraction);
        }

        if candidate.classification.tank || candidate.max_hp >= cfg.tank_hp_threshold {
            score += cfg.tank_bonus;
        }

        if current_target == Some(candidate.id) {
            score += cfg.hysteresis_bonus;
        }

        // Keyed by target only: any attacker's recent pick counts.
        if self.recently_selected(candidate.id, tick) {
            score -= cfg.recency_penalty;
        }

        score
    }

    /// Whether any attacker selected `id` within the recency window.
    #[must_use]
    pub fn recently_selected(&self, id: EntityId, tick: u64) -> bool {
        self.recent
            .get(&id)
            .is_some_and(|&at| tick.saturating_sub(at) <= self.config.recency_window_ticks)
    }

    /// Drop recency entries older than the window.
    pub fn prune(&mut self, tick: u64) {
        let window = self.config.recency_window_ticks;
        self.recent.retain(|_, at| tick.saturating_sub(*at) <= window);
        self.last_prune_tick = tick;
    }

    /// Number of tracked recency entries.
    #[must_use]
    pub fn recency_len(&self) -> usize {
        self.recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Capabilities, Classification};
    use crate::math::Vec2Fixed;

    fn view(id: EntityId, owner: u8, x: i32, y: i32) -> TargetView {
        TargetView {
            id,
            owner,
            position: Vec2Fixed::from_tiles(x, y),
            hp: 1000,
            max_hp: 1000,
            alive: true,
            structure: false,
            classification: Classification::default(),
            capabilities: Capabilities::default(),
            sight_range: Fixed::from_num(10),
        }
    }

    fn engine() -> TargetingEngine {
        TargetingEngine::new(TargetingConfig::default())
    }

    #[test]
    fn test_no_candidates_reports_no_valid_targets() {
        let mut engine = engine();
        let decision = engine.select_target(&view(1, 0, 0, 0), &[], None, 0);
        assert_eq!(decision.target, None);
        assert_eq!(decision.reason, TargetReason::NoValidTargets);
        assert_eq!(decision.confidence, Fixed::ZERO);
    }

    #[test]
    fn test_single_candidate_has_full_confidence() {
        let mut engine = engine();
        let decision = engine.select_target(&view(1, 0, 0, 0), &[view(2, 1, 3, 0)], None, 0);
        assert_eq!(decision.target, Some(2));
        assert_eq!(decision.confidence, Fixed::ONE);
        assert_eq!(decision.reason, TargetReason::OnlyCandidate);
    }

    #[test]
    fn test_filters_friendly_dead_far_and_flying() {
        let mut engine = engine();
        let attacker = view(1, 0, 0, 0);
        let friendly = view(2, 0, 1, 0);
        let mut dead = view(3, 1, 1, 0);
        dead.alive = false;
        let far = view(4, 1, 50, 0);
        let mut flyer = view(5, 1, 1, 1);
        flyer.classification.flying = true;

        let decision = engine.select_target(&attacker, &[friendly, dead, far, flyer], None, 0);
        assert_eq!(decision.target, None);

        let mut anti_air = attacker;
        anti_air.capabilities.can_target_air = true;
        let decision = engine.select_target(&anti_air, &[flyer], None, 0);
        assert_eq!(decision.target, Some(5));
    }

    #[test]
    fn test_closer_and_weaker_score_higher() {
        let engine = engine();
        let near = view(2, 1, 1, 0);
        let far = view(3, 1, 8, 0);
        let near_score = engine.score(&near, Fixed::ONE, None, 0);
        let far_score = engine.score(&far, Fixed::from_num(8), None, 0);
        assert!(near_score > far_score);

        let mut wounded = far;
        wounded.hp = 100;
        assert!(engine.score(&wounded, Fixed::from_num(8), None, 0) > far_score);
    }

    #[test]
    fn test_hysteresis_keeps_current_target_on_marginal_gain() {
        let mut engine = engine();
        let attacker = view(1, 0, 0, 0);
        // A is current at distance 4; B is much closer at distance 1, but
        // A's hysteresis bonus leaves B only marginally ahead.
        let a = view(2, 1, 4, 0);
        let b = view(3, 1, 0, 1);

        let score_a = engine.score(&a, Fixed::from_num(4), Some(2), 100);
        let score_b = engine.score(&b, Fixed::ONE, Some(2), 100);
        assert!(score_b > score_a, "B must nominally outscore A");
        let gap = (score_b - score_a) / engine.config().confidence_normalizer;
        assert!(gap <= engine.config().switch_threshold);

        let decision = engine.select_target(&attacker, &[a, b], Some(2), 100);
        assert_eq!(decision.target, Some(2));
        assert_eq!(decision.reason, TargetReason::Retained);
        assert_eq!(decision.confidence, engine.config().retained_confidence);
        assert_eq!(decision.runner_ups[0].id, 3);
    }

    #[test]
    fn test_decisive_rival_causes_switch() {
        let mut engine = engine();
        let attacker = view(1, 0, 0, 0);
        let a = view(2, 1, 9, 0);
        let mut b = view(3, 1, 1, 0);
        b.hp = 50;
        b.structure = true;

        let decision = engine.select_target(&attacker, &[a, b], Some(2), 100);
        assert_eq!(decision.target, Some(3));
        assert_eq!(decision.reason, TargetReason::Switched);
        assert!(decision.confidence > engine.config().switch_threshold);
        assert!(engine.recently_selected(3, 100));
    }

    #[test]
    fn test_dead_current_target_is_replaced() {
        let mut engine = engine();
        let attacker = view(1, 0, 0, 0);
        let mut a = view(2, 1, 1, 0);
        a.alive = false;
        let b = view(3, 1, 5, 0);
        let decision = engine.select_target(&attacker, &[a, b], Some(2), 10);
        assert_eq!(decision.target, Some(3));
    }

    #[test]
    fn test_recency_penalty_is_global_across_attackers() {
        // Documented behavior: the penalty is keyed by target only, so one
        // attacker's pick makes the target less attractive to everyone.
        let mut engine = engine();
        let first = view(1, 0, 0, 0);
        let second = view(4, 0, 0, 0);
        let a = view(2, 1, 3, 0);
        let b = view(3, 1, 0, 3);

        let before = engine.score(&a, Fixed::from_num(3), None, 5);
        let decision = engine.select_target(&first, &[a, b], None, 5);
        assert_eq!(decision.target, Some(2));

        let after = engine.score(&a, Fixed::from_num(3), None, 6);
        assert_eq!(before - after, engine.config().recency_penalty);

        // The second attacker sees A penalized and prefers the untouched B.
        let decision = engine.select_target(&second, &[a, b], None, 6);
        assert_eq!(decision.target, Some(3));
    }

    #[test]
    fn test_recency_entries_are_pruned() {
        let mut engine = engine();
        let attacker = view(1, 0, 0, 0);
        engine.select_target(&attacker, &[view(2, 1, 1, 0)], None, 0);
        assert_eq!(engine.recency_len(), 1);

        let window = engine.config().recency_window_ticks;
        engine.prune(window + 1);
        assert_eq!(engine.recency_len(), 0);
    }

    #[test]
    fn test_confidence_stays_in_unit_interval() {
        let mut engine = engine();
        let attacker = view(1, 0, 0, 0);
        let candidates: Vec<TargetView> = (0..6).map(|i| view(10 + i, 1, i as i32 + 1, 0)).collect();
        for tick in 0..20 {
            let decision = engine.select_target(&attacker, &candidates, Some(12), tick);
            assert!(decision.confidence >= Fixed::ZERO && decision.confidence <= Fixed::ONE);
            assert!(decision.runner_ups.len() <= engine.config().max_runner_ups);
        }
    }
}
