//! Determinism testing utilities.
//!
//! Provides a harness for verifying that battles produce identical results
//! given identical inputs.
//!
//! # Testing Strategy
//!
//! The server is authoritative, but hashes are compared across replays,
//! restores and parallel runs, so battles must be bit-for-bit reproducible.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`arena_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Registries are ordered maps and are walked in id order.
//!
//! - **System randomness**: Critical hits draw from a seeded RNG owned by
//!   each battle.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual engine determinism (targeting, combat)
//! 2. **Property tests**: Random rosters must still produce deterministic outputs
//! 3. **Integration tests**: Full battles are reproducible
//! 4. **Parallel tests**: Running N battles in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use arena_core::scheduler::Battle;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic battle).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the battle was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Battle is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel battle runs.
#[derive(Debug, Clone)]
pub struct ParallelBattleResult {
    /// Final state hash from each battle.
    pub hashes: Vec<u64>,
    /// Number of ticks each battle ran.
    pub ticks: u64,
    /// Number of battles run.
    pub num_battles: usize,
}

impl ParallelBattleResult {
    /// Check if all battles produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all battles matched.
    ///
    /// # Panics
    ///
    /// Panics if battles produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel battles diverged!\n\
                 Battles: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_battles,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run any stateful process multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of steps per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance by one step
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use arena_test_utils::determinism::verify_determinism;
/// use arena_test_utils::fixtures::duel_battle;
///
/// let result = verify_determinism(
///     3,
///     50,
///     || duel_battle(9),
///     |battle| {
///         battle.tick();
///     },
///     |battle| battle.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a battle twice with identical setup and compare final hashes.
pub fn verify_battle_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Battle,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |battle| {
            battle.tick();
        },
        |battle| battle.state_hash(),
    );
    result.is_deterministic
}

/// Run N battles on scoped threads and collect final hashes.
///
/// Battles share nothing, so thread scheduling must not influence results.
///
/// # Panics
///
/// Panics if a battle thread panics.
pub fn run_parallel_battles<F>(setup_fn: F, num_battles: usize, num_ticks: u64) -> ParallelBattleResult
where
    F: Fn() -> Battle + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_battles)
            .map(|_| {
                s.spawn(|| {
                    let mut battle = setup_fn();
                    for _ in 0..num_ticks {
                        battle.tick();
                    }
                    battle.state_hash()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelBattleResult {
        hashes,
        ticks: num_ticks,
        num_battles,
    }
}

/// Compare two battle runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if the runs match, `Some(tick)` for the first tick whose
/// resulting state differs.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Battle,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        first.tick();
        second.tick();

        if first.state_hash() != second.state_hash() {
            tracing::debug!(tick, "Battles diverged");
            return Some(tick);
        }
    }

    None
}

/// Verify that a snapshot taken mid-battle restores to the same state and
/// keeps evolving identically.
pub fn verify_snapshot_determinism<F>(setup_fn: F, warmup_ticks: u64, follow_ticks: u64) -> bool
where
    F: Fn() -> Battle,
{
    let mut battle = setup_fn();
    for _ in 0..warmup_ticks {
        battle.tick();
    }

    let Ok(bytes) = battle.snapshot() else {
        return false;
    };
    let Ok(mut restored) = Battle::restore(&bytes) else {
        return false;
    };
    if restored.state_hash() != battle.state_hash() {
        return false;
    }

    for _ in 0..follow_ticks {
        battle.tick();
        restored.tick();
    }
    restored.state_hash() == battle.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for battle properties.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing.
pub mod strategies {
    use arena_core::components::{
        AttackProfile, Combatant, DamageCategory, EntityKind, PlayerId, SplashParams,
    };
    use arena_core::math::{Fixed, Vec2Fixed};
    use proptest::prelude::*;

    /// Generate a coordinate inside an 18x32 arena, in quarter tiles.
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (0i32..128i32).prop_map(|quarters| Fixed::from_num(quarters) / Fixed::from_num(4))
    }

    /// Generate a position inside the arena.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate health values (1-3000).
    pub fn arb_health() -> impl Strategy<Value = u32> {
        1u32..3000u32
    }

    /// Generate damage values (1-500).
    pub fn arb_damage() -> impl Strategy<Value = u32> {
        1u32..500u32
    }

    /// Generate a fraction in [0, 1] in hundredths.
    pub fn arb_fraction() -> impl Strategy<Value = Fixed> {
        (0i32..=100i32).prop_map(|n| Fixed::from_num(n) / Fixed::from_num(100))
    }

    /// Generate a damage category.
    pub fn arb_category() -> impl Strategy<Value = DamageCategory> {
        prop_oneof![Just(DamageCategory::Physical), Just(DamageCategory::Spell)]
    }

    /// Generate optional splash parameters.
    pub fn arb_splash() -> impl Strategy<Value = Option<SplashParams>> {
        proptest::option::of((1i32..4i32, arb_fraction(), any::<bool>()).prop_map(
            |(radius, damage_fraction, dropoff)| SplashParams {
                radius: Fixed::from_num(radius),
                damage_fraction,
                dropoff,
            },
        ))
    }

    /// Parameters for a generated combatant.
    #[derive(Debug, Clone)]
    pub struct TestCombatantParams {
        /// Owning player.
        pub owner: PlayerId,
        /// Position.
        pub position: Vec2Fixed,
        /// Maximum hit points.
        pub health: u32,
        /// Shield points.
        pub shield: u32,
        /// Flat armor.
        pub armor: u32,
        /// Attack damage.
        pub damage: u32,
        /// Attack range in tiles.
        pub range: i32,
        /// Damage category.
        pub category: DamageCategory,
        /// Splash payload.
        pub splash: Option<SplashParams>,
    }

    impl TestCombatantParams {
        /// Build the combatant under `id`.
        #[must_use]
        pub fn build(&self, id: u64) -> Combatant {
            Combatant::new(id, self.owner, EntityKind::Unit, self.position, self.health)
                .with_shield(self.shield)
                .with_armor(self.armor)
                .with_walk_speed(Fixed::ONE)
                .with_attack(AttackProfile {
                    can_attack: true,
                    range: Fixed::from_num(self.range),
                    sight_range: Fixed::from_num(self.range + 4),
                    damage: self.damage,
                    category: self.category,
                    cooldown_ticks: 15,
                    splash: self.splash,
                    ..AttackProfile::default()
                })
        }
    }

    /// Generate parameters for one combatant.
    pub fn arb_combatant_params() -> impl Strategy<Value = TestCombatantParams> {
        (
            0u8..2u8,
            arb_vec2_position(),
            arb_health(),
            0u32..200u32,
            0u32..30u32,
            arb_damage(),
            1i32..6i32,
            arb_category(),
            arb_splash(),
        )
            .prop_map(
                |(owner, position, health, shield, armor, damage, range, category, splash)| {
                    TestCombatantParams {
                        owner,
                        position,
                        health,
                        shield,
                        armor,
                        damage,
                        range,
                        category,
                        splash,
                    }
                },
            )
    }

    /// Generate a roster of combatants.
    pub fn arb_roster(max_combatants: usize) -> impl Strategy<Value = Vec<TestCombatantParams>> {
        proptest::collection::vec(arb_combatant_params(), 2..max_combatants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{duel_battle, test_attacker, tile};
    use arena_core::config::BattleConfig;
    use proptest::prelude::*;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_detects_non_determinism() {
        use std::sync::atomic::{AtomicU64, Ordering};

        let counter = AtomicU64::new(0);
        let result = verify_determinism(
            2,
            1,
            || counter.fetch_add(1, Ordering::SeqCst),
            |_| {},
            |n| *n,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 2);
    }

    #[test]
    fn test_empty_battle_determinism() {
        assert!(verify_battle_determinism(
            || Battle::new(BattleConfig::default(), 1).unwrap(),
            100
        ));
    }

    #[test]
    fn test_duel_determinism() {
        assert!(verify_battle_determinism(|| duel_battle(42), 400));
    }

    #[test]
    fn test_no_divergence_in_duel() {
        assert_eq!(find_first_divergence(|| duel_battle(3), 300), None);
    }

    #[test]
    fn test_seed_is_part_of_state_hash() {
        // Crits are off by default, but the RNG position is still hashed.
        let a = duel_battle(1);
        let b = duel_battle(2);
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_parallel_battles_match() {
        run_parallel_battles(|| duel_battle(7), 4, 300).assert_deterministic();
    }

    #[test]
    fn test_snapshot_determinism() {
        assert!(verify_snapshot_determinism(|| duel_battle(11), 150, 200));
    }

    #[test]
    fn test_skirmish_determinism() {
        let setup = || {
            let mut battle = Battle::new(BattleConfig::default(), 5).unwrap();
            for i in 0..5u64 {
                let y = f64::from(u32::try_from(i).unwrap());
                battle
                    .register_combatant(test_attacker(i * 2 + 1, 0, tile(2.0, y), 40, 2))
                    .unwrap();
                battle
                    .register_combatant(test_attacker(i * 2 + 2, 1, tile(6.0, y), 35, 1))
                    .unwrap();
            }
            battle
        };
        verify_determinism(4, 200, setup, |b| {
            b.tick();
        }, |b| b.state_hash())
        .assert_deterministic();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_random_rosters_are_deterministic(roster in strategies::arb_roster(10)) {
            let setup = || {
                let mut battle = Battle::new(BattleConfig::default(), 99).unwrap();
                for (i, params) in roster.iter().enumerate() {
                    battle.register_combatant(params.build(i as u64 + 1)).unwrap();
                }
                battle
            };
            prop_assert_eq!(find_first_divergence(setup, 120), None);
        }
    }
}
