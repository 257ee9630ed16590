//! # Arena Core
//!
//! Deterministic battle simulation for a real-time arena game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math in the simulation (uses fixed-point)
//!
//! This separation enables:
//! - Authoritative server simulation
//! - Headless batch runs
//! - Snapshot and hash based desync detection
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`components`] - Combatant data model
//! - [`targeting`] - Target scoring and selection
//! - [`combat`] - Damage pipeline, splash, projectiles and status effects
//! - [`unit`] - Per-combatant state machine
//! - [`scheduler`] - The fixed-tick battle loop
//! - [`data`] - Unit catalog loaded from RON
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod components;
pub mod config;
pub mod data;
pub mod error;
pub mod math;
pub mod pacing;
pub mod projectile;
pub mod registry;
pub mod rng;
pub mod scheduler;
pub mod setup;
pub mod targeting;
pub mod unit;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::combat::{AttackIntent, CombatEngine, CombatResult, DeathEvent, TargetHit};
    pub use crate::components::*;
    pub use crate::config::{BattleConfig, CombatConfig, TargetingConfig};
    pub use crate::data::{UnitCatalog, UnitStats};
    pub use crate::error::{GameError, Result};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::pacing::{DriftPolicy, DriftReport, DriftTracker};
    pub use crate::registry::BattleWorld;
    pub use crate::scheduler::{Battle, BattleOutcome, DeathListener, OutcomeReason, TickReport};
    pub use crate::setup::{BattleSetup, Deployment, Placement};
    pub use crate::targeting::{TargetReason, TargetingDecision, TargetingEngine};
    pub use crate::unit::{CombatInfo, UnitSimulation, UnitState};
}
