//! Static unit data keyed by type identifier and upgrade level.
//!
//! The catalog is content owned outside the battle core. This module only
//! defines the data shapes and parses them from RON text; reading files is
//! left to the front ends.

mod catalog;
mod unit_stats;

pub use catalog::UnitCatalog;
pub use unit_stats::{AttackStats, ProjectileStats, SplashStats, UnitStats};
