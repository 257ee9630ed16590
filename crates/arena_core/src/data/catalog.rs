//! Unit catalog lookup.

use std::collections::BTreeMap;

use crate::error::{GameError, Result};

use super::UnitStats;

/// All unit definitions available to a battle, keyed by `(type id, level)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitCatalog {
    units: BTreeMap<(String, u8), UnitStats>,
}

impl UnitCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from definitions, validating each one.
    ///
    /// Duplicate `(id, level)` pairs are rejected.
    pub fn from_units(units: impl IntoIterator<Item = UnitStats>) -> Result<Self> {
        let mut catalog = Self::new();
        for unit in units {
            catalog.insert(unit)?;
        }
        Ok(catalog)
    }

    /// Parse a RON list of [`UnitStats`].
    ///
    /// `origin` names the source in error messages.
    pub fn from_ron_str(source: &str, origin: &str) -> Result<Self> {
        let units: Vec<UnitStats> = ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        Self::from_units(units)
    }

    /// Add one definition.
    pub fn insert(&mut self, unit: UnitStats) -> Result<()> {
        unit.validate()?;
        let key = unit.key();
        if self.units.contains_key(&key) {
            return Err(GameError::config(
                format!("{}@{}", key.0, key.1),
                "duplicate catalog entry",
            ));
        }
        self.units.insert(key, unit);
        Ok(())
    }

    /// Look up a definition.
    pub fn get(&self, type_id: &str, level: u8) -> Result<&UnitStats> {
        self.units
            .get(&(type_id.to_string(), level))
            .ok_or_else(|| GameError::UnknownUnitType {
                type_id: type_id.to_string(),
                level,
            })
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Iterate definitions in key order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitStats> {
        self.units.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        UnitStats(
            id: "knight",
            hit_points: 1400,
            walk_speed: 1.0,
            sight_range: 5.5,
            attack: Some(AttackStats(damage: 160, range: 1.2, cooldown_ticks: 24)),
            tags: ["tank"],
        ),
        UnitStats(
            id: "knight",
            level: 2,
            hit_points: 1540,
            walk_speed: 1.0,
            sight_range: 5.5,
            attack: Some(AttackStats(damage: 176, range: 1.2, cooldown_ticks: 24)),
            tags: ["tank"],
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
    ]"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = UnitCatalog::from_ron_str(CATALOG, "units.ron").unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get("knight", 2).unwrap().hit_points, 1540);
        assert!(catalog.get("princess_tower", 1).unwrap().classification().crown_tower);
    }

    #[test]
    fn test_unknown_type_and_level() {
        let catalog = UnitCatalog::from_ron_str(CATALOG, "units.ron").unwrap();
        assert!(matches!(
            catalog.get("knight", 9),
            Err(GameError::UnknownUnitType { level: 9, .. })
        ));
        assert!(catalog.get("giant", 1).is_err());
    }

    #[test]
    fn test_duplicate_entries_rejected() {
        let catalog = UnitCatalog::from_ron_str(CATALOG, "units.ron").unwrap();
        let knight = catalog.get("knight", 1).unwrap().clone();
        let err = UnitCatalog::from_units(vec![knight.clone(), knight]).unwrap_err();
        assert!(matches!(err, GameError::InvalidConfig { .. }));
    }

    #[test]
    fn test_parse_error_carries_origin() {
        let err = UnitCatalog::from_ron_str("[UnitStats(id: 3)]", "broken.ron").unwrap_err();
        assert!(matches!(err, GameError::DataParseError { ref path, .. } if path == "broken.ron"));
    }
}
