// src/models/region.rs

//! Region and city reference data for the search region filter.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const BUILTIN_REGIONS: &str = include_str!("../../data/regions.toml");

/// A city within a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub code: String,
}

/// A top-level administrative region (province, municipality, "海外", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub cities: Vec<City>,
}

/// Read-only region catalog, iterated in file order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionCatalog {
    #[serde(rename = "region")]
    regions: Vec<Region>,
}

impl RegionCatalog {
    /// Parse a catalog from TOML text (`[[region]]` tables).
    pub fn from_toml(text: &str) -> Result<Self> {
        let catalog: Self = toml::from_str(text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// The catalog shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_REGIONS)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Resolve configured region names, keeping catalog order.
    pub fn select(&self, names: &[String]) -> Result<Vec<Region>> {
        if let Some(unknown) = names.iter().find(|n| self.get(n).is_none()) {
            return Err(AppError::config(format!("Unknown region '{unknown}'")));
        }
        Ok(self
            .regions
            .iter()
            .filter(|r| names.contains(&r.name))
            .cloned()
            .collect())
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for region in &self.regions {
            if region.code.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "Region '{}' has no code",
                    region.name
                )));
            }
            if !seen.insert(region.name.as_str()) {
                return Err(AppError::validation(format!(
                    "Duplicate region '{}'",
                    region.name
                )));
            }
        }
        Ok(())
    }
}
