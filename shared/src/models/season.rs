//! Season-dependent planning thresholds

use serde::{Deserialize, Serialize};

/// Thresholds used by the 7-day planner for one season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonConfig {
    pub name: String,
    /// Calendar months (1-12) this season covers
    #[serde(default)]
    pub months: Vec<u32>,
    /// Soil moisture (%) below which the soil is critically dry
    pub critical_moisture: f64,
    /// Soil moisture (%) at or above which no irrigation is needed
    pub ok_moisture: f64,
    /// Weekly water target (mm), rain plus irrigation
    pub target_mm_week: f64,
    /// Daily rainfall (mm) from which the day counts as heavy rain
    pub heavy_rain_mm: f64,
    /// Daily rainfall (mm) from which the day counts as medium rain
    pub medium_rain_mm: f64,
}

impl SeasonConfig {
    pub fn spring() -> Self {
        Self {
            name: "spring_anti_nom".to_string(),
            months: vec![2, 3, 4],
            critical_moisture: 28.0,
            ok_moisture: 40.0,
            target_mm_week: 45.0,
            heavy_rain_mm: 20.0,
            medium_rain_mm: 5.0,
        }
    }

    pub fn summer() -> Self {
        Self {
            name: "summer_fast_reaction".to_string(),
            months: vec![5, 6, 7],
            critical_moisture: 30.0,
            ok_moisture: 45.0,
            target_mm_week: 70.0,
            heavy_rain_mm: 15.0,
            medium_rain_mm: 3.0,
        }
    }

    pub fn fall_winter() -> Self {
        Self {
            name: "fall_winter_saving".to_string(),
            months: vec![8, 9, 10, 11, 12, 1],
            critical_moisture: 25.0,
            ok_moisture: 38.0,
            target_mm_week: 35.0,
            heavy_rain_mm: 12.0,
            medium_rain_mm: 3.0,
        }
    }
}

/// Month-indexed season lookup.
///
/// A month claimed by no season resolves to the last entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonTable {
    pub seasons: Vec<SeasonConfig>,
}

impl SeasonTable {
    pub fn new(seasons: Vec<SeasonConfig>) -> Self {
        Self { seasons }
    }

    pub fn for_month(&self, month: u32) -> &SeasonConfig {
        self.seasons
            .iter()
            .find(|s| s.months.contains(&month))
            .or_else(|| self.seasons.last())
            .unwrap_or_else(|| default_season())
    }

    pub fn by_name(&self, name: &str) -> Option<&SeasonConfig> {
        self.seasons.iter().find(|s| s.name == name)
    }
}

impl Default for SeasonTable {
    fn default() -> Self {
        Self::new(vec![
            SeasonConfig::spring(),
            SeasonConfig::summer(),
            SeasonConfig::fall_winter(),
        ])
    }
}

fn default_season() -> &'static SeasonConfig {
    static FALLBACK: std::sync::OnceLock<SeasonConfig> = std::sync::OnceLock::new();
    FALLBACK.get_or_init(SeasonConfig::fall_winter)
}
