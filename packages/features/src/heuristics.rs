//! The versioned demand heuristic table.
//!
//! Every number the feature builder uses lives in a
//! [`DemandHeuristicConfig`]. The default table is embedded from
//! `heuristics/v1.toml`; a file with the same schema can replace it at
//! startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};
use surge_models::LabelBands;
use thiserror::Error;

const V1_TOML: &str = include_str!("../heuristics/v1.toml");

/// Errors loading a heuristic table.
#[derive(Debug, Error)]
pub enum HeuristicConfigError {
    /// The override file could not be read.
    #[error("failed to read heuristic config {}: {source}", path.display())]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("invalid heuristic config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The table parsed but its values are inconsistent.
    #[error("invalid heuristic config: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

/// How `pickup_count` and `od_trip_count` are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CountsMode {
    /// Always zero.
    Placeholder,
    /// Keyword match on the place name.
    Lexical,
}

/// How a derived column (`avg_speed`, `avg_travel_time`) is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleMode {
    /// Always zero.
    Placeholder,
    /// Computed from the configured rule.
    Rule,
}

/// One keyword tier of the lexical demand heuristic.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DemandTier {
    /// Tier name, for logging.
    pub name: String,
    /// Count assigned when a word matches.
    pub value: f64,
    /// Lowercase words matched as substrings of the place name.
    pub words: Vec<String>,
}

/// Demand count settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CountsConfig {
    /// Derivation mode.
    pub mode: CountsMode,
    /// Count for names matching no tier, and for coordinate inputs.
    pub default_value: f64,
    /// Tiers, checked in order; the first match wins.
    pub tiers: Vec<DemandTier>,
}

/// Average speed rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeedConfig {
    /// Derivation mode.
    pub mode: RuleMode,
    /// Speed before penalties, km/h.
    pub base_kmh: f64,
    /// Subtracted during rush hour.
    pub rush_penalty_kmh: f64,
    /// Subtracted in adverse weather.
    pub adverse_weather_penalty_kmh: f64,
    /// Lower bound of the result.
    pub floor_kmh: f64,
}

/// Average travel time rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TravelTimeConfig {
    /// Derivation mode.
    pub mode: RuleMode,
    /// `pickup_count` strictly above this selects `busy_minutes`.
    pub busy_pickup_threshold: f64,
    /// Travel time for busy origins.
    pub busy_minutes: f64,
    /// Travel time otherwise.
    pub normal_minutes: f64,
}

/// The complete heuristic table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DemandHeuristicConfig {
    /// Table version, e.g. `"v1"`.
    pub version: String,
    /// Hours of day (0-23) that count as rush hour.
    pub rush_hours: Vec<u32>,
    /// Probability bands for labels.
    pub label_bands: LabelBands,
    /// Demand count settings.
    pub counts: CountsConfig,
    /// Average speed rule.
    pub speed: SpeedConfig,
    /// Average travel time rule.
    pub travel_time: TravelTimeConfig,
}

impl DemandHeuristicConfig {
    /// The embedded `v1` table.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (caught by the tests below).
    #[must_use]
    pub fn v1() -> Self {
        Self::from_toml_str(V1_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded heuristic table v1: {e}"))
    }

    /// Parses and validates a table.
    ///
    /// # Errors
    ///
    /// Returns [`HeuristicConfigError`] if the TOML is malformed or the
    /// values are inconsistent.
    pub fn from_toml_str(s: &str) -> Result<Self, HeuristicConfigError> {
        let config: Self = toml::de::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a table from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HeuristicConfigError`] if the file cannot be read or is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, HeuristicConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| HeuristicConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        log::info!(
            "Loaded heuristic table {} from {}",
            config.version,
            path.display()
        );
        Ok(config)
    }

    /// Reads `path` if given, otherwise returns [`Self::v1`].
    ///
    /// # Errors
    ///
    /// Returns [`HeuristicConfigError`] if the override cannot be loaded.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, HeuristicConfigError> {
        path.map_or_else(|| Ok(Self::v1()), Self::load)
    }

    /// Returns `true` if `hour` is configured as rush hour.
    #[must_use]
    pub fn is_rush_hour(&self, hour: u32) -> bool {
        self.rush_hours.contains(&hour)
    }

    fn validate(&self) -> Result<(), HeuristicConfigError> {
        let invalid = |message: String| Err(HeuristicConfigError::Invalid { message });

        if self.version.trim().is_empty() {
            return invalid("version must not be empty".to_string());
        }
        if let Some(hour) = self.rush_hours.iter().find(|h| **h > 23) {
            return invalid(format!("rush hour {hour} is not in 0-23"));
        }

        let bands = &self.label_bands;
        if !(0.0..=1.0).contains(&bands.moderately_busy)
            || !(0.0..=1.0).contains(&bands.very_busy)
            || bands.moderately_busy > bands.very_busy
        {
            return invalid(format!(
                "label bands must satisfy 0 <= moderately_busy ({}) <= very_busy ({}) <= 1",
                bands.moderately_busy, bands.very_busy
            ));
        }

        for tier in &self.counts.tiers {
            if tier.words.iter().any(|w| w.trim().is_empty()) {
                return invalid(format!("tier '{}' contains an empty word", tier.name));
            }
        }

        let numbers = [
            ("counts.default_value", self.counts.default_value),
            ("speed.base_kmh", self.speed.base_kmh),
            ("speed.rush_penalty_kmh", self.speed.rush_penalty_kmh),
            (
                "speed.adverse_weather_penalty_kmh",
                self.speed.adverse_weather_penalty_kmh,
            ),
            ("speed.floor_kmh", self.speed.floor_kmh),
            ("travel_time.busy_minutes", self.travel_time.busy_minutes),
            ("travel_time.normal_minutes", self.travel_time.normal_minutes),
        ];
        let tier_values = self
            .counts
            .tiers
            .iter()
            .map(|t| ("counts.tiers.value", t.value));
        for (name, value) in numbers.into_iter().chain(tier_values) {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("{name} must be a non-negative number, got {value}"));
            }
        }

        if self.speed.floor_kmh <= 0.0 {
            return invalid(format!(
                "speed.floor_kmh must be positive, got {}",
                self.speed.floor_kmh
            ));
        }

        Ok(())
    }
}

impl Default for DemandHeuristicConfig {
    fn default() -> Self {
        Self::v1()
    }
}
