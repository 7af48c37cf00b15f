#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Builds the model's [`FeatureRow`] for a trip.
//!
//! Calendar columns come from the request timestamp. Demand, speed and
//! travel-time columns come from the [`DemandHeuristicConfig`]; in its
//! default (`placeholder`) modes they are zero, matching the rows the
//! shipped model was trained on.

pub mod heuristics;
pub mod timestamp;

use chrono::{Datelike, NaiveDateTime, Timelike};
use surge_models::FeatureRow;
use surge_weather::WeatherCondition;

pub use heuristics::{
    CountsConfig, CountsMode, DemandHeuristicConfig, DemandTier, HeuristicConfigError, RuleMode,
    SpeedConfig, TravelTimeConfig,
};
pub use timestamp::{TimestampError, now_utc, parse_timestamp};

/// Everything the builder needs to know about one trip.
#[derive(Debug, Clone, Copy)]
pub struct TripContext<'a> {
    /// Wall-clock time of the trip.
    pub timestamp: NaiveDateTime,
    /// Origin place name, `None` for coordinate input.
    pub origin_name: Option<&'a str>,
    /// Destination place name, `None` for coordinate input.
    pub destination_name: Option<&'a str>,
    /// Weather at the origin.
    pub weather: WeatherCondition,
    /// Caller's peak/off-peak toggle; overrides the rush hour table.
    pub peak: Option<bool>,
}

/// Calendar columns of a [`FeatureRow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFlags {
    /// Hour of day, 0-23.
    pub hour: u32,
    /// Monday = 0 ... Sunday = 6.
    pub dayofweek: u32,
    /// 1 on Saturday and Sunday.
    pub is_weekend: u8,
    /// 1 during rush hour.
    pub is_rush_hour: u8,
}

/// Derives [`FeatureRow`]s from a [`DemandHeuristicConfig`].
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    config: DemandHeuristicConfig,
}

impl FeatureBuilder {
    /// Creates a builder over `config`.
    #[must_use]
    pub const fn new(config: DemandHeuristicConfig) -> Self {
        Self { config }
    }

    /// The heuristic table in use.
    #[must_use]
    pub const fn config(&self) -> &DemandHeuristicConfig {
        &self.config
    }

    /// Builds the feature row for `trip`. Never fails.
    #[must_use]
    pub fn build(&self, trip: &TripContext<'_>) -> FeatureRow {
        let calendar = self.calendar(trip.timestamp, trip.peak);
        let pickup_count = self.demand_count(trip.origin_name);
        let od_trip_count = self.demand_count(trip.destination_name);

        let row = FeatureRow {
            pickup_count,
            od_trip_count,
            avg_travel_time: self.travel_time(pickup_count),
            avg_speed: self.speed(calendar.is_rush_hour == 1, trip.weather),
            hour: calendar.hour,
            dayofweek: calendar.dayofweek,
            is_weekend: calendar.is_weekend,
            is_rush_hour: calendar.is_rush_hour,
        };
        log::trace!("Built feature row {row:?} for {trip:?}");
        row
    }

    /// Calendar columns for `timestamp`. `peak`, when present, replaces
    /// the rush hour table.
    #[must_use]
    pub fn calendar(&self, timestamp: NaiveDateTime, peak: Option<bool>) -> CalendarFlags {
        let hour = timestamp.hour();
        let dayofweek = timestamp.weekday().num_days_from_monday();
        let rush = peak.unwrap_or_else(|| self.config.is_rush_hour(hour));
        CalendarFlags {
            hour,
            dayofweek,
            is_weekend: u8::from(dayofweek >= 5),
            is_rush_hour: u8::from(rush),
        }
    }

    /// Demand count for a place name.
    ///
    /// In lexical mode the name is matched case-insensitively against each
    /// tier's words in order; coordinate input (`None`) and names matching
    /// no tier get the default value.
    #[must_use]
    pub fn demand_count(&self, name: Option<&str>) -> f64 {
        let counts = &self.config.counts;
        match counts.mode {
            CountsMode::Placeholder => 0.0,
            CountsMode::Lexical => {
                let Some(name) = name else {
                    return counts.default_value;
                };
                let name = name.to_lowercase();
                counts
                    .tiers
                    .iter()
                    .find(|tier| {
                        tier.words
                            .iter()
                            .any(|word| name.contains(word.to_lowercase().as_str()))
                    })
                    .map_or(counts.default_value, |tier| tier.value)
            }
        }
    }

    /// The `avg_speed` column: zero in placeholder mode, otherwise
    /// [`Self::rule_speed`].
    #[must_use]
    pub fn speed(&self, rush_hour: bool, weather: WeatherCondition) -> f64 {
        match self.config.speed.mode {
            RuleMode::Placeholder => 0.0,
            RuleMode::Rule => self.rule_speed(rush_hour, weather),
        }
    }

    /// Speed from the speed rule in km/h, regardless of mode. Always at
    /// least the configured floor, which is positive.
    #[must_use]
    pub fn rule_speed(&self, rush_hour: bool, weather: WeatherCondition) -> f64 {
        let speed = &self.config.speed;
        let mut kmh = speed.base_kmh;
        if rush_hour {
            kmh -= speed.rush_penalty_kmh;
        }
        if weather.is_adverse() {
            kmh -= speed.adverse_weather_penalty_kmh;
        }
        kmh.max(speed.floor_kmh)
    }

    /// Average travel time in minutes.
    #[must_use]
    pub fn travel_time(&self, pickup_count: f64) -> f64 {
        let rule = &self.config.travel_time;
        match rule.mode {
            RuleMode::Placeholder => 0.0,
            RuleMode::Rule => {
                if pickup_count > rule.busy_pickup_threshold {
                    rule.busy_minutes
                } else {
                    rule.normal_minutes
                }
            }
        }
    }
}
