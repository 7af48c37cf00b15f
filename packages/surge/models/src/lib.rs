#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature row contract, surge labels and prediction results.
//!
//! [`FeatureRow`] is the input schema the surge classifier was trained on.
//! Its field names and order are fixed by [`FEATURE_NAMES`]; changing either
//! requires retraining the model.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use surge_geography_models::{Coordinate, ZoneId};
use thiserror::Error;

/// Number of columns in a [`FeatureRow`].
pub const FEATURE_COUNT: usize = 8;

/// Column names of a [`FeatureRow`], in model input order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "pickup_count",
    "od_trip_count",
    "avg_travel_time",
    "avg_speed",
    "hour",
    "dayofweek",
    "is_weekend",
    "is_rush_hour",
];

/// Error returned when a numeric vector cannot be decoded into a
/// [`FeatureRow`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("feature '{name}' has invalid value {value}")]
pub struct FeatureRowError {
    /// Column name.
    pub name: &'static str,
    /// Offending value.
    pub value: f64,
}

/// One row of model input.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Demand estimate at the origin.
    pub pickup_count: f64,
    /// Demand estimate for the origin/destination pair.
    pub od_trip_count: f64,
    /// Average travel time in minutes.
    pub avg_travel_time: f64,
    /// Average speed in km/h.
    pub avg_speed: f64,
    /// Hour of day, 0-23.
    pub hour: u32,
    /// Day of week, Monday = 0 ... Sunday = 6.
    pub dayofweek: u32,
    /// 1 on Saturday and Sunday.
    pub is_weekend: u8,
    /// 1 during rush hour (or when the caller forces peak).
    pub is_rush_hour: u8,
}

impl FeatureRow {
    /// Encodes the row in model input order.
    #[must_use]
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.pickup_count,
            self.od_trip_count,
            self.avg_travel_time,
            self.avg_speed,
            f64::from(self.hour),
            f64::from(self.dayofweek),
            f64::from(self.is_weekend),
            f64::from(self.is_rush_hour),
        ]
    }

    /// Pairs every column name with its value, in model input order.
    #[must_use]
    pub fn named(&self) -> [(&'static str, f64); FEATURE_COUNT] {
        let values = self.to_array();
        std::array::from_fn(|i| (FEATURE_NAMES[i], values[i]))
    }

    /// Decodes a row from model input order.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureRowError`] if a calendar column is not an integer in
    /// range or a flag column is not `0` or `1`.
    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Result<Self, FeatureRowError> {
        Ok(Self {
            pickup_count: values[0],
            od_trip_count: values[1],
            avg_travel_time: values[2],
            avg_speed: values[3],
            hour: decode_int(4, values[4], 23)?,
            dayofweek: decode_int(5, values[5], 6)?,
            is_weekend: decode_flag(6, values[6])?,
            is_rush_hour: decode_flag(7, values[7])?,
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn decode_int(index: usize, value: f64, max: u32) -> Result<u32, FeatureRowError> {
    if value.fract() == 0.0 && (0.0..=f64::from(max)).contains(&value) {
        Ok(value as u32)
    } else {
        Err(FeatureRowError {
            name: FEATURE_NAMES[index],
            value,
        })
    }
}

fn decode_flag(index: usize, value: f64) -> Result<u8, FeatureRowError> {
    decode_int(index, value, 1).map(|v| u8::from(v == 1))
}

/// Decimal places a surge probability is reported with.
pub const PROBABILITY_DECIMALS: i32 = 3;

/// Rounds a probability to [`PROBABILITY_DECIMALS`] places.
#[must_use]
pub fn round_probability(probability: f64) -> f64 {
    let scale = 10_f64.powi(PROBABILITY_DECIMALS);
    (probability * scale).round() / scale
}

/// Probability thresholds for [`SurgeLabel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelBands {
    /// Probabilities at or above this are [`SurgeLabel::VeryBusy`].
    pub very_busy: f64,
    /// Probabilities at or above this (and below `very_busy`) are
    /// [`SurgeLabel::ModeratelyBusy`].
    pub moderately_busy: f64,
}

impl Default for LabelBands {
    fn default() -> Self {
        Self {
            very_busy: 0.75,
            moderately_busy: 0.45,
        }
    }
}

/// Human-readable demand band derived from a surge probability.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum SurgeLabel {
    /// Below the moderate band.
    #[serde(rename = "NOT BUSY")]
    #[strum(serialize = "NOT BUSY")]
    NotBusy,
    /// Between the moderate and very busy thresholds.
    #[serde(rename = "MODERATELY BUSY")]
    #[strum(serialize = "MODERATELY BUSY")]
    ModeratelyBusy,
    /// At or above the very busy threshold.
    #[serde(rename = "VERY BUSY")]
    #[strum(serialize = "VERY BUSY")]
    VeryBusy,
}

impl SurgeLabel {
    /// Maps a probability onto its band.
    ///
    /// The probability is banded as reported, after
    /// [`round_probability`], so `0.7496` (shown as `0.750`) is very busy.
    #[must_use]
    pub fn from_probability(probability: f64, bands: &LabelBands) -> Self {
        let probability = round_probability(probability);
        if probability >= bands.very_busy {
            Self::VeryBusy
        } else if probability >= bands.moderately_busy {
            Self::ModeratelyBusy
        } else {
            Self::NotBusy
        }
    }
}

/// A request location after resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    /// The place name as the caller typed it, if the location was text.
    pub name: Option<String>,
    /// The resolved position.
    pub coordinate: Coordinate,
    /// Nearest zone to `coordinate`.
    pub zone_id: ZoneId,
}

/// Outcome of one surge prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Resolved trip origin.
    pub origin: ResolvedLocation,
    /// Resolved trip destination.
    pub destination: ResolvedLocation,
    /// Positive-class probability, in `[0, 1]`.
    pub surge_probability: f64,
    /// Band for `surge_probability`.
    pub surge_label: SurgeLabel,
    /// Straight-line travel time estimate in minutes.
    pub eta_minutes: f64,
    /// The row that was fed to the model.
    pub features: FeatureRow,
}

impl PredictionResult {
    /// Zone of the trip origin.
    #[must_use]
    pub const fn origin_zone(&self) -> ZoneId {
        self.origin.zone_id
    }

    /// Zone of the trip destination.
    #[must_use]
    pub const fn destination_zone(&self) -> ZoneId {
        self.destination.zone_id
    }
}
