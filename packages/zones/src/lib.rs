#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory zone centroid index.
//!
//! Loads the zone reference table once at startup and assigns coordinates
//! to the zone whose centroid is nearest by squared Euclidean distance in
//! degree space. The zone set is small (tens to low thousands of rows), so
//! lookups are an exhaustive scan.
//!
//! Equidistant zones resolve to the lowest `zone_id`, independent of the
//! order rows appear in the table.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use surge_geography_models::{Coordinate, CoordinateError, Zone, ZoneId};
use thiserror::Error;

/// Columns the zone table must contain, and nothing else.
pub const REQUIRED_COLUMNS: [&str; 3] = ["zone_id", "lat", "lon"];

/// Errors from loading or building a [`ZoneIndex`].
///
/// All of these are configuration errors: the service cannot start without
/// a valid zone table.
#[derive(Debug, Error)]
pub enum ZoneIndexError {
    /// The zone table could not be read.
    #[error("failed to read zone table {path}: {source}")]
    Io {
        /// Path that was being opened.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// CSV decoding failed.
    #[error("malformed zone table: {0}")]
    Csv(#[from] csv::Error),

    /// Header row does not consist of exactly the required columns.
    #[error("zone table must contain exactly the columns zone_id, lat, lon (found: {found})")]
    Schema {
        /// Comma-joined header row that was found.
        found: String,
    },

    /// A zone id appears more than once.
    #[error("duplicate zone_id {0} in zone table")]
    DuplicateZone(ZoneId),

    /// A centroid is outside the valid coordinate range.
    #[error("zone {zone_id} has an invalid centroid: {source}")]
    InvalidCentroid {
        /// Zone with the bad centroid.
        zone_id: ZoneId,
        /// What was wrong with it.
        source: CoordinateError,
    },

    /// The zone set is empty.
    #[error("zone table contains no zones")]
    Empty,
}

/// Immutable set of zone centroids.
///
/// Invariant: non-empty, sorted by `zone_id`, ids unique.
#[derive(Debug, Clone)]
pub struct ZoneIndex {
    zones: Vec<Zone>,
}

impl ZoneIndex {
    /// Builds an index from a set of zones.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneIndexError::Empty`] for an empty set,
    /// [`ZoneIndexError::DuplicateZone`] if an id repeats, and
    /// [`ZoneIndexError::InvalidCentroid`] for out-of-range centroids.
    pub fn new(mut zones: Vec<Zone>) -> Result<Self, ZoneIndexError> {
        if zones.is_empty() {
            return Err(ZoneIndexError::Empty);
        }

        let mut seen = BTreeSet::new();
        for zone in &zones {
            if !seen.insert(zone.zone_id) {
                return Err(ZoneIndexError::DuplicateZone(zone.zone_id));
            }
            zone.centroid()
                .validate()
                .map_err(|source| ZoneIndexError::InvalidCentroid {
                    zone_id: zone.zone_id,
                    source,
                })?;
        }

        zones.sort_by_key(|z| z.zone_id);
        Ok(Self { zones })
    }

    /// Loads the zone table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneIndexError`] if the file cannot be read, its header is
    /// not exactly `zone_id,lat,lon` (any order), a row fails to parse, or
    /// the resulting zone set is invalid.
    pub fn load_csv(path: &Path) -> Result<Self, ZoneIndexError> {
        let file = std::fs::File::open(path).map_err(|source| ZoneIndexError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let index = Self::from_reader(file)?;
        log::info!(
            "Loaded {} zones from {}",
            index.zones.len(),
            path.display()
        );
        Ok(index)
    }

    /// Reads the zone table from any CSV source.
    ///
    /// # Errors
    ///
    /// See [`Self::load_csv`].
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ZoneIndexError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let headers = rdr.headers()?.clone();
        let found: BTreeSet<&str> = headers.iter().collect();
        let expected: BTreeSet<&str> = REQUIRED_COLUMNS.into_iter().collect();
        if headers.len() != REQUIRED_COLUMNS.len() || found != expected {
            return Err(ZoneIndexError::Schema {
                found: headers.iter().collect::<Vec<_>>().join(","),
            });
        }

        let zones = rdr
            .deserialize::<Zone>()
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(zones)
    }

    /// All zones, sorted by id.
    #[must_use]
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Looks up a zone by id.
    #[must_use]
    pub fn get(&self, zone_id: ZoneId) -> Option<&Zone> {
        self.zones
            .binary_search_by_key(&zone_id, |z| z.zone_id)
            .ok()
            .map(|i| &self.zones[i])
    }

    /// Returns the zone whose centroid is nearest to `point`.
    ///
    /// Ties go to the lowest `zone_id`.
    #[must_use]
    pub fn nearest(&self, point: &Coordinate) -> &Zone {
        let mut best = &self.zones[0];
        let mut best_distance = best.centroid().squared_distance(point);

        for zone in &self.zones[1..] {
            let distance = zone.centroid().squared_distance(point);
            if distance < best_distance {
                best = zone;
                best_distance = distance;
            }
        }

        best
    }

    /// Returns the id of the zone nearest to `(latitude, longitude)`.
    #[must_use]
    pub fn nearest_zone(&self, latitude: f64, longitude: f64) -> ZoneId {
        self.nearest(&Coordinate {
            latitude,
            longitude,
        })
        .zone_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMES_SQUARE: Zone = Zone {
        zone_id: 1,
        latitude: 40.7580,
        longitude: -73.9855,
    };
    const JFK: Zone = Zone {
        zone_id: 2,
        latitude: 40.6413,
        longitude: -73.7781,
    };

    fn grid_zones() -> Vec<Zone> {
        let mut zones = Vec::new();
        let mut id = 100;
        for i in 0..6 {
            for j in 0..6 {
                zones.push(Zone {
                    zone_id: id,
                    latitude: 40.5 + f64::from(i) * 0.07,
                    longitude: -74.1 + f64::from(j) * 0.09,
                });
                id += 1;
            }
        }
        zones
    }

    #[test]
    fn times_square_and_jfk() {
        let index = ZoneIndex::new(vec![TIMES_SQUARE, JFK]).unwrap();
        assert_eq!(index.nearest_zone(40.7589, -73.9851), 1);
        assert_eq!(index.nearest_zone(40.6400, -73.7800), 2);
    }

    #[test]
    fn nearest_is_member_and_minimal() {
        let index = ZoneIndex::new(grid_zones()).unwrap();

        for step_lat in 0..25 {
            for step_lon in 0..25 {
                let query = Coordinate {
                    latitude: 40.4 + f64::from(step_lat) * 0.025,
                    longitude: -74.2 + f64::from(step_lon) * 0.03,
                };
                let found = index.nearest(&query);
                assert!(index.get(found.zone_id).is_some());

                let found_distance = found.centroid().squared_distance(&query);
                for other in index.zones() {
                    assert!(
                        other.centroid().squared_distance(&query) >= found_distance,
                        "zone {} is closer to {query:?} than {}",
                        other.zone_id,
                        found.zone_id
                    );
                }
            }
        }
    }

    #[test]
    fn ties_go_to_lowest_zone_id_regardless_of_order() {
        let west = Zone {
            zone_id: 7,
            latitude: 0.0,
            longitude: -1.0,
        };
        let east = Zone {
            zone_id: 3,
            latitude: 0.0,
            longitude: 1.0,
        };

        let forward = ZoneIndex::new(vec![west, east]).unwrap();
        let reverse = ZoneIndex::new(vec![east, west]).unwrap();

        for _ in 0..3 {
            assert_eq!(forward.nearest_zone(0.0, 0.0), 3);
            assert_eq!(reverse.nearest_zone(0.0, 0.0), 3);
        }
    }

    #[test]
    fn empty_zone_set_is_rejected() {
        assert!(matches!(ZoneIndex::new(vec![]), Err(ZoneIndexError::Empty)));
    }

    #[test]
    fn duplicate_zone_is_rejected() {
        let result = ZoneIndex::new(vec![TIMES_SQUARE, TIMES_SQUARE]);
        assert!(matches!(result, Err(ZoneIndexError::DuplicateZone(1))));
    }

    #[test]
    fn invalid_centroid_is_rejected() {
        let bad = Zone {
            zone_id: 9,
            latitude: 140.0,
            longitude: 0.0,
        };
        assert!(matches!(
            ZoneIndex::new(vec![bad]),
            Err(ZoneIndexError::InvalidCentroid { zone_id: 9, .. })
        ));
    }

    #[test]
    fn loads_csv_in_any_column_order() {
        let csv = "lon,zone_id,lat\n-73.7781,2,40.6413\n-73.9855,1,40.7580\n";
        let index = ZoneIndex::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(index.zones().len(), 2);
        assert_eq!(index.zones()[0].zone_id, 1);
        assert_eq!(index.nearest_zone(40.7589, -73.9851), 1);
    }

    #[test]
    fn csv_with_extra_column_is_rejected() {
        let csv = "zone_id,lat,lon,borough\n1,40.7580,-73.9855,Manhattan\n";
        let err = ZoneIndex::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ZoneIndexError::Schema { ref found } if found.contains("borough")));
    }

    #[test]
    fn csv_with_missing_column_is_rejected() {
        let csv = "zone_id,lat\n1,40.7580\n";
        assert!(matches!(
            ZoneIndex::from_reader(csv.as_bytes()),
            Err(ZoneIndexError::Schema { .. })
        ));
    }

    #[test]
    fn csv_with_bad_row_is_rejected() {
        let csv = "zone_id,lat,lon\n1,forty,-73.9855\n";
        assert!(matches!(
            ZoneIndex::from_reader(csv.as_bytes()),
            Err(ZoneIndexError::Csv(_))
        ));
    }

    #[test]
    fn header_only_csv_is_empty() {
        let csv = "zone_id,lat,lon\n";
        assert!(matches!(
            ZoneIndex::from_reader(csv.as_bytes()),
            Err(ZoneIndexError::Empty)
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ZoneIndex::load_csv(Path::new("/nonexistent/zone_centroids.csv")).unwrap_err();
        assert!(matches!(err, ZoneIndexError::Io { .. }));
    }
}
