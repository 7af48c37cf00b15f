//! Request locations before resolution.

use surge_geography_models::{Coordinate, CoordinateError};

use crate::PredictError;

/// A trip endpoint as the caller supplied it.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    /// Explicit coordinates.
    Coordinate(Coordinate),
    /// Free-text place name, to be geocoded.
    Place(String),
}

impl LocationQuery {
    /// Validates explicit coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`PredictError::InvalidRequest`] if either component is out
    /// of range.
    pub fn from_coordinate(latitude: f64, longitude: f64) -> Result<Self, PredictError> {
        Coordinate::new(latitude, longitude)
            .map(Self::Coordinate)
            .map_err(PredictError::from)
    }

    /// Parses a text field. `"<lat>,<lon>"` is a coordinate; anything else
    /// is a place name.
    ///
    /// # Errors
    ///
    /// Returns [`PredictError::InvalidRequest`] for blank input or a
    /// numeric pair that is out of range.
    pub fn parse(input: &str) -> Result<Self, PredictError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(PredictError::InvalidRequest {
                message: "location must not be empty".to_string(),
            });
        }

        match text.parse::<Coordinate>() {
            Ok(coordinate) => Ok(Self::Coordinate(coordinate)),
            Err(CoordinateError::Syntax(_)) => Ok(Self::Place(text.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// The place name, if this is a text location.
    #[must_use]
    pub fn place_name(&self) -> Option<&str> {
        match self {
            Self::Coordinate(_) => None,
            Self::Place(name) => Some(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_strings_are_coordinates() {
        assert_eq!(
            LocationQuery::parse(" 40.7589, -73.9851 ").unwrap(),
            LocationQuery::Coordinate(Coordinate {
                latitude: 40.7589,
                longitude: -73.9851
            })
        );
    }

    #[test]
    fn text_is_a_place() {
        let query = LocationQuery::parse("  JFK Airport ").unwrap();
        assert_eq!(query, LocationQuery::Place("JFK Airport".to_string()));
        assert_eq!(query.place_name(), Some("JFK Airport"));
        assert_eq!(
            LocationQuery::parse("Paris, France").unwrap(),
            LocationQuery::Place("Paris, France".to_string())
        );
    }

    #[test]
    fn out_of_range_pair_is_rejected() {
        assert!(matches!(
            LocationQuery::parse("95.0,10.0"),
            Err(PredictError::InvalidRequest { .. })
        ));
        assert!(matches!(
            LocationQuery::from_coordinate(40.0, -200.0),
            Err(PredictError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn blank_is_rejected() {
        assert!(matches!(
            LocationQuery::parse("   "),
            Err(PredictError::InvalidRequest { .. })
        ));
    }
}
