use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius used by the spherical model.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("Invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },
}

/// A point on the map, in degrees.
///
/// Accepts both `{lat, lng}` and `{latitude, longitude}` on input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Coordinates {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns self if both components are finite and within range.
    pub fn validated(self) -> Result<Self, GeoError> {
        let valid = self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng);

        if valid {
            Ok(self)
        } else {
            Err(GeoError::InvalidCoordinate {
                lat: self.lat,
                lng: self.lng,
            })
        }
    }

    pub fn distance_km_to(&self, other: &Coordinates) -> Result<f64, GeoError> {
        distance_km(self.lat, self.lng, other.lat, other.lng)
    }
}

/// Great-circle distance between two coordinates in kilometers.
///
/// Uses the haversine formula on a spherical Earth. Fails with
/// `InvalidCoordinate` for NaN, infinite or out-of-range input.
pub fn distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> Result<f64, GeoError> {
    Coordinates::new(lat1, lng1).validated()?;
    Coordinates::new(lat2, lng2).validated()?;

    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    Ok(EARTH_RADIUS_KM * c)
}

/// Round a distance to two decimals (10 m), the precision stored on matches.
pub fn round_km(distance: f64) -> f64 {
    (distance * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_between_nearby_points() {
        let d = distance_km(1.3000, 103.8000, 1.3010, 103.8005).unwrap();
        assert_eq!(round_km(d), 0.12);
    }

    #[test]
    fn test_distance_minneapolis_to_st_paul() {
        let d = distance_km(44.98, -93.27, 44.95, -93.09).unwrap();
        assert!(d > 14.0 && d < 16.0, "got {}", d);
    }

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(distance_km(44.98, -93.27, 44.98, -93.27).unwrap(), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = distance_km(0.0, 0.0, 1.0, 0.0).unwrap();
        assert!((d - 111.19).abs() < 0.01, "got {}", d);
    }

    #[test]
    fn test_rejects_out_of_range_latitude() {
        let err = distance_km(91.0, 0.0, 0.0, 0.0).unwrap_err();
        assert_eq!(err, GeoError::InvalidCoordinate { lat: 91.0, lng: 0.0 });
    }

    #[test]
    fn test_rejects_out_of_range_longitude() {
        assert!(distance_km(0.0, 0.0, 0.0, -180.5).is_err());
    }

    #[test]
    fn test_rejects_non_finite_input() {
        assert!(distance_km(f64::NAN, 0.0, 0.0, 0.0).is_err());
        assert!(distance_km(0.0, f64::INFINITY, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_round_km() {
        assert_eq!(round_km(0.12431), 0.12);
        assert_eq!(round_km(5.004), 5.0);
        assert_eq!(round_km(5.006), 5.01);
    }

    #[test]
    fn test_coordinates_accept_long_field_names() {
        let c: Coordinates = serde_json::from_str(r#"{"latitude": 1.5, "longitude": 2.5}"#).unwrap();
        assert_eq!(c, Coordinates::new(1.5, 2.5));

        let c: Coordinates = serde_json::from_str(r#"{"lat": 1.5, "lng": 2.5}"#).unwrap();
        assert_eq!(c, Coordinates::new(1.5, 2.5));
    }
}
