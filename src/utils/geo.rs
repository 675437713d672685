// src/utils/geo.rs
use crate::models::trip::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points in kilometers (haversine).
/// Pure and symmetric; identical points yield zero.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_points_are_zero() {
        let p = GeoPoint::new(35.2137, 31.7683);
        assert!(distance_km(p, p).abs() < 1e-6);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = GeoPoint::new(35.2137, 31.7683);
        let b = GeoPoint::new(35.5018, 33.8938);
        assert!((distance_km(a, b) - distance_km(b, a)).abs() < 1e-6);
    }

    #[test]
    fn test_known_distance() {
        // One degree of latitude is roughly 111.19 km.
        let a = GeoPoint::new(35.0, 31.0);
        let b = GeoPoint::new(35.0, 32.0);
        let d = distance_km(a, b);
        assert!((d - 111.19).abs() < 0.1, "got {}", d);
    }
}
