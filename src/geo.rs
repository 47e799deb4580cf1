use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Earth's mean radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A fully-specified coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    #[schema(example = 23.7808875)]
    pub latitude: f64,
    #[schema(example = 90.2792371)]
    pub longitude: f64,
}

/// Device-reported location as it arrives on the wire. Either coordinate may
/// be absent; a partial location never passes the geofence check.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct ScanLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ScanLocation {
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

/// Great-circle distance between two points via the Haversine formula,
/// in meters.
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Whether the scanned location falls inside the allowed radius around
/// `center`. A location missing either coordinate is never inside.
pub fn is_within_radius(location: &ScanLocation, center: GeoPoint, max_meters: f64) -> bool {
    match location.point() {
        Some(point) => distance_meters(point, center) <= max_meters,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        let p = point(23.7808875, 90.2792371);
        assert_eq!(distance_meters(p, p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = point(23.7808875, 90.2792371);
        let b = point(23.8103, 90.4125);
        let d1 = distance_meters(a, b);
        let d2 = distance_meters(b, a);
        assert!((d1 - d2).abs() < 1e-9);
    }

    #[test]
    fn one_thousandth_degree_longitude_at_equator_is_about_111_meters() {
        let d = distance_meters(point(0.0, 0.0), point(0.0, 0.001));
        assert!((d - 111.19).abs() < 0.5, "got {d}");
    }

    #[test]
    fn geofence_scenario_at_origin() {
        let office = point(0.0, 0.0);

        // ~111 m away, outside a 100 m fence
        let outside = ScanLocation {
            latitude: Some(0.0),
            longitude: Some(0.001),
        };
        assert!(!is_within_radius(&outside, office, 100.0));

        // ~55 m away, inside
        let inside = ScanLocation {
            latitude: Some(0.0),
            longitude: Some(0.0005),
        };
        assert!(is_within_radius(&inside, office, 100.0));
    }

    #[test]
    fn missing_coordinates_are_never_inside() {
        let office = point(0.0, 0.0);
        let missing_lng = ScanLocation {
            latitude: Some(0.0),
            longitude: None,
        };
        let missing_lat = ScanLocation {
            latitude: None,
            longitude: Some(0.0),
        };
        let empty = ScanLocation::default();

        assert!(!is_within_radius(&missing_lng, office, f64::MAX));
        assert!(!is_within_radius(&missing_lat, office, f64::MAX));
        assert!(!is_within_radius(&empty, office, f64::MAX));
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let office = point(0.0, 0.0);
        let loc = ScanLocation {
            latitude: Some(0.0),
            longitude: Some(0.001),
        };
        let d = distance_meters(loc.point().unwrap(), office);
        assert!(is_within_radius(&loc, office, d));
    }
}
