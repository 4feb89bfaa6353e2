//! Great-circle distance and planar bearing between two lat/lon points.

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two points, in meters.
pub fn haversine_distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();
    let delta_phi = phi2 - phi1;

    let a = (0.5 * delta_phi).sin().powi(2)
        + phi1.cos() * phi2.cos() * (0.5 * delta_lambda).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Angle (radians, north = 0, east = pi/2) of the arrow from point 1 to
/// point 2, using a local planar approximation suitable for short segments.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dx = (lon2 - lon1) * lat1.to_radians().cos();
    let dy = lat2 - lat1;
    dx.atan2(dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn haversine_same_point_is_zero() {
        assert_eq!(haversine_distance_meters(45.8, 16.0, 45.8, 16.0), 0.0);
    }

    #[test]
    fn haversine_known_short_distance() {
        // Roughly one degree of longitude near 45.8N is about 78 km.
        let d = haversine_distance_meters(45.8, 16.0, 45.8, 17.0);
        assert!((d - 78_000.0).abs() < 2_000.0, "d={d}");
    }

    #[test]
    fn bearing_due_north_is_zero() {
        let b = bearing(45.0, 16.0, 45.001, 16.0);
        assert!(b.abs() < 1e-9);
    }

    #[test]
    fn bearing_due_east_is_half_pi() {
        let b = bearing(45.0, 16.0, 45.0, 16.001);
        assert!((b - FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn bearing_due_south_is_pi_or_neg_pi() {
        let b = bearing(45.0, 16.0, 44.999, 16.0);
        assert!((b.abs() - PI).abs() < 1e-6);
    }
}
