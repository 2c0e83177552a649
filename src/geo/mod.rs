use crate::models::location::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;
const KM_PER_MILE: f64 = 1.609_344;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn haversine_miles(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_km(a, b) / KM_PER_MILE
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, haversine_miles};
    use crate::models::location::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint::new(44.9778, -93.2650);
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint::new(51.5074, -0.1278);
        let paris = GeoPoint::new(48.8566, 2.3522);
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn minneapolis_to_saint_paul_is_around_8_miles() {
        let minneapolis = GeoPoint::new(44.9778, -93.2650);
        let saint_paul = GeoPoint::new(44.9537, -93.0900);
        let distance = haversine_miles(&minneapolis, &saint_paul);
        assert!((distance - 8.6).abs() < 0.5);
    }
}
