use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle (haversine) distance to `other`, in meters.
    pub fn distance_m(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let sin_dlat = (dlat * 0.5).sin();
        let sin_dlon = (dlon * 0.5).sin();
        let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
        let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

        EARTH_RADIUS_M * c
    }
}

/// A coordinate pair with an optional human-readable label.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Place {
    pub coordinates: Coordinates,
    #[serde(default)]
    pub label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance() {
        let point = Coordinates::new(12.90, 77.59);

        assert_eq!(point.distance_m(&point), 0.0);
    }

    #[test]
    fn city_scale_distance() {
        // pickup/drop pair from central Bengaluru, roughly 4km apart
        let pickup = Coordinates::new(12.90, 77.59);
        let drop = Coordinates::new(12.93, 77.61);

        let distance = pickup.distance_m(&drop);

        assert!(distance > 3900.0 && distance < 4050.0, "got {}", distance);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Coordinates::new(12.9716, 77.5946);
        let b = Coordinates::new(13.0827, 80.2707);

        let forward = a.distance_m(&b);
        let backward = b.distance_m(&a);

        assert!((forward - backward).abs() < 1e-6);
    }
}
