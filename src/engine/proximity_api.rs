use super::Engine;

use async_trait::async_trait;
use std::cmp::Ordering;

use crate::{
    api::ProximityAPI,
    entities::{Coordinates, DriverPresence},
};

#[async_trait]
impl ProximityAPI for Engine {
    /// Linear scan over the current snapshot; fine at the expected driver
    /// count, and the contract leaves room for an index-backed replacement.
    #[tracing::instrument(skip(self))]
    async fn nearby(
        &self,
        origin: Coordinates,
        radius_m: f64,
        vehicle_type: Option<&str>,
    ) -> Vec<(DriverPresence, f64)> {
        let drivers = self.drivers.read().await;

        let mut matches: Vec<(DriverPresence, f64)> = drivers
            .values()
            .filter(|presence| presence.is_online)
            .filter(|presence| match vehicle_type {
                Some(wanted) => presence.vehicle_type == wanted,
                None => true,
            })
            .filter_map(|presence| {
                let distance = origin.distance_m(&presence.location);

                if distance <= radius_m {
                    Some((presence.clone(), distance))
                } else {
                    None
                }
            })
            .collect();

        // equal distances break by driver id for a deterministic order
        matches.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.driver_id.cmp(&b.0.driver_id))
        });

        matches
    }
}
