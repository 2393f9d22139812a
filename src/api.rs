use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::entities::{ConnectionId, Coordinates, DriverPresence, DriverStatus, Place, RideRequest};
use crate::error::Error;
use crate::fanout::Envelope;

/// Registry of currently-connected drivers. Mutations on unknown drivers are
/// lenient no-ops (returning false) since late events from an already-swept
/// session are expected.
#[async_trait]
pub trait PresenceAPI {
    async fn register_driver(
        &self,
        driver_id: String,
        name: String,
        location: Coordinates,
        vehicle_type: String,
        connection: ConnectionId,
    );
    async fn update_location(&self, driver_id: &str, location: Coordinates) -> bool;
    async fn heartbeat(&self, driver_id: &str) -> bool;
    async fn set_status(&self, driver_id: &str, status: DriverStatus) -> bool;
    async fn mark_disconnected(&self, driver_id: &str, connection: ConnectionId);
    async fn snapshot(&self) -> Vec<DriverPresence>;
    async fn sweep(&self, now: DateTime<Utc>) -> usize;
}

#[async_trait]
pub trait ProximityAPI {
    async fn nearby(
        &self,
        origin: Coordinates,
        radius_m: f64,
        vehicle_type: Option<&str>,
    ) -> Vec<(DriverPresence, f64)>;
}

#[async_trait]
pub trait DispatchAPI {
    async fn book_ride(
        &self,
        ride_id: String,
        user_id: String,
        pickup: Place,
        dropoff: Place,
        vehicle_type: String,
    ) -> Result<RideRequest, Error>;
    async fn find_ride(&self, ride_id: &str) -> Result<RideRequest, Error>;
    async fn accept_ride(
        &self,
        ride_id: &str,
        driver_id: &str,
        driver_name: &str,
    ) -> Result<RideRequest, Error>;
    async fn reject_ride(&self, ride_id: &str, driver_id: &str) -> Result<RideRequest, Error>;
    async fn verify_code(
        &self,
        ride_id: &str,
        driver_id: &str,
        code: u32,
    ) -> Result<RideRequest, Error>;
    async fn complete_ride(
        &self,
        ride_id: &str,
        driver_id: &str,
        distance_km: f64,
    ) -> Result<RideRequest, Error>;
    async fn sweep_rides(&self, now: DateTime<Utc>) -> usize;
}

pub trait EventAPI {
    fn subscribe(&self) -> broadcast::Receiver<Envelope>;
}

pub trait API: PresenceAPI + ProximityAPI + DispatchAPI + EventAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;
