use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Coordinates;

/// Opaque handle for the transport-level connection currently representing a
/// driver. A re-registration replaces the handle without closing the old
/// connection, so the registry compares handles before acting on a close.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Live,
    OnRide,
    Offline,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Live => "Live",
            Self::OnRide => "OnRide",
            Self::Offline => "Offline",
        }
    }
}

/// Live, ephemeral record of a connected driver. Owned and mutated by the
/// presence registry; everyone else reads snapshots.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverPresence {
    pub driver_id: String,
    pub name: String,
    pub location: Coordinates,
    pub vehicle_type: String,
    pub status: Status,
    pub is_online: bool,
    pub last_update_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub connection: ConnectionId,
}

impl DriverPresence {
    pub fn new(
        driver_id: String,
        name: String,
        location: Coordinates,
        vehicle_type: String,
        connection: ConnectionId,
    ) -> Self {
        Self {
            driver_id,
            name,
            location,
            vehicle_type,
            status: Status::Live,
            is_online: true,
            last_update_at: Utc::now(),
            connection,
        }
    }

    /// A driver may carry at most one active ride; only an online, Live driver
    /// can be handed a new one.
    pub fn is_dispatchable(&self) -> bool {
        self.is_online && self.status == Status::Live
    }
}
