use serde::Serialize;
use tokio::sync::broadcast;

use crate::entities::DriverPresence;

/// Identity a connection assumes after its first self-identifying event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Party {
    Unknown,
    Rider(String),
    Driver(String),
}

/// Who a published event is meant for. Ride-scoped events go to the rider and
/// the assigned driver only; they are never delivered globally.
#[derive(Clone, Debug)]
pub enum Audience {
    Everyone,
    Drivers,
    Ride { user_id: String, driver_id: String },
}

impl Audience {
    pub fn includes(&self, party: &Party) -> bool {
        match self {
            Self::Everyone => true,
            Self::Drivers => matches!(party, Party::Driver(_)),
            Self::Ride { user_id, driver_id } => match party {
                Party::Rider(id) => id == user_id,
                Party::Driver(id) => id == driver_id,
                Party::Unknown => false,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NearbyDriver {
    #[serde(flatten)]
    pub driver: DriverPresence,
    #[serde(rename = "distanceM")]
    pub distance_m: f64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Event {
    PresenceSnapshot {
        drivers: Vec<DriverPresence>,
    },
    RideRequested {
        ride: RideRequestView,
    },
    #[serde(rename_all = "camelCase")]
    RideAccepted {
        ride_id: String,
        driver_id: String,
        driver_name: String,
    },
    #[serde(rename_all = "camelCase")]
    VerificationCode {
        ride_id: String,
        code: u32,
    },
    #[serde(rename_all = "camelCase")]
    RideRejected {
        ride_id: String,
        driver_id: String,
    },
    #[serde(rename_all = "camelCase")]
    RideStarted {
        ride_id: String,
        driver_id: String,
    },
    #[serde(rename_all = "camelCase")]
    RideCompleted {
        ride_id: String,
        driver_id: String,
        distance_km: f64,
    },
    NearbyDriversResult {
        drivers: Vec<NearbyDriver>,
    },
}

/// Ride fields safe to show every driver when a request is announced. The
/// verification code never travels in this view.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequestView {
    pub ride_id: String,
    pub user_id: String,
    pub pickup: crate::entities::Place,
    pub dropoff: crate::entities::Place,
    pub vehicle_type: String,
}

impl From<&crate::entities::RideRequest> for RideRequestView {
    fn from(ride: &crate::entities::RideRequest) -> Self {
        Self {
            ride_id: ride.ride_id.clone(),
            user_id: ride.user_id.clone(),
            pickup: ride.pickup.clone(),
            dropoff: ride.dropoff.clone(),
            vehicle_type: ride.vehicle_type.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Envelope {
    pub audience: Audience,
    pub event: Event,
}

/// Fire-and-forget fan-out over a tokio broadcast channel. Each connection
/// task holds a receiver and filters by audience; a send with no receivers,
/// or a receiver that cannot keep up, never blocks or fails the publisher.
#[derive(Debug)]
pub struct Fanout {
    tx: broadcast::Sender<Envelope>,
}

impl Fanout {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);

        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn publish(&self, audience: Audience, event: Event) {
        let _ = self.tx.send(Envelope { audience, event });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[test]
    fn audience_filtering() {
        let rider = Party::Rider("u1".into());
        let driver = Party::Driver("d1".into());
        let other_driver = Party::Driver("d2".into());

        assert!(Audience::Everyone.includes(&rider));
        assert!(Audience::Everyone.includes(&Party::Unknown));

        assert!(Audience::Drivers.includes(&driver));
        assert!(!Audience::Drivers.includes(&rider));

        let ride = Audience::Ride {
            user_id: "u1".into(),
            driver_id: "d1".into(),
        };
        assert!(ride.includes(&rider));
        assert!(ride.includes(&driver));
        assert!(!ride.includes(&other_driver));
        assert!(!ride.includes(&Party::Unknown));
    }

    #[test]
    fn publish_reaches_subscribers() {
        block_on(async {
            let fanout = Fanout::new(16);
            let mut rx = fanout.subscribe();

            fanout.publish(
                Audience::Drivers,
                Event::RideStarted {
                    ride_id: "r1".into(),
                    driver_id: "d1".into(),
                },
            );

            let envelope = rx.recv().await.unwrap();
            assert!(matches!(envelope.audience, Audience::Drivers));
        });
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let fanout = Fanout::new(16);

        fanout.publish(
            Audience::Everyone,
            Event::PresenceSnapshot { drivers: vec![] },
        );
    }
}
