use super::Engine;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;

use crate::{
    api::DispatchAPI,
    entities::{DriverStatus, Place, RideRequest},
    error::{
        already_resolved_error, driver_unavailable_error, duplicate_ride_error,
        unknown_ride_error, Error,
    },
    fanout::{Audience, Event, RideRequestView},
};

// Completed rides linger briefly for late reads before leaving active memory.
const COMPLETED_RIDE_LINGER: std::time::Duration = std::time::Duration::from_secs(5);

fn terminal_retention() -> Duration {
    Duration::minutes(15)
}

fn pending_retention() -> Duration {
    Duration::minutes(30)
}

fn generate_code() -> u32 {
    rand::thread_rng().gen_range(1000..9999)
}

#[async_trait]
impl DispatchAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn book_ride(
        &self,
        ride_id: String,
        user_id: String,
        pickup: Place,
        dropoff: Place,
        vehicle_type: String,
    ) -> Result<RideRequest, Error> {
        let ride = {
            let mut rides = self.rides.write().await;

            if rides.contains_key(&ride_id) {
                return Err(duplicate_ride_error());
            }

            let ride = RideRequest::new(ride_id.clone(), user_id, pickup, dropoff, vehicle_type);
            rides.insert(ride_id, ride.clone());

            ride
        };

        self.fanout.publish(
            Audience::Drivers,
            Event::RideRequested {
                ride: RideRequestView::from(&ride),
            },
        );

        Ok(ride)
    }

    async fn find_ride(&self, ride_id: &str) -> Result<RideRequest, Error> {
        let rides = self.rides.read().await;

        rides.get(ride_id).cloned().ok_or_else(unknown_ride_error)
    }

    /// Exactly one caller may win a given ride; the ride transition and the
    /// driver's move to OnRide happen under both write locks so no reader
    /// ever observes one without the other.
    #[tracing::instrument(skip(self))]
    async fn accept_ride(
        &self,
        ride_id: &str,
        driver_id: &str,
        driver_name: &str,
    ) -> Result<RideRequest, Error> {
        let (ride, presence) = {
            let mut rides = self.rides.write().await;
            let ride = rides.get_mut(ride_id).ok_or_else(unknown_ride_error)?;

            if !ride.is_pending() {
                return Err(already_resolved_error());
            }

            let mut drivers = self.drivers.write().await;
            let presence = drivers
                .get_mut(driver_id)
                .ok_or_else(driver_unavailable_error)?;

            if !presence.is_dispatchable() {
                return Err(driver_unavailable_error());
            }

            ride.accept(driver_id, driver_name, generate_code())?;
            presence.status = DriverStatus::OnRide;

            (ride.clone(), presence.clone())
        };

        let audience = Audience::Ride {
            user_id: ride.user_id.clone(),
            driver_id: driver_id.to_owned(),
        };

        self.fanout.publish(
            audience.clone(),
            Event::RideAccepted {
                ride_id: ride.ride_id.clone(),
                driver_id: driver_id.to_owned(),
                driver_name: driver_name.to_owned(),
            },
        );

        if let crate::entities::RideStatus::Accepted { code } = &ride.status {
            self.fanout.publish(
                audience,
                Event::VerificationCode {
                    ride_id: ride.ride_id.clone(),
                    code: *code,
                },
            );
        }

        self.publish_snapshot().await;
        self.record(&presence);

        Ok(ride)
    }

    /// A rejected ride stays terminal; rebooking is the rider side's job.
    #[tracing::instrument(skip(self))]
    async fn reject_ride(&self, ride_id: &str, driver_id: &str) -> Result<RideRequest, Error> {
        let ride = {
            let mut rides = self.rides.write().await;
            let ride = rides.get_mut(ride_id).ok_or_else(unknown_ride_error)?;

            ride.reject()?;

            ride.clone()
        };

        self.fanout.publish(
            Audience::Ride {
                user_id: ride.user_id.clone(),
                driver_id: driver_id.to_owned(),
            },
            Event::RideRejected {
                ride_id: ride.ride_id.clone(),
                driver_id: driver_id.to_owned(),
            },
        );

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn verify_code(
        &self,
        ride_id: &str,
        driver_id: &str,
        code: u32,
    ) -> Result<RideRequest, Error> {
        let ride = {
            let mut rides = self.rides.write().await;
            let ride = rides.get_mut(ride_id).ok_or_else(unknown_ride_error)?;

            ride.verify(driver_id, code)?;

            ride.clone()
        };

        self.fanout.publish(
            Audience::Ride {
                user_id: ride.user_id.clone(),
                driver_id: driver_id.to_owned(),
            },
            Event::RideStarted {
                ride_id: ride.ride_id.clone(),
                driver_id: driver_id.to_owned(),
            },
        );

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn complete_ride(
        &self,
        ride_id: &str,
        driver_id: &str,
        distance_km: f64,
    ) -> Result<RideRequest, Error> {
        let (ride, presence) = {
            let mut rides = self.rides.write().await;
            let ride = rides.get_mut(ride_id).ok_or_else(unknown_ride_error)?;

            ride.complete(driver_id, distance_km)?;

            let mut drivers = self.drivers.write().await;
            let presence = match drivers.get_mut(driver_id) {
                Some(presence) => {
                    presence.status = DriverStatus::Live;
                    Some(presence.clone())
                }
                // the driver may already have been swept; the ride result stands
                None => None,
            };

            (ride.clone(), presence)
        };

        self.fanout.publish(
            Audience::Ride {
                user_id: ride.user_id.clone(),
                driver_id: driver_id.to_owned(),
            },
            Event::RideCompleted {
                ride_id: ride.ride_id.clone(),
                driver_id: driver_id.to_owned(),
                distance_km,
            },
        );

        if let Some(presence) = presence {
            self.publish_snapshot().await;
            self.record(&presence);
        }

        self.schedule_ride_removal(ride.ride_id.clone());

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn sweep_rides(&self, now: DateTime<Utc>) -> usize {
        let mut rides = self.rides.write().await;
        let before = rides.len();

        rides.retain(|_, ride| {
            if ride.is_terminal() {
                let terminal_at = ride.terminal_at().unwrap_or(ride.created_at);
                return now - terminal_at <= terminal_retention();
            }

            if ride.is_pending() {
                return now - ride.created_at <= pending_retention();
            }

            true
        });

        before - rides.len()
    }
}

impl Engine {
    fn schedule_ride_removal(&self, ride_id: String) {
        let rides = Arc::clone(&self.rides);
        let linger = tokio::time::sleep(COMPLETED_RIDE_LINGER);

        tokio::spawn(async move {
            linger.await;
            rides.write().await.remove(&ride_id);
            tracing::debug!(ride_id = %ride_id, "completed ride left active memory");
        });
    }
}
