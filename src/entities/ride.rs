use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Place;
use crate::error::{already_resolved_error, code_mismatch_error, wrong_driver_error, Error};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    pub ride_id: String,
    pub user_id: String,
    pub pickup: Place,
    pub dropoff: Place,
    pub vehicle_type: String,
    pub status: Status,
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,
    pub distance_km: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted { code: u32 },
    Started,
    Rejected,
    Completed,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted { code: _ } => "accepted",
            Self::Started => "started",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }
}

impl RideRequest {
    pub fn new(
        ride_id: String,
        user_id: String,
        pickup: Place,
        dropoff: Place,
        vehicle_type: String,
    ) -> Self {
        Self {
            ride_id,
            user_id,
            pickup,
            dropoff,
            vehicle_type,
            status: Status::Pending,
            driver_id: None,
            driver_name: None,
            distance_km: None,
            created_at: Utc::now(),
            accepted_at: None,
            rejected_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, Status::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, Status::Rejected | Status::Completed)
    }

    /// Timestamp at which the ride entered a terminal state, if it has.
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        self.rejected_at.or(self.completed_at)
    }

    /// First successful acceptance wins; the assignment is never rewritten.
    #[tracing::instrument]
    pub fn accept(&mut self, driver_id: &str, driver_name: &str, code: u32) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                self.status = Status::Accepted { code };
                self.driver_id = Some(driver_id.to_owned());
                self.driver_name = Some(driver_name.to_owned());
                self.accepted_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(already_resolved_error()),
        }
    }

    #[tracing::instrument]
    pub fn reject(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                self.status = Status::Rejected;
                self.rejected_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(already_resolved_error()),
        }
    }

    /// A mismatched code leaves the ride accepted so the driver can retry.
    #[tracing::instrument]
    pub fn verify(&mut self, driver_id: &str, entered: u32) -> Result<(), Error> {
        match self.status {
            Status::Accepted { code } => {
                if self.driver_id.as_deref() != Some(driver_id) {
                    return Err(wrong_driver_error());
                }

                if code != entered {
                    return Err(code_mismatch_error());
                }

                self.status = Status::Started;
                self.started_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(already_resolved_error()),
        }
    }

    #[tracing::instrument]
    pub fn complete(&mut self, driver_id: &str, distance_km: f64) -> Result<(), Error> {
        match self.status {
            Status::Started => {
                if self.driver_id.as_deref() != Some(driver_id) {
                    return Err(wrong_driver_error());
                }

                self.status = Status::Completed;
                self.distance_km = Some(distance_km);
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(already_resolved_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Coordinates;
    use crate::error::{already_resolved_error, code_mismatch_error, wrong_driver_error};

    fn test_ride() -> RideRequest {
        RideRequest::new(
            "r1".into(),
            "u1".into(),
            Place {
                coordinates: Coordinates::new(12.90, 77.59),
                label: None,
            },
            Place {
                coordinates: Coordinates::new(12.93, 77.61),
                label: None,
            },
            "taxi".into(),
        )
    }

    #[test]
    fn accept_assigns_driver_once() {
        let mut ride = test_ride();

        ride.accept("d1", "Asha", 4321).unwrap();

        assert_eq!(ride.status.name(), "accepted");
        assert_eq!(ride.driver_id.as_deref(), Some("d1"));
        assert!(ride.accepted_at.is_some());

        let err = ride.accept("d2", "Banu", 1111).unwrap_err();
        assert_eq!(err.code, already_resolved_error().code);
        assert_eq!(ride.driver_id.as_deref(), Some("d1"));
    }

    #[test]
    fn reject_is_terminal() {
        let mut ride = test_ride();

        ride.reject().unwrap();

        assert!(ride.is_terminal());
        assert!(ride.terminal_at().is_some());
        assert_eq!(
            ride.accept("d1", "Asha", 4321).unwrap_err().code,
            already_resolved_error().code
        );
    }

    #[test]
    fn verify_retries_on_mismatch() {
        let mut ride = test_ride();
        ride.accept("d1", "Asha", 4321).unwrap();

        let err = ride.verify("d1", 9999).unwrap_err();
        assert_eq!(err.code, code_mismatch_error().code);
        assert_eq!(ride.status.name(), "accepted");

        ride.verify("d1", 4321).unwrap();
        assert_eq!(ride.status.name(), "started");
    }

    #[test]
    fn verify_rejects_wrong_driver() {
        let mut ride = test_ride();
        ride.accept("d1", "Asha", 4321).unwrap();

        let err = ride.verify("d2", 4321).unwrap_err();
        assert_eq!(err.code, wrong_driver_error().code);
    }

    #[test]
    fn complete_records_distance() {
        let mut ride = test_ride();
        ride.accept("d1", "Asha", 4321).unwrap();
        ride.verify("d1", 4321).unwrap();

        ride.complete("d1", 4.2).unwrap();

        assert!(ride.is_terminal());
        assert_eq!(ride.distance_km, Some(4.2));
        assert!(ride.completed_at.is_some());
    }

    #[test]
    fn complete_requires_started() {
        let mut ride = test_ride();
        ride.accept("d1", "Asha", 4321).unwrap();

        let err = ride.complete("d1", 4.2).unwrap_err();
        assert_eq!(err.code, already_resolved_error().code);
    }
}
