mod driver;
mod location;
mod ride;

pub use driver::{ConnectionId, DriverPresence, Status as DriverStatus};
pub use location::{Coordinates, Place};
pub use ride::{RideRequest, Status as RideStatus};
