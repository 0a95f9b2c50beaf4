pub mod assignment;
pub mod audit;
pub mod booking;
pub mod vehicle;

pub use assignment::{RateSpec, VehicleAssignment};
pub use audit::{AuditAction, AuditLogEntry};
pub use booking::{Booking, BookingStatus};
pub use vehicle::Vehicle;
