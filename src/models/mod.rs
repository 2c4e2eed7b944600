pub mod booking;
pub mod room;

pub use booking::{Booking, BookingStatus, VerificationStatus, VERIFICATION_WINDOW_MINUTES};
pub use room::{Building, Contact, Room, RoomStatus};
