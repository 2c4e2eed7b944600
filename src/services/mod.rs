pub mod booking_flow;
pub mod cache;
pub mod email;
pub mod schedule;
