//! Google Calendar v3 backend for the family calendar gateway.

pub mod google;
pub mod retry;
mod wire;

pub use google::GoogleCalendar;
pub use retry::RetryPolicy;
