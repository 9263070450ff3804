pub mod appointment;
pub mod auth;
pub mod availability;
pub mod error;
pub mod pagination;
pub mod user;

pub use appointment::*;
pub use auth::*;
pub use availability::*;
pub use error::*;
pub use pagination::*;
pub use user::*;

/// Wire format for calendar dates (`YYYY-MM-DD`).
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Wire format for times of day (`HH:MM`).
pub const TIME_FORMAT: &str = "%H:%M";
