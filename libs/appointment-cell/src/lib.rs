// =====================================================================================
// APPOINTMENT CELL - BOOKING LIFECYCLE AND DOUBLE-BOOKING PREVENTION
// =====================================================================================

pub mod models;
pub mod services;

pub use models::*;
pub use services::*;
