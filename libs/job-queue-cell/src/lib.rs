// =====================================================================================
// JOB QUEUE CELL - BACKGROUND REMINDERS, REPORTS AND EXPORTS
// =====================================================================================

pub mod error;
pub mod models;
pub mod services;

pub use error::*;
pub use models::*;
pub use services::*;
