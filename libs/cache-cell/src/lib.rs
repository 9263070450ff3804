// =====================================================================================
// CACHE CELL - DOCTOR DIRECTORY READ-THROUGH CACHE
// =====================================================================================

pub mod error;
pub mod models;
pub mod services;

pub use error::CacheError;
pub use models::*;
pub use services::*;
