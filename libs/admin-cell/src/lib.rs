// =====================================================================================
// ADMIN CELL - USER ADMINISTRATION AND SYSTEM OVERVIEW
// =====================================================================================

pub mod models;
pub mod services;

pub use models::*;
pub use services::*;
