pub mod backend;
pub mod directory;
pub mod redis_cache;

pub use backend::*;
pub use directory::*;
pub use redis_cache::*;
