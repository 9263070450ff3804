pub mod error;
pub mod memory;
pub mod store;
pub mod supabase;
pub mod supabase_store;

pub use error::StoreError;
pub use memory::InMemoryRecordStore;
pub use store::RecordStore;
pub use supabase::SupabaseClient;
pub use supabase_store::SupabaseRecordStore;

#[cfg(any(test, feature = "mocks"))]
pub use store::MockRecordStore;
