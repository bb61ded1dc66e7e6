pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;
pub mod supabase;

pub use error::StoreError;
pub use memory::{InMemoryAppointmentStore, InMemoryConfirmedStore};
pub use redis_store::RedisAppointmentStore;
pub use store::{AppointmentStore, ConfirmedAppointmentStore};
pub use supabase::{SupabaseClient, SupabaseConfirmedStore};
