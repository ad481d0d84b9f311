pub mod memory;
pub mod model;
#[cfg(feature = "distributed")]
pub mod redis;
pub mod traits;

pub use memory::MemoryPersistence;
pub use model::{AppendOutcome, CreateOutcome, StatusChange};
#[cfg(feature = "distributed")]
pub use redis::RedisPersistence;
pub use traits::{CommandStore, KvCache, ScheduleStore, VehicleQueue};
