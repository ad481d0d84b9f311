mod cache;
mod core;
mod queue;
mod schedule;
mod store;

pub use self::core::MemoryPersistence;
