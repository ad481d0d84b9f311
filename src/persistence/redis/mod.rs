mod cache;
mod core;
mod queue;
mod schedule;
mod scripts;
mod store;

pub use self::core::RedisPersistence;
