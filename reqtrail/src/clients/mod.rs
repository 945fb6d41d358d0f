//! Data-store clients set up at startup.
//!
//! Each client exposes a [`HealthCheck`](crate::health::HealthCheck) so the
//! `/healthcheck` endpoint can report on it, and is closed through a hook on
//! the [`ShutdownManager`](crate::shutdown::ShutdownManager).

pub mod redis;

pub use redis::RedisClient;
