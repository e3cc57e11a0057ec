//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod memory_cache;
pub mod shared_secret_auth;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
