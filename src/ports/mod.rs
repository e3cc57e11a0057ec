//! Port traits implemented by [`crate::adapters`].

pub mod auth_port;
pub mod cache_port;
pub mod config_port;
pub mod data_port;
pub mod result_store_port;
