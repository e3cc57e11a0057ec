//! picklab: walk-forward validation for stock-pick algorithms.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], request handling in [`service`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod service;
pub mod cli;
