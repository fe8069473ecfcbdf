//! # Order System Service
//!
//! Configuration and wiring for running the order system against
//! `PostgreSQL`, Redis, and Redpanda.
//!
//! - [`Config`]: environment-driven settings
//! - [`Resources`]: connected stores and the collaborators built on them
//!
//! The `stock-worker` binary uses both to run the ledger consumer.

pub mod bootstrap;
pub mod config;

pub use bootstrap::Resources;
pub use config::{Config, ConfigError};
