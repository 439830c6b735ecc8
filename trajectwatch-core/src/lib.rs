//! Core shared library for the TrajectWatch poller.
//!
//! This crate exposes the primitives the engine and the binary depend on:
//! the common error type, configuration loading and logging setup.

pub mod config;
pub mod errors;
pub mod logging;

pub use config::{ProviderKind, SeedTraject, WatchConfig};
pub use errors::{ConfigError, WatchError};
