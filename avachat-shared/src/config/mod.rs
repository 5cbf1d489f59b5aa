//! # Configuration
//!
//! Client configuration: backend location, stream pacing, persisted storage,
//! and logging.

pub mod client;

pub use client::{ClientConfig, ConfigError, LogFormat, LoggingConfig, StorageConfig, StreamConfig};
