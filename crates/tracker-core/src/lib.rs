//! Tracker Core - Foundation for experiment and checkpoint tracking
//!
//! Provides the record types, error handling, and project configuration
//! shared by the storage backends, the project engine and the CLI.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ProjectConfig, RetryConfig, S3Options, StorageConfig};
pub use error::{Error, Result};
pub use types::*;
