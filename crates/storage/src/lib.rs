//! Storage - Pluggable storage backends for experiment and checkpoint records
//!
//! Provides async key/blob operations with support for:
//! - Local filesystem (default feature)
//! - In-memory storage with fault injection (tests and benchmarks)
//! - Amazon S3 / S3-compatible storage (with `s3` feature)
//!
//! # Example
//!
//! ```no_run
//! use storage::{StorageBackend, LocalStorage};
//! use bytes::Bytes;
//!
//! # async fn example() -> tracker_core::Result<()> {
//! let storage = LocalStorage::new("/tmp/keepsake");
//! storage.put("experiments/abc/experiment.json", Bytes::from("{}")).await?;
//! let data = storage.get("experiments/abc/experiment.json").await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod local;
mod memory;
mod url;

#[cfg(feature = "s3")]
mod s3;

pub use backend::StorageBackend;
pub use local::LocalStorage;
pub use memory::{FaultOp, MemoryStorage};
pub use url::{open_backend, StorageUrl};

#[cfg(feature = "s3")]
pub use s3::S3Storage;
