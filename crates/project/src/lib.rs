//! Record resolution and cascading deletion for tracked experiments
//!
//! Loads experiment and checkpoint records from a storage backend, resolves
//! user-supplied id prefixes to exactly one record, and removes records so
//! that an interrupted removal can always be finished by running it again.

pub mod deletion;
pub mod project;
pub mod repository;
pub mod resolver;
pub mod store;

pub use deletion::DeletionEngine;
pub use project::{Project, Removed};
pub use repository::Repository;
pub use resolver::{resolve, ResolvedRecord};
pub use store::{RecordKey, RecordStore};
