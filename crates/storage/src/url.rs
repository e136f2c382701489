//! Storage URL parsing and backend construction

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use tracker_core::{Error, Result, StorageConfig};

use crate::{LocalStorage, StorageBackend};

/// A parsed storage location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUrl {
    /// Directory on the local filesystem
    Local(PathBuf),

    /// Bucket with an optional root inside it
    S3 { bucket: String, root: String },
}

impl StorageUrl {
    /// Parse a storage URL
    ///
    /// Accepts `file://path`, `s3://bucket[/root]` or a bare path. Relative
    /// local paths are joined onto `project_dir`.
    pub fn parse(url: &str, project_dir: &Path) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidStorageUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let Some((scheme, rest)) = url.split_once("://") else {
            if url.is_empty() {
                return Err(invalid("empty storage location"));
            }
            return Ok(StorageUrl::Local(project_dir.join(url)));
        };

        match scheme {
            "file" => {
                if rest.is_empty() {
                    return Err(invalid("missing path"));
                }
                Ok(StorageUrl::Local(project_dir.join(rest)))
            }
            "s3" => {
                let (bucket, root) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(invalid("missing bucket name"));
                }
                Ok(StorageUrl::S3 {
                    bucket: bucket.to_string(),
                    root: root.trim_matches('/').to_string(),
                })
            }
            other => Err(Error::StorageUnavailable {
                backend: format!("{}:// (unsupported scheme)", other),
            }),
        }
    }
}

/// Build the backend for a storage URL
pub async fn open_backend(
    url: &str,
    project_dir: &Path,
    config: &StorageConfig,
) -> Result<Arc<dyn StorageBackend>> {
    let parsed = StorageUrl::parse(url, project_dir)?;
    debug!(?parsed, "Opening storage backend");

    match parsed {
        StorageUrl::Local(path) => Ok(Arc::new(LocalStorage::new(path))),
        #[cfg(feature = "s3")]
        StorageUrl::S3 { bucket, root } => Ok(Arc::new(
            crate::S3Storage::new(bucket, root, &config.s3, config.retry.clone()).await,
        )),
        #[cfg(not(feature = "s3"))]
        StorageUrl::S3 { .. } => {
            let _ = config;
            Err(Error::StorageUnavailable {
                backend: "s3 (built without the `s3` feature)".to_string(),
            })
        }
    }
}
