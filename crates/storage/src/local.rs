//! Local filesystem storage backend
//!
//! Keys map to files under a root directory. Writes are atomic (temp file,
//! then rename) so a crash never leaves a half-written record behind.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use tracker_core::{Error, Result};
use uuid::Uuid;

use crate::StorageBackend;

/// Local filesystem storage backend
#[derive(Debug, Clone)]
pub struct LocalStorage {
    /// Root directory for all keys
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at `base_path`
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a key to a path under the root, rejecting keys that escape it
    fn resolve_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(Error::Storage {
                message: format!("Key {:?} is not a relative path inside the storage root", key),
            });
        }
        Ok(self.base_path.join(relative))
    }

    /// Generate a unique temporary file path next to the target
    fn temp_path(full_path: &Path) -> PathBuf {
        let temp_name = format!(
            ".{}.{}.tmp",
            full_path.file_name().unwrap_or_default().to_string_lossy(),
            Uuid::new_v4()
        );
        full_path.with_file_name(temp_name)
    }

    /// Convert an absolute path under the root back into a `/`-separated key
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Remove directories left empty by a delete, stopping at the root
    async fn prune_empty_parents(&self, full_path: &Path) {
        let mut dir = full_path.parent();
        while let Some(current) = dir {
            if current == self.base_path || !current.starts_with(&self.base_path) {
                break;
            }
            // remove_dir fails on non-empty directories, which ends the walk
            if fs::remove_dir(current).await.is_err() {
                break;
            }
            debug!(dir = ?current, "Removed empty directory");
            dir = current.parent();
        }
    }
}

/// Whether a file name has the shape written by `LocalStorage::temp_path`
fn is_temp_file_name(name: &str) -> bool {
    let Some(inner) = name
        .strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(".tmp"))
    else {
        return false;
    };
    match inner.rsplit_once('.') {
        Some((target, id)) => !target.is_empty() && Uuid::parse_str(id).is_ok(),
        None => false,
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    #[instrument(skip(self), fields(backend = "local"))]
    async fn get(&self, key: &str) -> Result<Bytes> {
        let full_path = self.resolve_path(key)?;
        debug!(?full_path, "Reading file");

        match fs::read(&full_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: key.to_string(),
            }),
            Err(e) => Err(Error::Storage {
                message: format!("Failed to read {}: {}", key, e),
            }),
        }
    }

    #[instrument(skip(self, data), fields(backend = "local", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let full_path = self.resolve_path(key)?;
        let temp_path = Self::temp_path(&full_path);

        debug!(?full_path, ?temp_path, "Writing file atomically");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage {
                    message: format!("Failed to create directory {:?}: {}", parent, e),
                })?;
        }

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to create temp file {:?}: {}", temp_path, e),
            })?;

        file.write_all(&data).await.map_err(|e| Error::Storage {
            message: format!("Failed to write {}: {}", key, e),
        })?;

        file.sync_all().await.map_err(|e| Error::Storage {
            message: format!("Failed to sync {}: {}", key, e),
        })?;

        fs::rename(&temp_path, &full_path)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to rename {:?} to {:?}: {}", temp_path, full_path, e),
            })?;

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.resolve_path(key)?;
        debug!(?full_path, "Deleting file");

        match fs::remove_file(&full_path).await {
            Ok(()) => {
                self.prune_empty_parents(&full_path).await;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?full_path, "File already absent");
                Ok(())
            }
            Err(e) => Err(Error::Storage {
                message: format!("Failed to delete {}: {}", key, e),
            }),
        }
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let search_path = self.resolve_path(prefix)?;
        let mut results = Vec::new();

        // A prefix ending in '/' names a directory; anything else may also
        // match siblings sharing the last segment, so scan its parent
        let dir_to_scan = if prefix.is_empty() || prefix.ends_with('/') {
            search_path
        } else {
            match search_path.parent() {
                Some(parent) => parent.to_path_buf(),
                None => return Ok(results),
            }
        };
        if !dir_to_scan.is_dir() {
            return Ok(results);
        }

        let mut stack = vec![dir_to_scan];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(Error::Storage {
                        message: format!("Failed to list {:?}: {}", dir, e),
                    })
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    stack.push(entry_path);
                } else if file_type.is_file() {
                    let is_temp = is_temp_file_name(&entry.file_name().to_string_lossy());
                    match self.key_for(&entry_path) {
                        Some(key) if !is_temp && key.starts_with(prefix) => results.push(key),
                        _ => {}
                    }
                }
            }
        }

        results.sort();
        debug!(count = results.len(), "Found keys");
        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn exists(&self, key: &str) -> Result<bool> {
        let full_path = self.resolve_path(key)?;
        match fs::metadata(&full_path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Storage {
                message: format!("Failed to stat {}: {}", key, e),
            }),
        }
    }

    fn describe(&self) -> String {
        format!("file://{}", self.base_path.display())
    }
}
