//! S3 storage backend
//!
//! Provides async S3-compatible storage with:
//! - Optional root prefix inside the bucket
//! - Exponential backoff retry driven by [`RetryConfig`]
//! - Custom endpoint support (for MinIO, LocalStack, etc.)

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{config::Builder as S3ConfigBuilder, primitives::ByteStream, Client};
use bytes::Bytes;
use tracing::{debug, instrument, warn};
use tracker_core::{Error, Result, RetryConfig, S3Options};

use crate::StorageBackend;

/// S3-compatible storage backend
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    root: String,
    retry: RetryConfig,
}

impl S3Storage {
    /// Create a new S3Storage
    ///
    /// Credentials come from the environment or instance profile.
    pub async fn new(
        bucket: impl Into<String>,
        root: impl Into<String>,
        options: &S3Options,
        retry: RetryConfig,
    ) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(options.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        if let Some(endpoint) = &options.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if options.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket: bucket.into(),
            root: root.into().trim_matches('/').to_string(),
            retry,
        }
    }

    /// Get the full S3 key for a storage key
    fn s3_key(&self, key: &str) -> String {
        object_key(&self.root, key)
    }

    /// Strip the root prefix from an S3 key
    fn relative_key<'a>(&self, s3_key: &'a str) -> &'a str {
        if self.root.is_empty() {
            s3_key
        } else {
            s3_key
                .strip_prefix(self.root.as_str())
                .and_then(|k| k.strip_prefix('/'))
                .unwrap_or(s3_key)
        }
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        %operation,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Join the bucket root and a storage key
fn object_key(root: &str, key: &str) -> String {
    let root = root.trim_matches('/');
    if root.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", root, key)
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn get(&self, key: &str) -> Result<Bytes> {
        let s3_key = self.s3_key(key);
        debug!(%s3_key, "Reading from S3");

        self.with_retry("get", || async {
            let result = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
                .map_err(|e| {
                    let err = e.into_service_error();
                    if err.is_no_such_key() {
                        Error::StoragePathNotFound {
                            path: key.to_string(),
                        }
                    } else {
                        Error::Storage {
                            message: format!("S3 get_object failed for {}: {}", key, err),
                        }
                    }
                })?;

            let bytes = result.body.collect().await.map_err(|e| Error::Storage {
                message: format!("Failed to read S3 response body for {}: {}", key, e),
            })?;

            Ok(bytes.into_bytes())
        })
        .await
    }

    #[instrument(skip(self, data), fields(backend = "s3", bucket = %self.bucket, size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let s3_key = self.s3_key(key);
        debug!(%s3_key, "Writing to S3");

        self.with_retry("put", || {
            let data = data.clone();
            let s3_key = s3_key.clone();
            async move {
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&s3_key)
                    .body(ByteStream::from(data))
                    .send()
                    .await
                    .map_err(|e| Error::Storage {
                        message: format!("S3 put_object failed for {}: {}", key, e),
                    })?;
                Ok(())
            }
        })
        .await
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<()> {
        let s3_key = self.s3_key(key);
        debug!(%s3_key, "Deleting from S3");

        // DeleteObject succeeds for missing keys
        self.with_retry("delete", || async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
                .map_err(|e| Error::Storage {
                    message: format!("S3 delete_object failed for {}: {}", key, e),
                })?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let s3_prefix = self.s3_key(prefix);
        debug!(%s3_prefix, "Listing S3 objects");

        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let token = continuation_token.take();
            let response = self
                .with_retry("list", || {
                    let token = token.clone();
                    let s3_prefix = &s3_prefix;
                    async move {
                        let mut request = self
                            .client
                            .list_objects_v2()
                            .bucket(&self.bucket)
                            .prefix(s3_prefix);
                        if let Some(token) = token {
                            request = request.continuation_token(token);
                        }
                        request.send().await.map_err(|e| Error::Storage {
                            message: format!("S3 list_objects failed for {}: {}", prefix, e),
                        })
                    }
                })
                .await?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    results.push(self.relative_key(key).to_string());
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        results.sort();
        debug!(count = results.len(), "Found S3 objects");
        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn exists(&self, key: &str) -> Result<bool> {
        let s3_key = self.s3_key(key);

        self.with_retry("exists", || async {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
            {
                Ok(_) => Ok(true),
                Err(e) => {
                    let err = e.into_service_error();
                    if err.is_not_found() {
                        Ok(false)
                    } else {
                        Err(Error::Storage {
                            message: format!("S3 head_object failed for {}: {}", key, err),
                        })
                    }
                }
            }
        })
        .await
    }

    fn describe(&self) -> String {
        if self.root.is_empty() {
            format!("s3://{}", self.bucket)
        } else {
            format!("s3://{}/{}", self.bucket, self.root)
        }
    }
}
