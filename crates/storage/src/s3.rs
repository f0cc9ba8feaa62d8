//! S3 storage backend
//!
//! Durable checkpoint location for spot training jobs. Supports custom
//! endpoints (MinIO, LocalStack) and retries transient failures with
//! exponential backoff.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{config::Builder as S3ConfigBuilder, primitives::ByteStream, Client};
use bytes::Bytes;
use runtime_core::{Error, Result, RetryConfig};
use tracing::{debug, instrument, warn};

use crate::StorageBackend;

/// S3-compatible storage backend
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
    retry: RetryConfig,
}

/// Configuration for S3Storage
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    /// Key prefix every path is placed under
    pub prefix: Option<String>,
    /// Custom endpoint URL (MinIO, LocalStack)
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    /// Path-style addressing, required by MinIO
    pub force_path_style: bool,
    pub retry: RetryConfig,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: None,
            endpoint_url: None,
            region: Some("us-east-1".to_string()),
            force_path_style: false,
            retry: RetryConfig::default(),
        }
    }
}

impl S3Storage {
    /// Create with custom configuration; credentials come from the
    /// environment or the instance profile
    pub async fn with_config(config: S3Config) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(
                config.region.unwrap_or_else(|| "us-east-1".to_string()),
            ))
            .load()
            .await;

        let mut builder = S3ConfigBuilder::from(&aws_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
            prefix: config.prefix.unwrap_or_default(),
            retry: config.retry,
        }
    }

    fn s3_key(&self, path: &str) -> String {
        join_key(&self.prefix, path)
    }

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
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        %operation,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis(),
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

fn join_key(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn read(&self, path: &str) -> Result<Bytes> {
        let key = self.s3_key(path);

        self.with_retry("read", || async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| {
                    if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) {
                        Error::StoragePathNotFound {
                            path: path.to_string(),
                        }
                    } else {
                        Error::Storage {
                            message: format!("S3 get_object {} failed: {}", key, e),
                        }
                    }
                })?;

            let body = output.body.collect().await.map_err(|e| Error::Storage {
                message: format!("Failed to read S3 body for {}: {}", key, e),
            })?;
            Ok(body.into_bytes())
        })
        .await
    }

    #[instrument(skip(self, data), fields(backend = "s3", bucket = %self.bucket, size = data.len()))]
    async fn write(&self, path: &str, data: Bytes) -> Result<u64> {
        let key = self.s3_key(path);
        let size = data.len() as u64;

        self.with_retry("write", || {
            let data = data.clone();
            let key = key.clone();
            async move {
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&key)
                    .body(ByteStream::from(data))
                    .send()
                    .await
                    .map_err(|e| Error::Storage {
                        message: format!("S3 put_object {} failed: {}", key, e),
                    })?;
                Ok(size)
            }
        })
        .await
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn size(&self, path: &str) -> Result<Option<u64>> {
        let key = self.s3_key(path);

        self.with_retry("size", || async {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
            {
                Ok(head) => Ok(Some(head.content_length().unwrap_or(0).max(0) as u64)),
                Err(e) if e.as_service_error().map(|se| se.is_not_found()) == Some(true) => {
                    Ok(None)
                }
                Err(e) => Err(Error::Storage {
                    message: format!("S3 head_object {} failed: {}", key, e),
                }),
            }
        })
        .await
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let s3_prefix = self.s3_key(prefix);
        let strip = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix.trim_end_matches('/'))
        };

        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&s3_prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| Error::Storage {
                message: format!("S3 list_objects_v2 {} failed: {}", s3_prefix, e),
            })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(|key| key.strip_prefix(strip.as_str()).unwrap_or(key).to_string()),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated() == Some(true) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        keys.sort();
        debug!(count = keys.len(), "Listed S3 objects");
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("", "checkpoint-1.h5"), "checkpoint-1.h5");
        assert_eq!(join_key("jobs/", "checkpoint-1.h5"), "jobs/checkpoint-1.h5");
        assert_eq!(join_key("jobs", "checkpoint-1.h5"), "jobs/checkpoint-1.h5");
    }

    #[test]
    fn test_s3_config_default() {
        let config = S3Config::default();
        assert!(config.bucket.is_empty());
        assert!(config.prefix.is_none());
        assert_eq!(config.region.as_deref(), Some("us-east-1"));
        assert!(!config.force_path_style);
        assert_eq!(config.retry.max_retries, 3);
    }
}
