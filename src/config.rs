// src/config.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Configuration records for readers, writers, bucket iteration and the S3 client.
// Every record is a closed set of named fields with defaults.

use std::fmt;
use std::sync::Arc;

use crate::constants::{
    DEFAULT_BUFFER_SIZE, DEFAULT_ITER_RETRIES, DEFAULT_ITER_WORKERS, DEFAULT_LINE_TERMINATOR,
    DEFAULT_MIN_PART_SIZE,
};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Reader settings.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Object version to read; `None` reads the latest.
    pub version_id: Option<String>,
    /// Lookahead buffer size; also the size of each network read.
    pub buffer_size: usize,
    /// Delimiter used by `readline`.
    pub line_terminator: Vec<u8>,
    /// Skip the initial positioning GET; the first read or seek issues it.
    pub defer_seek: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            version_id: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            line_terminator: DEFAULT_LINE_TERMINATOR.to_vec(),
            defer_seek: false,
        }
    }
}

impl ReaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::config("buffer_size must be >= 1"));
        }
        if self.line_terminator.is_empty() {
            return Err(Error::config("line_terminator must not be empty"));
        }
        Ok(())
    }
}

/// Multipart writer settings.
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Staged bytes that trigger a part upload. Values below the 5 MiB S3
    /// floor are accepted with a warning.
    pub min_part_size: usize,
    /// Retry policy for init, part upload and completion.
    pub retry: RetryPolicy,
    /// Abort the upload if the writer is dropped before close/terminate.
    pub abort_on_drop: bool,
    /// Optional content-type set on CreateMultipartUpload.
    pub content_type: Option<String>,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            min_part_size: DEFAULT_MIN_PART_SIZE,
            retry: RetryPolicy::default(),
            abort_on_drop: true,
            content_type: None,
        }
    }
}

/// Predicate deciding whether a listed key is downloaded.
pub type KeyFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Bucket iteration settings.
#[derive(Clone)]
pub struct IterConfig {
    /// Only keys starting with this prefix are listed.
    pub prefix: String,
    /// Keys rejected by the filter are skipped; `None` accepts everything.
    pub accept_key: Option<KeyFilter>,
    /// Stop after yielding this many results.
    pub key_limit: Option<usize>,
    /// Concurrent downloads.
    pub workers: usize,
    /// Extra attempts per key after the first failure.
    pub retries: usize,
}

impl Default for IterConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            accept_key: None,
            key_limit: None,
            workers: DEFAULT_ITER_WORKERS,
            retries: DEFAULT_ITER_RETRIES,
        }
    }
}

impl IterConfig {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.accept_key = Some(Arc::new(filter));
        self
    }

    pub fn with_key_limit(mut self, limit: usize) -> Self {
        self.key_limit = Some(limit);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn accepts(&self, key: &str) -> bool {
        self.accept_key.as_ref().is_none_or(|f| f(key))
    }
}

impl fmt::Debug for IterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterConfig")
            .field("prefix", &self.prefix)
            .field("accept_key", &self.accept_key.as_ref().map(|_| "<fn>"))
            .field("key_limit", &self.key_limit)
            .field("workers", &self.workers)
            .field("retries", &self.retries)
            .finish()
    }
}

/// Static access key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .finish()
    }
}

/// Settings used to build an S3 client.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Custom endpoint, e.g. `https://minio.local:9000`.
    pub endpoint_url: Option<String>,
    /// Region; falls back to `AWS_REGION`, then us-east-1.
    pub region: Option<String>,
    /// Static credentials; `None` uses the default AWS provider chain.
    pub credentials: Option<Credentials>,
    /// Address buckets as `host/bucket` instead of `bucket.host`.
    pub force_path_style: bool,
}
