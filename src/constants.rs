// src/constants.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Centralized constants for s3stream to avoid hardcoded values throughout the codebase

use std::time::Duration;

/// URI schemes accepted by the S3 URI parser.
pub const S3_SCHEMES: [&str; 4] = ["s3", "s3n", "s3u", "s3a"];

/// Default S3 endpoint host when a URI does not name one.
pub const DEFAULT_HOST: &str = "s3.amazonaws.com";

/// Default S3 endpoint port when a URI does not name one.
pub const DEFAULT_PORT: u16 = 443;

/// Default region handed to the AWS SDK when neither the environment nor the
/// client config supply one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default lookahead buffer size for readers (128 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Default line terminator used by `Reader::readline`
pub const DEFAULT_LINE_TERMINATOR: &[u8] = b"\n";

/// Default minimum part size for multipart uploads (50 MiB)
pub const DEFAULT_MIN_PART_SIZE: usize = 50 * 1024 * 1024;

/// Minimum S3 multipart upload part size (5 MB - AWS requirement).
/// Only the final part of an upload may be smaller.
pub const MIN_S3_MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

/// Default staging buffer capacity for multipart writers (2 MB)
pub const DEFAULT_MULTIPART_BUFFER_CAPACITY: usize = 2 * 1024 * 1024;

/// Attempts made for multipart init / part upload / complete before giving up
pub const DEFAULT_UPLOAD_ATTEMPTS: usize = 6;

/// Sleep between upload attempts
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// Default worker count for bucket iteration
pub const DEFAULT_ITER_WORKERS: usize = 16;

/// Default extra attempts per key during bucket iteration
pub const DEFAULT_ITER_RETRIES: usize = 3;

/// Keys buffered ahead of the download workers, per worker
pub const ITER_QUEUE_DEPTH_PER_WORKER: usize = 2;

/// Keys returned per page by the in-memory store's LIST
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Message returned by S3 when a range starts beyond the end of the object
pub const OUT_OF_RANGE_MESSAGE: &str = "Requested Range Not Satisfiable";

/// Environment variable overriding the global runtime thread count
pub const ENV_RT_THREADS: &str = "S3STREAM_RT_THREADS";
