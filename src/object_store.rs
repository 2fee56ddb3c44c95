// src/object_store.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Pluggable object-store abstraction.
// Readers, writers and the bucket iterator only talk to this trait; the wire
// protocol and authentication live in the implementations:
//   - S3ObjectStore     (s3_store.rs)     - AWS SDK, bridged onto the global runtime
//   - MemoryObjectStore (memory_store.rs) - in-process, used by tests and local runs

use std::fmt;
use std::io::Read;

use bytes::Bytes;

use crate::error::StoreResult;
use crate::range::ByteRange;

/// Streaming response body. Reads block until data arrives.
pub type ObjectBody = Box<dyn Read + Send>;

/// Reference to one object, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
}

impl ObjectHandle {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }

    pub fn with_version(mut self, version_id: Option<String>) -> Self {
        self.version_id = version_id;
        self
    }

    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version_id {
            Some(v) => write!(f, "s3://{}/{}?versionId={}", self.bucket, self.key, v),
            None => write!(f, "s3://{}/{}", self.bucket, self.key),
        }
    }
}

/// Result of a GET.
pub struct GetObjectOutput {
    pub body: ObjectBody,
    /// `Content-Range` header, present for ranged requests.
    pub content_range: Option<String>,
    /// Length of this response's body.
    pub content_length: Option<u64>,
}

impl fmt::Debug for GetObjectOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetObjectOutput")
            .field("content_range", &self.content_range)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Options applied when a multipart upload is created.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub content_type: Option<String>,
}

/// A part that has been uploaded and must be listed at completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub e_tag: String,
}

/// One page of a LIST.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub next_token: Option<String>,
}

/// Request/response operations the streaming layer needs from a store.
///
/// All calls block the calling thread until the store answers.
pub trait ObjectStore: Send + Sync {
    /// GET an object, optionally restricted to `range`.
    fn get_object(&self, handle: &ObjectHandle, range: Option<ByteRange>) -> StoreResult<GetObjectOutput>;

    /// HEAD an object, returning its size.
    fn head_object(&self, handle: &ObjectHandle) -> StoreResult<u64>;

    /// PUT a whole object.
    fn put_object(&self, handle: &ObjectHandle, body: Bytes) -> StoreResult<()>;

    /// Start a multipart upload, returning its upload id.
    fn create_multipart_upload(&self, handle: &ObjectHandle, options: &UploadOptions) -> StoreResult<String>;

    /// Upload one part, returning its ETag.
    fn upload_part(&self, handle: &ObjectHandle, upload_id: &str, part_number: i32, body: Bytes) -> StoreResult<String>;

    fn complete_multipart_upload(&self, handle: &ObjectHandle, upload_id: &str, parts: &[CompletedPart]) -> StoreResult<()>;

    fn abort_multipart_upload(&self, handle: &ObjectHandle, upload_id: &str) -> StoreResult<()>;

    /// List one page of keys under `prefix`.
    fn list_objects(&self, bucket: &str, prefix: &str, continuation_token: Option<&str>) -> StoreResult<ListPage>;

    /// Check that a bucket exists and is accessible.
    fn head_bucket(&self, bucket: &str) -> StoreResult<()>;

    /// Download a whole object into memory.
    fn get_object_bytes(&self, handle: &ObjectHandle) -> StoreResult<Bytes> {
        let mut out = self.get_object(handle, None)?;
        let mut buf = Vec::with_capacity(out.content_length.unwrap_or(0) as usize);
        out.body.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}
