// tests/common/mod.rs
//
// Shared helpers: an in-memory store with a seeded bucket, deterministic
// payloads and a retry policy that does not sleep.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use s3stream::{
    ByteRange, CompletedPart, GetObjectOutput, ListPage, MemoryObjectStore, MultipartConfig, ObjectHandle,
    ObjectStore, RetryPolicy, StoreResult, UploadOptions,
};

pub const BUCKET: &str = "test-bucket";

/// Store with `BUCKET` already created.
pub fn store() -> Arc<MemoryObjectStore> {
    let store = Arc::new(MemoryObjectStore::new());
    store.create_bucket(BUCKET);
    store
}

/// `len` pseudo-random bytes, the same for the same seed.
pub fn payload(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf[..]);
    buf
}

/// Three tries, no backoff.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::ZERO)
}

pub fn multipart_cfg(min_part_size: usize) -> MultipartConfig {
    MultipartConfig {
        min_part_size,
        retry: fast_retry(),
        ..Default::default()
    }
}

/// Split `data` into chunks whose sizes cycle through `sizes`.
pub fn chunks<'a>(data: &'a [u8], sizes: &[usize]) -> Vec<&'a [u8]> {
    let mut out = Vec::new();
    let mut offset = 0;
    let mut i = 0;
    while offset < data.len() {
        let n = sizes[i % sizes.len()].max(1).min(data.len() - offset);
        out.push(&data[offset..offset + n]);
        offset += n;
        i += 1;
    }
    out
}

/// Wraps a `MemoryObjectStore`, recording part sizes and the peak number
/// of GETs running at the same time.
pub struct RecordingStore {
    pub inner: Arc<MemoryObjectStore>,
    part_sizes: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingStore {
    pub fn new(inner: Arc<MemoryObjectStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            part_sizes: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn part_sizes(&self) -> Vec<usize> {
        self.part_sizes.lock().unwrap().clone()
    }

    pub fn peak_gets(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ObjectStore for RecordingStore {
    fn get_object(&self, handle: &ObjectHandle, range: Option<ByteRange>) -> StoreResult<GetObjectOutput> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let out = self.inner.get_object(handle, range);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }

    fn head_object(&self, handle: &ObjectHandle) -> StoreResult<u64> {
        self.inner.head_object(handle)
    }

    fn put_object(&self, handle: &ObjectHandle, body: Bytes) -> StoreResult<()> {
        self.inner.put_object(handle, body)
    }

    fn create_multipart_upload(&self, handle: &ObjectHandle, options: &UploadOptions) -> StoreResult<String> {
        self.inner.create_multipart_upload(handle, options)
    }

    fn upload_part(&self, handle: &ObjectHandle, upload_id: &str, part_number: i32, body: Bytes) -> StoreResult<String> {
        let len = body.len();
        let e_tag = self.inner.upload_part(handle, upload_id, part_number, body)?;
        self.part_sizes.lock().unwrap().push(len);
        Ok(e_tag)
    }

    fn complete_multipart_upload(&self, handle: &ObjectHandle, upload_id: &str, parts: &[CompletedPart]) -> StoreResult<()> {
        self.inner.complete_multipart_upload(handle, upload_id, parts)
    }

    fn abort_multipart_upload(&self, handle: &ObjectHandle, upload_id: &str) -> StoreResult<()> {
        self.inner.abort_multipart_upload(handle, upload_id)
    }

    fn list_objects(&self, bucket: &str, prefix: &str, continuation_token: Option<&str>) -> StoreResult<ListPage> {
        self.inner.list_objects(bucket, prefix, continuation_token)
    }

    fn head_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.inner.head_bucket(bucket)
    }
}
