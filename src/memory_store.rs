// src/memory_store.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// In-process ObjectStore with S3 semantics: versioned objects, ranged GETs
// with 416 answers, multipart uploads and paginated listings. Faults can be
// injected per operation, and every call is counted, so readers and writers
// can be tested for exactly which requests they issue.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, Cursor, Read};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::constants::{DEFAULT_LIST_PAGE_SIZE, OUT_OF_RANGE_MESSAGE};
use crate::error::{StoreError, StoreResult};
use crate::object_store::{
    CompletedPart, GetObjectOutput, ListPage, ObjectHandle, ObjectStore, UploadOptions,
};
use crate::range::{ByteRange, ContentRange};

/// Store operations, for call counting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Head,
    Put,
    CreateMultipart,
    UploadPart,
    CompleteMultipart,
    AbortMultipart,
    List,
    HeadBucket,
}

#[derive(Debug)]
struct Upload {
    handle: ObjectHandle,
    parts: BTreeMap<i32, (String, Bytes)>,
}

// Versions are kept oldest first; the last one is the current object.
type Versions = Vec<(String, Bytes)>;

#[derive(Debug)]
struct State {
    buckets: HashMap<String, BTreeMap<String, Versions>>,
    uploads: HashMap<String, Upload>,
    next_id: u64,
    calls: HashMap<Op, usize>,
    fail_next: HashMap<Op, usize>,
    truncate_next: usize,
    failing_keys: HashSet<String>,
    report_actual_size: bool,
    page_size: usize,
    get_delay: Duration,
}

/// Thread-safe in-memory object store.
#[derive(Debug)]
pub struct MemoryObjectStore {
    state: Mutex<State>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

fn no_such_bucket(bucket: &str) -> StoreError {
    StoreError::client("NoSuchBucket", format!("The specified bucket does not exist: {bucket}"), Some(404))
}

fn no_such_upload(upload_id: &str) -> StoreError {
    StoreError::client("NoSuchUpload", format!("The specified upload does not exist: {upload_id}"), Some(404))
}

/// Body that yields half the data, then fails as if the peer hung up.
struct TruncatedBody {
    data: Cursor<Bytes>,
}

impl Read for TruncatedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.data.read(buf)? {
            0 if !buf.is_empty() => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-body",
            )),
            n => Ok(n),
        }
    }
}

impl State {
    fn record(&mut self, op: Op) -> StoreResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if let Some(left) = self.fail_next.get_mut(&op) {
            if *left > 0 {
                *left -= 1;
                return Err(StoreError::Connection(format!("injected connection failure on {op:?}")));
            }
        }
        Ok(())
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn bucket_mut(&mut self, bucket: &str) -> StoreResult<&mut BTreeMap<String, Versions>> {
        self.buckets.get_mut(bucket).ok_or_else(|| no_such_bucket(bucket))
    }

    fn lookup(&self, handle: &ObjectHandle) -> StoreResult<Bytes> {
        let objects = self.buckets.get(&handle.bucket).ok_or_else(|| no_such_bucket(&handle.bucket))?;
        let versions = objects.get(&handle.key).ok_or_else(|| {
            StoreError::client("NoSuchKey", format!("The specified key does not exist: {}", handle.key), Some(404))
        })?;
        match &handle.version_id {
            None => Ok(versions.last().map(|(_, data)| data.clone()).unwrap_or_default()),
            Some(wanted) => versions
                .iter()
                .find(|(id, _)| id == wanted)
                .map(|(_, data)| data.clone())
                .ok_or_else(|| {
                    StoreError::client("NoSuchVersion", format!("The specified version does not exist: {wanted}"), Some(404))
                }),
        }
    }

    fn store_version(&mut self, handle: &ObjectHandle, data: Bytes) -> StoreResult<String> {
        let version = self.next_id("v");
        self.bucket_mut(&handle.bucket)?
            .entry(handle.key.clone())
            .or_default()
            .push((version.clone(), data));
        Ok(version)
    }

    fn range_not_satisfiable(&self, len: u64) -> StoreError {
        StoreError::Client {
            code: "InvalidRange".into(),
            message: OUT_OF_RANGE_MESSAGE.into(),
            status: Some(416),
            actual_object_size: self.report_actual_size.then_some(len),
        }
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                buckets: HashMap::new(),
                uploads: HashMap::new(),
                next_id: 0,
                calls: HashMap::new(),
                fail_next: HashMap::new(),
                truncate_next: 0,
                failing_keys: HashSet::new(),
                report_actual_size: true,
                page_size: DEFAULT_LIST_PAGE_SIZE,
                get_delay: Duration::ZERO,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keys returned per LIST page.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.lock().page_size = page_size.max(1);
        self
    }

    /// Leave the real object size out of 416 answers, forcing a HEAD.
    pub fn without_actual_size(self) -> Self {
        self.lock().report_actual_size = false;
        self
    }

    /// Sleep this long in every GET before answering.
    pub fn with_get_delay(self, delay: Duration) -> Self {
        self.lock().get_delay = delay;
        self
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.lock().buckets.entry(bucket.to_string()).or_default();
    }

    /// Store an object directly, creating the bucket if needed. Returns the new version id.
    /// Not counted as a call.
    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Bytes>) -> String {
        let mut state = self.lock();
        state.buckets.entry(bucket.to_string()).or_default();
        // The bucket was just created, so this cannot fail.
        state
            .store_version(&ObjectHandle::new(bucket, key), data.into())
            .unwrap_or_default()
    }

    /// Current content of an object, if it exists.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock().lookup(&ObjectHandle::new(bucket, key)).ok()
    }

    /// Version ids of an object, oldest first.
    pub fn versions(&self, bucket: &str, key: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|v| v.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default()
    }

    /// Multipart uploads that were started but neither completed nor aborted.
    pub fn open_uploads(&self) -> usize {
        self.lock().uploads.len()
    }

    /// Fail the next `n` calls of `op` with a connection error.
    pub fn fail_next(&self, op: Op, n: usize) {
        self.lock().fail_next.insert(op, n);
    }

    /// Truncate the next `n` GET bodies half way through.
    pub fn truncate_next_bodies(&self, n: usize) {
        self.lock().truncate_next = n;
    }

    /// Make every GET of `key` fail with a server error.
    pub fn fail_key(&self, key: &str) {
        self.lock().failing_keys.insert(key.to_string());
    }

    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get_object(&self, handle: &ObjectHandle, range: Option<ByteRange>) -> StoreResult<GetObjectOutput> {
        let delay = {
            let mut state = self.lock();
            state.record(Op::Get)?;
            state.get_delay
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = self.lock();
        if state.failing_keys.contains(&handle.key) {
            return Err(StoreError::client("InternalError", format!("injected failure for {}", handle.key), Some(500)));
        }
        let data = state.lookup(handle)?;
        let len = data.len() as u64;

        let (slice, content_range) = match range {
            None => (data, None),
            Some(range) => {
                let (start, end) = match range {
                    ByteRange::From(start) => (start, len.saturating_sub(1)),
                    ByteRange::Bounded(start, end) => (start, end.min(len.saturating_sub(1))),
                    ByteRange::Suffix(n) => {
                        if n == 0 {
                            return Err(state.range_not_satisfiable(len));
                        }
                        (len.saturating_sub(n), len.saturating_sub(1))
                    }
                };
                if len == 0 || start >= len || start > end {
                    return Err(state.range_not_satisfiable(len));
                }
                let cr = ContentRange::new(start, end, len);
                (data.slice(start as usize..=end as usize), Some(cr.to_string()))
            }
        };
        trace!("memory GET {handle} -> {} bytes", slice.len());

        let content_length = Some(slice.len() as u64);
        let body: Box<dyn Read + Send> = if state.truncate_next > 0 {
            state.truncate_next -= 1;
            let half = slice.slice(..slice.len() / 2);
            Box::new(TruncatedBody { data: Cursor::new(half) })
        } else {
            Box::new(Cursor::new(slice))
        };

        Ok(GetObjectOutput { body, content_range, content_length })
    }

    fn head_object(&self, handle: &ObjectHandle) -> StoreResult<u64> {
        let mut state = self.lock();
        state.record(Op::Head)?;
        Ok(state.lookup(handle)?.len() as u64)
    }

    fn put_object(&self, handle: &ObjectHandle, body: Bytes) -> StoreResult<()> {
        let mut state = self.lock();
        state.record(Op::Put)?;
        state.store_version(handle, body)?;
        Ok(())
    }

    fn create_multipart_upload(&self, handle: &ObjectHandle, _options: &UploadOptions) -> StoreResult<String> {
        let mut state = self.lock();
        state.record(Op::CreateMultipart)?;
        state.bucket_mut(&handle.bucket)?;
        let upload_id = state.next_id("upload-");
        state.uploads.insert(
            upload_id.clone(),
            Upload { handle: handle.clone(), parts: BTreeMap::new() },
        );
        Ok(upload_id)
    }

    fn upload_part(&self, _handle: &ObjectHandle, upload_id: &str, part_number: i32, body: Bytes) -> StoreResult<String> {
        let mut state = self.lock();
        state.record(Op::UploadPart)?;
        if !(1..=10_000).contains(&part_number) {
            return Err(StoreError::client("InvalidArgument", format!("part number {part_number} out of range"), Some(400)));
        }
        let e_tag = format!("\"{upload_id}-{part_number}-{}\"", body.len());
        let upload = state.uploads.get_mut(upload_id).ok_or_else(|| no_such_upload(upload_id))?;
        upload.parts.insert(part_number, (e_tag.clone(), body));
        Ok(e_tag)
    }

    fn complete_multipart_upload(&self, _handle: &ObjectHandle, upload_id: &str, parts: &[CompletedPart]) -> StoreResult<()> {
        let mut state = self.lock();
        state.record(Op::CompleteMultipart)?;
        if parts.is_empty() {
            return Err(StoreError::client(
                "MalformedXML",
                "The XML you provided was not well-formed or did not validate against our published schema",
                Some(400),
            ));
        }
        let upload = state.uploads.get(upload_id).ok_or_else(|| no_such_upload(upload_id))?;
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(StoreError::client("InvalidPartOrder", "parts must be listed in ascending order", Some(400)));
        }

        let mut data = BytesMut::new();
        for part in parts {
            match upload.parts.get(&part.part_number) {
                Some((e_tag, body)) if *e_tag == part.e_tag => data.extend_from_slice(body),
                _ => {
                    return Err(StoreError::client(
                        "InvalidPart",
                        format!("part {} was not uploaded or its ETag does not match", part.part_number),
                        Some(400),
                    ));
                }
            }
        }

        let handle = upload.handle.clone();
        state.uploads.remove(upload_id);
        state.store_version(&handle, data.freeze())?;
        Ok(())
    }

    fn abort_multipart_upload(&self, _handle: &ObjectHandle, upload_id: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.record(Op::AbortMultipart)?;
        state
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| no_such_upload(upload_id))
    }

    fn list_objects(&self, bucket: &str, prefix: &str, continuation_token: Option<&str>) -> StoreResult<ListPage> {
        let mut state = self.lock();
        state.record(Op::List)?;
        let page_size = state.page_size;
        let objects = state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;

        // The token is the last key of the previous page.
        let mut matching = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| continuation_token.is_none_or(|t| k.as_str() > t));
        let keys: Vec<String> = matching.by_ref().take(page_size).cloned().collect();
        let next_token = match (matching.next(), keys.last()) {
            (Some(_), Some(last)) => Some(last.clone()),
            _ => None,
        };
        Ok(ListPage { keys, next_token })
    }

    fn head_bucket(&self, bucket: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.record(Op::HeadBucket)?;
        if state.buckets.contains_key(bucket) {
            Ok(())
        } else {
            Err(no_such_bucket(bucket))
        }
    }
}
