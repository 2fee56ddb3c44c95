// src/raw_reader.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Unbuffered, seekable reader over one object, built on ranged GETs.
//
// Every seek drops the open body and starts a new ranged request. The
// content length is learned from the first Content-Range (or from a 416
// answer) and never changes afterwards.

use std::io::{Read, SeekFrom};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::bytebuffer::ChunkSource;
use crate::error::{is_incomplete_read, Error, Result, StoreError};
use crate::object_store::{ObjectBody, ObjectHandle, ObjectStore};
use crate::range::{ByteRange, ContentRange};

pub struct RangeReader {
    store: Arc<dyn ObjectStore>,
    handle: ObjectHandle,
    position: u64,
    content_length: Option<u64>,
    /// `None` means the next read has to open a new ranged request.
    body: Option<ObjectBody>,
}

impl std::fmt::Debug for RangeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeReader")
            .field("handle", &self.handle)
            .field("position", &self.position)
            .field("content_length", &self.content_length)
            .field("body_open", &self.body.is_some())
            .finish()
    }
}

impl RangeReader {
    pub fn new(store: Arc<dyn ObjectStore>, handle: ObjectHandle) -> Self {
        Self {
            store,
            handle,
            position: 0,
            content_length: None,
            body: None,
        }
    }

    pub fn handle(&self) -> &ObjectHandle {
        &self.handle
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Object size, once a request has revealed it.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Move to a new position and open a body there.
    ///
    /// Negative `Current` offsets clamp at 0. `End(n)` reads the last `-n`
    /// bytes; a positive `n` behaves like `End(0)`. When the length is already
    /// known and the target is at or past the end, no request is made.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.body = None;

        let range = match pos {
            SeekFrom::Start(offset) => ByteRange::From(offset),
            SeekFrom::Current(offset) => ByteRange::From(self.position.saturating_add_signed(offset)),
            SeekFrom::End(offset) => ByteRange::Suffix(offset.min(0).unsigned_abs()),
        };

        let reached_eof = match (self.content_length, range) {
            (Some(len), ByteRange::From(start)) => start >= len,
            (Some(_), ByteRange::Suffix(0)) => true,
            _ => false,
        };

        if reached_eof {
            self.position = self.content_length.unwrap_or(self.position);
            self.body = Some(Box::new(std::io::empty()));
        } else {
            self.open_body(range)?;
        }
        Ok(self.position)
    }

    fn open_body(&mut self, range: ByteRange) -> Result<()> {
        debug!("range_string: {}", range.to_header());

        match self.store.get_object(&self.handle, Some(range)) {
            Ok(resp) => {
                let header = resp.content_range.ok_or_else(|| {
                    Error::Protocol(format!("ranged GET of {} returned no Content-Range", self.handle))
                })?;
                let cr = ContentRange::parse(&header)?;
                self.check_length(cr.total)?;
                self.content_length = Some(cr.total);
                self.position = cr.start;
                self.body = Some(resp.body);
                Ok(())
            }
            Err(e) if e.is_range_not_satisfiable() => {
                // The start lies past the end; settle at EOF instead of failing.
                let size = match e.actual_object_size() {
                    Some(size) => size,
                    None => self
                        .store
                        .head_object(&self.handle)
                        .map_err(|e| self.access_error(e))?,
                };
                debug!("{} is {size} bytes; requested range is past the end", self.handle);
                self.check_length(size)?;
                self.content_length = Some(size);
                self.position = size;
                self.body = Some(Box::new(std::io::empty()));
                Ok(())
            }
            Err(e) => Err(self.access_error(e)),
        }
    }

    fn check_length(&self, total: u64) -> Result<()> {
        match self.content_length {
            Some(known) if known != total => Err(Error::Protocol(format!(
                "size of {} changed from {known} to {total} while reading",
                self.handle
            ))),
            _ => Ok(()),
        }
    }

    fn access_error(&self, e: StoreError) -> Error {
        Error::store(
            format!(
                "unable to access bucket: {:?} key: {:?} version: {:?} error: {e}",
                self.handle.bucket, self.handle.key, self.handle.version_id
            ),
            e,
        )
    }

    fn read_from_body(&mut self, size: Option<usize>) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(body) = self.body.as_mut() {
            match size {
                Some(n) => {
                    buf.reserve(n);
                    body.take(n as u64).read_to_end(&mut buf)?;
                }
                None => {
                    body.read_to_end(&mut buf)?;
                }
            }
        }
        Ok(buf)
    }

    /// Read up to `size` bytes, or everything left when `size` is `None`.
    ///
    /// Returns empty bytes at EOF, as often as it is asked. A body that drops
    /// mid-transfer is reopened at the current position and read once more.
    pub fn read(&mut self, size: Option<usize>) -> Result<Bytes> {
        if self.body.is_none() {
            self.open_body(ByteRange::From(self.position))?;
        }

        let content_length = self.content_length.ok_or_else(|| {
            Error::Protocol(format!("content length of {} is unknown after opening it", self.handle))
        })?;
        if self.position >= content_length {
            return Ok(Bytes::new());
        }

        let data = match self.read_from_body(size) {
            Ok(data) => data,
            Err(e) if is_incomplete_read(&e) => {
                warn!("connection to {} dropped mid-body ({e}); reopening at {}", self.handle, self.position);
                self.open_body(ByteRange::From(self.position))?;
                self.read_from_body(size).map_err(|e| {
                    Error::store(
                        format!("reading {} failed twice at offset {}", self.handle, self.position),
                        StoreError::Body(e),
                    )
                })?
            }
            Err(e) => {
                return Err(Error::store(format!("reading {} failed", self.handle), StoreError::Body(e)));
            }
        };

        self.position += data.len() as u64;
        Ok(Bytes::from(data))
    }
}

impl ChunkSource for RangeReader {
    fn read_chunk(&mut self, size: usize) -> Result<Bytes> {
        self.read(Some(size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::{MemoryObjectStore, Op};

    fn setup(data: &'static [u8]) -> (Arc<MemoryObjectStore>, RangeReader) {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("bucket", "key", data);
        let reader = RangeReader::new(store.clone(), ObjectHandle::new("bucket", "key"));
        (store, reader)
    }

    #[test]
    fn first_read_opens_a_body() {
        let (store, mut r) = setup(b"hello world");
        assert_eq!(&r.read(Some(5)).unwrap()[..], b"hello");
        assert_eq!(r.content_length(), Some(11));
        assert_eq!(&r.read(None).unwrap()[..], b" world");
        assert_eq!(r.position(), 11);
        assert_eq!(store.calls(Op::Get), 1);
    }

    #[test]
    fn seek_from_end_uses_a_suffix_range() {
        let (_, mut r) = setup(b"0123456789");
        assert_eq!(r.seek(SeekFrom::End(-4)).unwrap(), 6);
        assert_eq!(&r.read(None).unwrap()[..], b"6789");
    }

    #[test]
    fn seek_current_clamps_at_zero() {
        let (_, mut r) = setup(b"0123456789");
        r.seek(SeekFrom::Start(3)).unwrap();
        assert_eq!(r.seek(SeekFrom::Current(-10)).unwrap(), 0);
        assert_eq!(&r.read(Some(2)).unwrap()[..], b"01");
    }

    #[test]
    fn seek_past_end_without_known_length_recovers_from_416() {
        let (store, mut r) = setup(b"abc");
        assert_eq!(r.seek(SeekFrom::Start(50)).unwrap(), 3);
        assert!(r.read(Some(10)).unwrap().is_empty());
        assert_eq!(store.calls(Op::Head), 0);
    }

    #[test]
    fn missing_size_hint_falls_back_to_head() {
        let store = Arc::new(MemoryObjectStore::new().without_actual_size());
        store.put("bucket", "key", &b"abc"[..]);
        let mut r = RangeReader::new(store.clone(), ObjectHandle::new("bucket", "key"));
        assert_eq!(r.seek(SeekFrom::Start(7)).unwrap(), 3);
        assert_eq!(store.calls(Op::Head), 1);
    }

    #[test]
    fn seek_past_known_end_makes_no_request() {
        let (store, mut r) = setup(b"abc");
        r.read(Some(1)).unwrap();
        store.reset_calls();

        assert_eq!(r.seek(SeekFrom::Start(3)).unwrap(), 3);
        assert_eq!(r.seek(SeekFrom::End(0)).unwrap(), 3);
        assert!(r.read(None).unwrap().is_empty());
        assert_eq!(store.total_calls(), 0);
    }

    #[test]
    fn empty_object() {
        let (_, mut r) = setup(b"");
        assert!(r.read(None).unwrap().is_empty());
        assert_eq!(r.content_length(), Some(0));
    }

    #[test]
    fn dropped_body_is_reopened_once() {
        let (store, mut r) = setup(b"0123456789");
        store.truncate_next_bodies(1);
        assert_eq!(&r.read(None).unwrap()[..], b"0123456789");
        assert_eq!(store.calls(Op::Get), 2);
    }

    #[test]
    fn missing_key_is_an_io_failure_with_cause() {
        let store = Arc::new(MemoryObjectStore::new());
        store.create_bucket("bucket");
        let mut r = RangeReader::new(store, ObjectHandle::new("bucket", "nope"));
        let err = r.read(None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Io);
        assert_eq!(err.backend_error().and_then(StoreError::code), Some("NoSuchKey"));
    }
}
