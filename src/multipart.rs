// src/multipart.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Sequential Multipart Upload (MPU) writer.
//
// Design:
// - MultipartWriter turns a byte stream into numbered parts:
//     - write() stages bytes and uploads the whole staging buffer as one part
//       once it reaches min_part_size
//     - close() uploads any tail and issues CompleteMultipartUpload
//     - terminate() aborts the MPU; also runs on Drop if still uploading and abort_on_drop
// - Init, part upload and completion go through the configured RetryPolicy.
// - Closing after zero bytes aborts the MPU and PUTs an empty object instead,
//   because stores reject a completion with no parts.

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::MultipartConfig;
use crate::constants::{DEFAULT_MULTIPART_BUFFER_CAPACITY, MIN_S3_MULTIPART_PART_SIZE};
use crate::error::{Error, Result, StoreErrorKind};
use crate::object_store::{CompletedPart, ObjectHandle, ObjectStore, UploadOptions};
use crate::writer::ObjectWriter;

/// Lifecycle of a multipart session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Open,
    Uploading,
    Completed,
    Aborted,
}

/// Streaming writer for one object via the multipart API.
pub struct MultipartWriter {
    store: Arc<dyn ObjectStore>,
    handle: ObjectHandle,
    upload_id: String,
    cfg: MultipartConfig,

    // staging
    buf: Vec<u8>,
    next_part_number: i32,
    total_bytes: u64,

    parts: Vec<CompletedPart>,
    state: UploadState,
}

impl fmt::Debug for MultipartWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartWriter")
            .field("handle", &self.handle)
            .field("upload_id", &self.upload_id)
            .field("min_part_size", &self.cfg.min_part_size)
            .field("staged", &self.buf.len())
            .field("total_bytes", &self.total_bytes)
            .field("parts", &self.parts.len())
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for MultipartWriter {
    fn drop(&mut self) {
        if self.state != UploadState::Uploading || !self.cfg.abort_on_drop {
            return;
        }
        warn!("{} dropped before close(); aborting multipart upload {}", self.handle, self.upload_id);
        if let Err(e) = self.store.abort_multipart_upload(&self.handle, &self.upload_id) {
            warn!("abort of multipart upload {} failed: {e}", self.upload_id);
        }
        self.state = UploadState::Aborted;
    }
}

impl MultipartWriter {
    /// Start a multipart upload for `bucket/key`.
    ///
    /// Fails with a `Config` error if the store rejects the upload (missing
    /// bucket, no access), or with `Io` if the endpoint stays unreachable.
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str, key: &str, cfg: MultipartConfig) -> Result<Self> {
        if cfg.min_part_size < MIN_S3_MULTIPART_PART_SIZE {
            warn!("S3 requires minimum part size >= 5MB; multipart upload may fail");
        }
        if cfg.min_part_size == 0 {
            return Err(Error::config("min_part_size must be >= 1"));
        }

        let handle = ObjectHandle::new(bucket, key);
        let options = UploadOptions { content_type: cfg.content_type.clone() };

        let mut writer = Self {
            store,
            handle,
            upload_id: String::new(),
            buf: Vec::with_capacity(DEFAULT_MULTIPART_BUFFER_CAPACITY.min(cfg.min_part_size)),
            cfg,
            next_part_number: 1,
            total_bytes: 0,
            parts: Vec::new(),
            state: UploadState::Open,
        };

        let upload_id = writer
            .cfg
            .retry
            .run("CreateMultipartUpload", || writer.store.create_multipart_upload(&writer.handle, &options))
            .map_err(|e| match e.backend_error().map(|b| b.kind()) {
                Some(StoreErrorKind::Client) => e.into_config(format!(
                    "the bucket {:?} does not exist, or is forbidden for access",
                    bucket
                )),
                _ => e,
            })?;
        debug!("started multipart upload {upload_id} for {}", writer.handle);

        writer.upload_id = upload_id;
        writer.state = UploadState::Uploading;
        Ok(writer)
    }

    pub fn name(&self) -> &str {
        &self.handle.key
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Parts uploaded so far, in upload order.
    pub fn parts(&self) -> &[CompletedPart] {
        &self.parts
    }

    pub fn total_parts(&self) -> usize {
        self.parts.len()
    }

    /// Total bytes accepted by `write`.
    pub fn tell(&self) -> u64 {
        self.total_bytes
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, UploadState::Completed | UploadState::Aborted)
    }

    fn ensure_uploading(&self, what: &str) -> Result<()> {
        match self.state {
            UploadState::Uploading => Ok(()),
            state => Err(Error::io(format!("cannot {what} {}: upload is {state:?}", self.handle))),
        }
    }

    /// Stage `data`; uploads a part once enough is staged. Returns `data.len()`.
    ///
    /// If the part upload fails, `data` stays staged and counted in `tell()`;
    /// the next write or `close` retries the same part.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_uploading("write to")?;
        self.buf.extend_from_slice(data);
        self.total_bytes += data.len() as u64;

        if self.buf.len() >= self.cfg.min_part_size {
            self.upload_next_part()?;
        }
        Ok(data.len())
    }

    fn upload_next_part(&mut self) -> Result<()> {
        let part_number = self.next_part_number;
        let body = Bytes::from(std::mem::take(&mut self.buf));
        info!(
            "uploading part #{part_number}, {} bytes (total {:.3}GB)",
            body.len(),
            self.total_bytes as f64 / 1024f64.powi(3)
        );

        // Bytes clones are cheap, so each retry re-sends the same buffer.
        let result = self.cfg.retry.run("UploadPart", || {
            self.store
                .upload_part(&self.handle, &self.upload_id, part_number, body.clone())
        });
        let e_tag = match result {
            Ok(e_tag) => e_tag,
            Err(e) => {
                // Keep the staged bytes; the next flush retries the same part number.
                self.buf = Vec::from(body);
                return Err(e);
            }
        };

        self.parts.push(CompletedPart { part_number, e_tag });
        self.next_part_number += 1;
        debug!("upload of part #{part_number} finished");
        Ok(())
    }

    /// Upload the tail and complete the upload.
    ///
    /// With nothing written, the upload is aborted and an empty object is
    /// PUT instead. Closing a completed writer is a no-op.
    pub fn close(&mut self) -> Result<()> {
        debug!("closing {}", self.handle);
        match self.state {
            UploadState::Completed => return Ok(()),
            UploadState::Aborted => {
                return Err(Error::io(format!("cannot close {}: upload was aborted", self.handle)));
            }
            UploadState::Open | UploadState::Uploading => {}
        }

        if !self.buf.is_empty() {
            self.upload_next_part()?;
        }

        if self.total_bytes > 0 {
            self.cfg.retry.run("CompleteMultipartUpload", || {
                self.store
                    .complete_multipart_upload(&self.handle, &self.upload_id, &self.parts)
            })?;
            debug!("completed multipart upload {}", self.upload_id);
        } else {
            info!("empty input, ignoring multipart upload");
            self.store
                .abort_multipart_upload(&self.handle, &self.upload_id)
                .map_err(|e| Error::store(format!("aborting empty upload of {} failed", self.handle), e))?;
            self.state = UploadState::Aborted;
            self.store
                .put_object(&self.handle, Bytes::new())
                .map_err(|e| Error::store(format!("writing empty object {} failed", self.handle), e))?;
        }

        self.state = UploadState::Completed;
        debug!("successfully closed {}", self.handle);
        Ok(())
    }

    /// Abort the upload. Safe before any part is uploaded, and a no-op once
    /// the writer is closed or already aborted.
    pub fn terminate(&mut self) -> Result<()> {
        if self.state != UploadState::Uploading {
            return Ok(());
        }
        self.state = UploadState::Aborted;
        self.buf.clear();
        self.store
            .abort_multipart_upload(&self.handle, &self.upload_id)
            .map_err(|e| Error::store(format!("aborting multipart upload {} failed", self.upload_id), e))
    }
}

impl ObjectWriter for MultipartWriter {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        MultipartWriter::write(self, data)
    }

    fn close(&mut self) -> Result<()> {
        MultipartWriter::close(self)
    }

    fn terminate(&mut self) -> Result<()> {
        MultipartWriter::terminate(self)
    }

    fn tell(&self) -> u64 {
        MultipartWriter::tell(self)
    }
}

impl io::Write for MultipartWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(MultipartWriter::write(self, buf)?)
    }

    // Parts are only cut at min_part_size; flushing early would create undersized parts.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::{MemoryObjectStore, Op};
    use crate::retry::RetryPolicy;
    use std::time::Duration;

    fn cfg(min_part_size: usize) -> MultipartConfig {
        MultipartConfig {
            min_part_size,
            retry: RetryPolicy::new(3, Duration::ZERO),
            ..Default::default()
        }
    }

    fn store() -> Arc<MemoryObjectStore> {
        let s = Arc::new(MemoryObjectStore::new());
        s.create_bucket("b");
        s
    }

    #[test]
    fn starts_in_uploading_state() {
        let s = store();
        let w = MultipartWriter::new(s.clone(), "b", "k", cfg(5)).unwrap();
        assert_eq!(w.state(), UploadState::Uploading);
        assert!(!w.upload_id().is_empty());
        assert_eq!(s.calls(Op::CreateMultipart), 1);
    }

    #[test]
    fn staging_buffer_is_flushed_whole() {
        let s = store();
        let mut w = MultipartWriter::new(s.clone(), "b", "k", cfg(5)).unwrap();
        w.write(b"abcdefgh").unwrap();
        // one part holding all 8 staged bytes, not a 5 + 3 split
        assert_eq!(w.total_parts(), 1);
        assert_eq!(w.parts()[0].part_number, 1);
        w.close().unwrap();
        assert_eq!(&s.object("b", "k").unwrap()[..], b"abcdefgh");
    }

    #[test]
    fn write_after_close_fails() {
        let s = store();
        let mut w = MultipartWriter::new(s, "b", "k", cfg(5)).unwrap();
        w.write(b"x").unwrap();
        w.close().unwrap();
        assert_eq!(w.write(b"y").unwrap_err().kind(), crate::ErrorKind::Io);
        // closing twice is fine
        w.close().unwrap();
    }

    #[test]
    fn close_after_terminate_fails() {
        let s = store();
        let mut w = MultipartWriter::new(s.clone(), "b", "k", cfg(5)).unwrap();
        w.write(b"abc").unwrap();
        w.terminate().unwrap();
        assert_eq!(w.state(), UploadState::Aborted);
        assert!(w.close().is_err());
        // terminate is idempotent
        w.terminate().unwrap();
        assert_eq!(s.calls(Op::AbortMultipart), 1);
        assert!(s.object("b", "k").is_none());
    }

    #[test]
    fn io_write_trait() {
        use std::io::Write;
        let s = store();
        let mut w = MultipartWriter::new(s.clone(), "b", "k", cfg(4)).unwrap();
        write!(w, "hello {}", 42).unwrap();
        w.flush().unwrap();
        w.close().unwrap();
        assert_eq!(&s.object("b", "k").unwrap()[..], b"hello 42");
    }
}
