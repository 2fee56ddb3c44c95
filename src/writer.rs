// src/writer.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Common writer interface and the scoped close-or-terminate helper.

use tracing::warn;

use crate::error::Result;

/// A writer that must be finished with exactly one of `close` or `terminate`.
pub trait ObjectWriter {
    /// Accept `data`; returns the number of bytes taken (always all of them).
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Persist everything written so far.
    fn close(&mut self) -> Result<()>;

    /// Discard everything written so far.
    fn terminate(&mut self) -> Result<()>;

    /// Total bytes written.
    fn tell(&self) -> u64;
}

/// Run `f` against `writer`, then close it on success or terminate it on error.
///
/// The error from `f` wins over any error raised while terminating; the
/// latter is only logged.
///
/// ```no_run
/// use std::sync::Arc;
/// use s3stream::{with_writer, MemoryObjectStore, MultipartConfig, MultipartWriter, ObjectWriter};
///
/// let store = Arc::new(MemoryObjectStore::new());
/// store.create_bucket("bucket");
/// let writer = MultipartWriter::new(store, "bucket", "out.bin", MultipartConfig::default()).unwrap();
/// with_writer(writer, |w| {
///     w.write(b"payload")?;
///     Ok(())
/// })
/// .unwrap();
/// ```
pub fn with_writer<W, T, F>(mut writer: W, f: F) -> Result<T>
where
    W: ObjectWriter,
    F: FnOnce(&mut W) -> Result<T>,
{
    match f(&mut writer) {
        Ok(value) => {
            writer.close()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(term_err) = writer.terminate() {
                warn!("terminate after failed write also failed: {term_err}");
            }
            Err(e)
        }
    }
}
