// src/singlepart.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Writer that buffers the whole object in memory and PUTs it once on close.
// Suited to small objects, or stores without multipart support.

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{Error, Result, StoreError, StoreErrorKind};
use crate::object_store::{ObjectHandle, ObjectStore};
use crate::writer::ObjectWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Closed,
    Terminated,
}

pub struct SinglepartWriter {
    store: Arc<dyn ObjectStore>,
    handle: ObjectHandle,
    buf: BytesMut,
    total_bytes: u64,
    state: WriterState,
}

impl std::fmt::Debug for SinglepartWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinglepartWriter")
            .field("handle", &self.handle)
            .field("total_bytes", &self.total_bytes)
            .field("state", &self.state)
            .finish()
    }
}

fn unreachable_bucket(bucket: &str, e: StoreError) -> Error {
    let message = format!("the bucket {bucket:?} does not exist, or is forbidden for access");
    if e.kind() == StoreErrorKind::Client {
        Error::Config { message, source: Some(e) }
    } else {
        Error::store(message, e)
    }
}

impl SinglepartWriter {
    /// Check that `bucket` is reachable, then return an empty writer.
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str, key: &str) -> Result<Self> {
        store.head_bucket(bucket).map_err(|e| unreachable_bucket(bucket, e))?;
        Ok(Self {
            store,
            handle: ObjectHandle::new(bucket, key),
            buf: BytesMut::new(),
            total_bytes: 0,
            state: WriterState::Open,
        })
    }

    pub fn name(&self) -> &str {
        &self.handle.key
    }

    pub fn tell(&self) -> u64 {
        self.total_bytes
    }

    pub fn is_closed(&self) -> bool {
        self.state != WriterState::Open
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.state != WriterState::Open {
            return Err(Error::io(format!("cannot write to {}: writer is closed", self.handle)));
        }
        self.buf.extend_from_slice(data);
        self.total_bytes += data.len() as u64;
        Ok(data.len())
    }

    /// PUT the buffered payload. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            WriterState::Closed => return Ok(()),
            WriterState::Terminated => {
                return Err(Error::io(format!("cannot close {}: writer was terminated", self.handle)));
            }
            WriterState::Open => {}
        }

        let body: Bytes = self.buf.split().freeze();
        debug!("PUT {} ({} bytes)", self.handle, body.len());
        if let Err(e) = self.store.put_object(&self.handle, body.clone()) {
            // keep the payload so close() can be retried
            self.buf.extend_from_slice(&body);
            return Err(unreachable_bucket(&self.handle.bucket, e));
        }
        self.state = WriterState::Closed;
        Ok(())
    }

    /// Drop the buffered payload without writing anything.
    pub fn terminate(&mut self) -> Result<()> {
        if self.state == WriterState::Open {
            self.buf.clear();
            self.state = WriterState::Terminated;
        }
        Ok(())
    }
}

impl ObjectWriter for SinglepartWriter {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        SinglepartWriter::write(self, data)
    }

    fn close(&mut self) -> Result<()> {
        SinglepartWriter::close(self)
    }

    fn terminate(&mut self) -> Result<()> {
        SinglepartWriter::terminate(self)
    }

    fn tell(&self) -> u64 {
        SinglepartWriter::tell(self)
    }
}

impl io::Write for SinglepartWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(SinglepartWriter::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
