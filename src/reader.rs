// src/reader.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Buffered, seekable reader for one S3 object.
//!
//! Reads are served from a lookahead [`ByteBuffer`] whenever possible, so a
//! run of small reads costs one ranged GET per `buffer_size` bytes rather
//! than one per call.
//!
//! ```no_run
//! use std::sync::Arc;
//! use s3stream::{MemoryObjectStore, Reader, ReaderConfig};
//!
//! let store = Arc::new(MemoryObjectStore::new());
//! store.put("bucket", "lines.txt", &b"one\ntwo\n"[..]);
//! let mut r = Reader::new(store, "bucket", "lines.txt", ReaderConfig::default()).unwrap();
//! assert_eq!(&r.readline(None).unwrap()[..], b"one\n");
//! ```

use std::io::{self, SeekFrom};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::bytebuffer::ByteBuffer;
use crate::config::ReaderConfig;
use crate::error::{Error, Result};
use crate::object_store::{ObjectHandle, ObjectStore};
use crate::raw_reader::RangeReader;

#[derive(Debug)]
pub struct Reader {
    raw: RangeReader,
    buffer: ByteBuffer,
    /// Logical position: raw position minus what is still buffered.
    position: u64,
    eof: bool,
    line_terminator: Vec<u8>,
    name: String,
}

impl Reader {
    /// Open `bucket/key` for reading.
    ///
    /// Unless `config.defer_seek` is set this positions at offset 0, which
    /// issues one GET and learns the object size.
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str, key: &str, config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        let handle = ObjectHandle::new(bucket, key).with_version(config.version_id);
        let mut reader = Self {
            raw: RangeReader::new(store, handle),
            buffer: ByteBuffer::new(config.buffer_size),
            position: 0,
            eof: false,
            line_terminator: config.line_terminator,
            name: key.to_string(),
        };
        if !config.defer_seek {
            reader.seek(SeekFrom::Start(0))?;
        }
        Ok(reader)
    }

    /// Object key.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &ObjectHandle {
        self.raw.handle()
    }

    pub fn version_id(&self) -> Option<&str> {
        self.raw.handle().version_id.as_deref()
    }

    /// Object size, if known yet.
    pub fn content_length(&self) -> Option<u64> {
        self.raw.content_length()
    }

    pub fn readable(&self) -> bool {
        true
    }

    pub fn seekable(&self) -> bool {
        true
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Read up to `size` bytes; `None` reads to the end of the object.
    pub fn read(&mut self, size: Option<usize>) -> Result<Bytes> {
        let size = match size {
            Some(0) => return Ok(Bytes::new()),
            Some(n) => n,
            None => {
                let buffered = self.read_from_buffer(None);
                let rest = self.raw.read(None)?;
                // Trust the raw reader's length, not incremental tracking.
                self.position = self.raw.content_length().unwrap_or(self.position + rest.len() as u64);
                self.eof = true;
                if buffered.is_empty() {
                    return Ok(rest);
                }
                let mut out = BytesMut::with_capacity(buffered.len() + rest.len());
                out.extend_from_slice(&buffered);
                out.extend_from_slice(&rest);
                return Ok(out.freeze());
            }
        };

        if self.buffer.len() >= size {
            return Ok(self.read_from_buffer(Some(size)));
        }
        if self.eof {
            return Ok(self.read_from_buffer(None));
        }

        self.fill_buffer(size)?;
        Ok(self.read_from_buffer(Some(size)))
    }

    /// Same as [`read`](Self::read).
    pub fn read1(&mut self, size: Option<usize>) -> Result<Bytes> {
        self.read(size)
    }

    /// Read up to `buf.len()` bytes into `buf`, returning the count.
    pub fn readinto(&mut self, buf: &mut [u8]) -> Result<usize> {
        let data = self.read(Some(buf.len()))?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    /// Read through the next line terminator (inclusive), or to EOF.
    ///
    /// Only unlimited reads are supported; `Some(limit)` fails with `Unsupported`.
    pub fn readline(&mut self, limit: Option<usize>) -> Result<Bytes> {
        if limit.is_some() {
            return Err(Error::unsupported("readline with a limit"));
        }

        // A line may span several fills; keep filling until the terminator
        // is buffered, so a multi-byte terminator is never split. Each pass
        // only searches what the previous one has not, minus an overlap for
        // a terminator straddling the boundary.
        let overlap = self.line_terminator.len() - 1;
        let mut scanned = 0;
        loop {
            if self.eof || self.buffer.contains_from(&self.line_terminator, scanned) {
                let line = self.buffer.readline(&self.line_terminator);
                self.position += line.len() as u64;
                return Ok(line);
            }
            scanned = self.buffer.len().saturating_sub(overlap);
            self.fill_buffer(self.buffer.len() + 1)?;
        }
    }

    /// Move to a new position; returns it.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        debug!("seeking {} to {pos:?}", self.name);

        // The raw reader is ahead of us by whatever sits in the buffer.
        let pos = match pos {
            SeekFrom::Current(offset) => SeekFrom::Start(self.position.saturating_add_signed(offset)),
            other => other,
        };

        self.position = self.raw.seek(pos)?;
        debug!("new_position: {}", self.position);

        self.buffer.empty();
        self.eof = Some(self.position) == self.raw.content_length();
        Ok(self.position)
    }

    pub fn truncate(&mut self, _size: Option<u64>) -> Result<u64> {
        Err(Error::unsupported("truncate"))
    }

    pub fn detach(&mut self) -> Result<()> {
        Err(Error::unsupported("detach"))
    }

    fn read_from_buffer(&mut self, size: Option<usize>) -> Bytes {
        let part = match size {
            Some(n) => self.buffer.read(n),
            None => self.buffer.read_all(),
        };
        self.position += part.len() as u64;
        part
    }

    fn fill_buffer(&mut self, size: usize) -> Result<()> {
        let size = size.max(self.buffer.chunk_size());
        while self.buffer.len() < size && !self.eof {
            if self.buffer.fill(&mut self.raw)? == 0 {
                debug!("reached EOF while filling buffer");
                self.eof = true;
            }
        }
        Ok(())
    }
}

impl io::Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.readinto(buf)?)
    }
}

impl io::Seek for Reader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(Reader::seek(self, pos)?)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::{MemoryObjectStore, Op};
    use crate::ErrorKind;

    fn reader(data: &'static [u8], buffer_size: usize) -> (Arc<MemoryObjectStore>, Reader) {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("b", "k", data);
        let cfg = ReaderConfig { buffer_size, ..Default::default() };
        let r = Reader::new(store.clone(), "b", "k", cfg).unwrap();
        (store, r)
    }

    #[test]
    fn small_reads_come_from_the_buffer() {
        let (store, mut r) = reader(b"abcdefghijklmnopqrstuvwxyz", 16);
        assert_eq!(store.calls(Op::Get), 1);
        assert_eq!(&r.read(Some(4)).unwrap()[..], b"abcd");
        assert_eq!(&r.read(Some(4)).unwrap()[..], b"efgh");
        assert_eq!(r.tell(), 8);
        // The initial seek's body is still open; no new GETs.
        assert_eq!(store.calls(Op::Get), 1);
    }

    #[test]
    fn read_all_sets_position_to_length() {
        let (_, mut r) = reader(b"0123456789", 4);
        r.read(Some(3)).unwrap();
        assert_eq!(&r.read(None).unwrap()[..], b"3456789");
        assert_eq!(r.tell(), 10);
        assert!(r.read(Some(5)).unwrap().is_empty());
    }

    #[test]
    fn zero_sized_read() {
        let (store, mut r) = reader(b"abc", 4);
        store.reset_calls();
        assert!(r.read(Some(0)).unwrap().is_empty());
        assert_eq!(store.total_calls(), 0);
    }

    #[test]
    fn relative_seek_accounts_for_buffered_bytes() {
        let (_, mut r) = reader(b"0123456789", 8);
        r.read(Some(2)).unwrap();
        // raw reader is at 8, logical position is 2
        assert_eq!(r.seek(SeekFrom::Current(3)).unwrap(), 5);
        assert_eq!(&r.read(Some(2)).unwrap()[..], b"56");
    }

    #[test]
    fn readinto_fills_a_slice() {
        let (_, mut r) = reader(b"xyz", 2);
        let mut buf = [0u8; 8];
        assert_eq!(r.readinto(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"xyz");
        assert_eq!(r.readinto(&mut buf).unwrap(), 0);
    }

    #[test]
    fn custom_line_terminator() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("b", "k", &b"a\r\nb\r\nc"[..]);
        let cfg = ReaderConfig { line_terminator: b"\r\n".to_vec(), buffer_size: 2, ..Default::default() };
        let mut r = Reader::new(store, "b", "k", cfg).unwrap();
        assert_eq!(&r.readline(None).unwrap()[..], b"a\r\n");
        assert_eq!(&r.readline(None).unwrap()[..], b"b\r\n");
        assert_eq!(&r.readline(None).unwrap()[..], b"c");
        assert!(r.readline(None).unwrap().is_empty());
    }

    #[test]
    fn unsupported_operations() {
        let (_, mut r) = reader(b"abc", 4);
        assert_eq!(r.truncate(None).unwrap_err().kind(), ErrorKind::Unsupported);
        assert_eq!(r.detach().unwrap_err().kind(), ErrorKind::Unsupported);
        assert_eq!(r.readline(Some(10)).unwrap_err().kind(), ErrorKind::Unsupported);
        assert!(r.seekable() && r.readable());
        assert_eq!(r.name(), "k");
    }

    #[test]
    fn std_io_traits() {
        use std::io::{Read, Seek};
        let (_, mut r) = reader(b"hello world", 4);
        let mut s = String::new();
        r.read_to_string(&mut s).unwrap();
        assert_eq!(s, "hello world");
        assert_eq!(r.stream_position().unwrap(), 11);
        assert_eq!(Seek::seek(&mut r, SeekFrom::Start(6)).unwrap(), 6);
        let mut tail = Vec::new();
        r.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, b"world");
    }
}
