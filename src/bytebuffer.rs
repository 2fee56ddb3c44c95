// src/bytebuffer.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Growable byte window used as the reader's lookahead buffer.

use bytes::{Bytes, BytesMut};

use crate::error::Result;

/// Something a [`ByteBuffer`] can pull chunks from.
pub trait ChunkSource {
    /// Return up to `size` bytes; an empty result means end of stream.
    fn read_chunk(&mut self, size: usize) -> Result<Bytes>;
}

/// FIFO byte buffer.
///
/// `len()` always equals bytes appended minus bytes consumed.
#[derive(Debug)]
pub struct ByteBuffer {
    chunk_size: usize,
    bytes: BytesMut,
}

impl ByteBuffer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            bytes: BytesMut::with_capacity(chunk_size),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Append one chunk of at most `chunk_size` bytes from `source`.
    /// Returns the number of bytes appended; 0 means the source is exhausted.
    pub fn fill<S: ChunkSource + ?Sized>(&mut self, source: &mut S) -> Result<usize> {
        let chunk = source.read_chunk(self.chunk_size)?;
        self.bytes.extend_from_slice(&chunk);
        Ok(chunk.len())
    }

    /// Append raw bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Remove and return up to `size` bytes from the front.
    pub fn read(&mut self, size: usize) -> Bytes {
        let size = size.min(self.bytes.len());
        self.bytes.split_to(size).freeze()
    }

    /// Remove and return everything buffered.
    pub fn read_all(&mut self) -> Bytes {
        self.bytes.split().freeze()
    }

    /// Look at up to `size` bytes without consuming them.
    pub fn peek(&self, size: usize) -> &[u8] {
        &self.bytes[..size.min(self.bytes.len())]
    }

    /// Remove and return bytes up to and including the first `terminator`.
    /// If no terminator is buffered, everything buffered is returned.
    pub fn readline(&mut self, terminator: &[u8]) -> Bytes {
        match find(&self.bytes, terminator) {
            Some(idx) => self.bytes.split_to(idx + terminator.len()).freeze(),
            None => self.read_all(),
        }
    }

    /// True if `terminator` occurs in the buffered bytes.
    pub fn contains(&self, terminator: &[u8]) -> bool {
        self.contains_from(terminator, 0)
    }

    /// Like [`contains`](Self::contains), skipping the first `start` bytes.
    pub fn contains_from(&self, terminator: &[u8], start: usize) -> bool {
        find(&self.bytes[start.min(self.bytes.len())..], terminator).is_some()
    }

    /// Discard everything buffered.
    pub fn empty(&mut self) {
        self.bytes.clear();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
