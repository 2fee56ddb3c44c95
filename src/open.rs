// src/open.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Mode-based entry point: pick a reader or writer for one object.

use std::fmt;
use std::io::{self, SeekFrom};
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::config::{ClientConfig, MultipartConfig, ReaderConfig};
use crate::constants::{DEFAULT_BUFFER_SIZE, DEFAULT_LINE_TERMINATOR, DEFAULT_MIN_PART_SIZE};
use crate::error::{Error, Result};
use crate::multipart::MultipartWriter;
use crate::object_store::ObjectStore;
use crate::reader::Reader;
use crate::retry::RetryPolicy;
use crate::s3_store::S3ObjectStore;
use crate::singlepart::SinglepartWriter;
use crate::uri::S3Uri;
use crate::writer::ObjectWriter;

/// Binary open modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `rb`
    Read,
    /// `wb`
    Write,
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(mode: &str) -> Result<Self> {
        match mode {
            "rb" => Ok(OpenMode::Read),
            "wb" => Ok(OpenMode::Write),
            other => Err(Error::unsupported(format!("bad mode: {other:?}, expected \"rb\" or \"wb\""))),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpenMode::Read => "rb",
            OpenMode::Write => "wb",
        })
    }
}

/// Everything `open` accepts, for both directions.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Read a specific version. Not allowed when writing.
    pub version_id: Option<String>,
    pub buffer_size: usize,
    pub line_terminator: Vec<u8>,
    pub defer_seek: bool,
    pub min_part_size: usize,
    /// Use the multipart API when writing; otherwise buffer and PUT once.
    pub multipart_upload: bool,
    pub retry: RetryPolicy,
    pub content_type: Option<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            version_id: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            line_terminator: DEFAULT_LINE_TERMINATOR.to_vec(),
            defer_seek: false,
            min_part_size: DEFAULT_MIN_PART_SIZE,
            multipart_upload: true,
            retry: RetryPolicy::default(),
            content_type: None,
        }
    }
}

impl OpenOptions {
    fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            version_id: self.version_id.clone(),
            buffer_size: self.buffer_size,
            line_terminator: self.line_terminator.clone(),
            defer_seek: self.defer_seek,
        }
    }

    fn multipart_config(&self) -> MultipartConfig {
        MultipartConfig {
            min_part_size: self.min_part_size,
            retry: self.retry.clone(),
            content_type: self.content_type.clone(),
            ..Default::default()
        }
    }
}

/// An object opened for reading or writing.
#[derive(Debug)]
pub enum S3File {
    Reader(Reader),
    Multipart(MultipartWriter),
    Singlepart(SinglepartWriter),
}

impl S3File {
    pub fn name(&self) -> &str {
        match self {
            S3File::Reader(r) => r.name(),
            S3File::Multipart(w) => w.name(),
            S3File::Singlepart(w) => w.name(),
        }
    }

    pub fn mode(&self) -> OpenMode {
        match self {
            S3File::Reader(_) => OpenMode::Read,
            _ => OpenMode::Write,
        }
    }

    /// Current position (reader) or bytes written (writers).
    pub fn tell(&self) -> u64 {
        match self {
            S3File::Reader(r) => r.tell(),
            S3File::Multipart(w) => w.tell(),
            S3File::Singlepart(w) => w.tell(),
        }
    }

    /// Finish a writer; a no-op for readers.
    pub fn close(&mut self) -> Result<()> {
        match self {
            S3File::Reader(_) => Ok(()),
            S3File::Multipart(w) => w.close(),
            S3File::Singlepart(w) => w.close(),
        }
    }

    /// Cancel a writer; a no-op for readers.
    pub fn terminate(&mut self) -> Result<()> {
        match self {
            S3File::Reader(_) => Ok(()),
            S3File::Multipart(w) => w.terminate(),
            S3File::Singlepart(w) => w.terminate(),
        }
    }

    pub fn into_reader(self) -> Option<Reader> {
        match self {
            S3File::Reader(r) => Some(r),
            _ => None,
        }
    }
}

impl ObjectWriter for S3File {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        match self {
            S3File::Reader(_) => Err(Error::unsupported("write on a file opened for reading")),
            S3File::Multipart(w) => w.write(data),
            S3File::Singlepart(w) => w.write(data),
        }
    }

    fn close(&mut self) -> Result<()> {
        S3File::close(self)
    }

    fn terminate(&mut self) -> Result<()> {
        S3File::terminate(self)
    }

    fn tell(&self) -> u64 {
        S3File::tell(self)
    }
}

impl io::Read for S3File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            S3File::Reader(r) => io::Read::read(r, buf),
            _ => Err(Error::unsupported("read on a file opened for writing").into()),
        }
    }
}

impl io::Write for S3File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(ObjectWriter::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for S3File {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            S3File::Reader(r) => io::Seek::seek(r, pos),
            _ => Err(Error::unsupported("seek on a file opened for writing").into()),
        }
    }
}

/// Open `bucket/key` in `mode` on `store`.
pub fn open(store: Arc<dyn ObjectStore>, bucket: &str, key: &str, mode: OpenMode, opts: &OpenOptions) -> Result<S3File> {
    debug!("open {bucket}/{key} mode={mode}");
    match mode {
        OpenMode::Read => Ok(S3File::Reader(Reader::new(store, bucket, key, opts.reader_config())?)),
        OpenMode::Write => {
            if opts.version_id.is_some() {
                return Err(Error::config("version_id must be None when writing"));
            }
            if opts.multipart_upload {
                Ok(S3File::Multipart(MultipartWriter::new(store, bucket, key, opts.multipart_config())?))
            } else {
                Ok(S3File::Singlepart(SinglepartWriter::new(store, bucket, key)?))
            }
        }
    }
}

/// Parse `uri`, build an S3 client from it and `client`, and open the object.
///
/// `mode` is `"rb"` or `"wb"`.
pub fn open_uri(uri: &str, mode: &str, opts: &OpenOptions, client: ClientConfig) -> Result<S3File> {
    let mode: OpenMode = mode.parse()?;
    let (uri, client) = S3Uri::parse(uri)?.consolidate(client);
    let store = S3ObjectStore::from_config(&client)
        .map_err(|e| Error::config(format!("unable to build S3 client: {e:#}")))?;
    open(Arc::new(store), &uri.bucket_id, &uri.key_id, mode, opts)
}
