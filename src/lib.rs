// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: module tree and public re-exports.
//
// File-like access to objects in S3-style stores:
//   - Reader / RangeReader     seekable, buffered reads over ranged GETs
//   - MultipartWriter          streaming writes as multipart uploads
//   - SinglepartWriter         buffered writes as one PUT
//   - iter_bucket              parallel download of everything under a prefix
// All of them talk to an `ObjectStore`; `S3ObjectStore` is the AWS SDK
// implementation and `MemoryObjectStore` an in-process one.

pub mod constants;
pub mod error;
pub mod config;
pub mod range;
pub mod bytebuffer;
pub mod retry;

pub mod object_store;
pub mod memory_store;
pub mod s3_client;
pub mod s3_store;

pub mod raw_reader;
pub mod reader;
pub mod writer;
pub mod multipart;
pub mod singlepart;
pub mod iter_bucket;

pub mod uri;
pub mod open;

pub use bytebuffer::{ByteBuffer, ChunkSource};
pub use config::{ClientConfig, Credentials, IterConfig, KeyFilter, MultipartConfig, ReaderConfig};
pub use error::{Error, ErrorKind, Result, StoreError, StoreErrorKind, StoreResult};
pub use iter_bucket::{download_key, iter_bucket, BucketIter};
pub use memory_store::{MemoryObjectStore, Op};
pub use multipart::{MultipartWriter, UploadState};
pub use object_store::{
    CompletedPart, GetObjectOutput, ListPage, ObjectBody, ObjectHandle, ObjectStore, UploadOptions,
};
pub use open::{open, open_uri, OpenMode, OpenOptions, S3File};
pub use range::{ByteRange, ContentRange};
pub use raw_reader::RangeReader;
pub use reader::Reader;
pub use retry::RetryPolicy;
pub use s3_client::{build_s3_client, run_on_global_rt};
pub use s3_store::S3ObjectStore;
pub use singlepart::SinglepartWriter;
pub use uri::S3Uri;
pub use writer::{with_writer, ObjectWriter};
