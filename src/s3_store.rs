// src/s3_store.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// ObjectStore backed by the AWS SDK. Every call hops onto the global runtime
// and blocks the caller until the response (or the next body chunk) arrives.

use std::fmt;
use std::io::{self, Read};

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as SdkCompletedPart};
use aws_sdk_s3::Client;
use bytes::{Buf, Bytes};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{StoreError, StoreResult};
use crate::object_store::{
    CompletedPart, GetObjectOutput, ListPage, ObjectHandle, ObjectStore, UploadOptions,
};
use crate::range::ByteRange;
use crate::s3_client::{client_for, run_on_global_rt};

/// Header S3 attaches to 416 responses with the real object size.
const ACTUAL_OBJECT_SIZE: &str = "ActualObjectSize";

/// S3 (or S3-compatible) object store.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3ObjectStore").finish_non_exhaustive()
    }
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from `config` and wrap it.
    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        Ok(Self::new(client_for(config)?))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

// Classify an SDK failure so the retry layer can decide what is transient.
fn map_sdk_error<E>(err: SdkError<E>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            StoreError::Connection(DisplayErrorContext(&err).to_string())
        }
        SdkError::ServiceError(ctx) => {
            let status = ctx.raw().status().as_u16();
            let service = ctx.err();
            let code = match service.code() {
                Some(code) => code.to_string(),
                // HEAD responses carry no body, hence no code.
                None if status == 404 => "NotFound".to_string(),
                None => format!("HTTP{status}"),
            };
            let actual_object_size = service
                .meta()
                .extra(ACTUAL_OBJECT_SIZE)
                .and_then(|s| s.parse().ok());
            StoreError::Client {
                code,
                message: service.message().unwrap_or_default().to_string(),
                status: Some(status),
                actual_object_size,
            }
        }
        _ => StoreError::Other(DisplayErrorContext(&err).to_string()),
    }
}

fn store_err(e: anyhow::Error) -> StoreError {
    // Errors raised inside the runtime closures are already StoreErrors.
    match e.downcast::<StoreError>() {
        Ok(se) => se,
        Err(other) => StoreError::Other(format!("{other:#}")),
    }
}

/// Blocking adapter over an SDK `ByteStream`.
///
/// A stream that fails or ends before `remaining` bytes arrive reports
/// `UnexpectedEof`, which the readers treat as an incomplete read.
struct BlockingBody {
    stream: Option<ByteStream>,
    pending: Bytes,
    remaining: Option<u64>,
}

impl Read for BlockingBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pending.is_empty() {
            let Some(mut stream) = self.stream.take() else {
                return Ok(0);
            };
            let next = run_on_global_rt(async move {
                let chunk = stream.try_next().await;
                Ok((stream, chunk))
            })
            .map_err(|e| io::Error::other(e.to_string()))?;

            match next {
                (stream, Ok(Some(chunk))) => {
                    self.stream = Some(stream);
                    self.pending = chunk;
                }
                (_, Ok(None)) => {
                    return match self.remaining {
                        Some(left) if left > 0 => Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("response body ended {left} bytes early"),
                        )),
                        _ => Ok(0),
                    };
                }
                (_, Err(e)) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, e)),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        if let Some(left) = self.remaining.as_mut() {
            *left = left.saturating_sub(n as u64);
        }
        Ok(n)
    }
}

impl ObjectStore for S3ObjectStore {
    fn get_object(&self, handle: &ObjectHandle, range: Option<ByteRange>) -> StoreResult<GetObjectOutput> {
        let client = self.client.clone();
        let handle = handle.clone();
        debug!("GET {handle} range={:?}", range.map(|r| r.to_header()));
        let (body, content_range, content_length) = run_on_global_rt(async move {
            let resp = client
                .get_object()
                .bucket(&handle.bucket)
                .key(&handle.key)
                .set_version_id(handle.version_id.clone())
                .set_range(range.map(|r| r.to_header()))
                .send()
                .await
                .map_err(map_sdk_error)?;
            let length = resp.content_length().and_then(|n| u64::try_from(n).ok());
            let content_range = resp.content_range().map(str::to_string);
            Ok((resp.body, content_range, length))
        })
        .map_err(store_err)?;

        Ok(GetObjectOutput {
            body: Box::new(BlockingBody {
                stream: Some(body),
                pending: Bytes::new(),
                remaining: content_length,
            }),
            content_range,
            content_length,
        })
    }

    fn head_object(&self, handle: &ObjectHandle) -> StoreResult<u64> {
        let client = self.client.clone();
        let handle = handle.clone();
        run_on_global_rt(async move {
            let resp = client
                .head_object()
                .bucket(&handle.bucket)
                .key(&handle.key)
                .set_version_id(handle.version_id.clone())
                .send()
                .await
                .map_err(map_sdk_error)?;
            Ok(resp.content_length().unwrap_or(0).max(0) as u64)
        })
        .map_err(store_err)
    }

    fn put_object(&self, handle: &ObjectHandle, body: Bytes) -> StoreResult<()> {
        let client = self.client.clone();
        let handle = handle.clone();
        run_on_global_rt(async move {
            client
                .put_object()
                .bucket(&handle.bucket)
                .key(&handle.key)
                .body(ByteStream::from(body))
                .send()
                .await
                .map_err(map_sdk_error)?;
            Ok(())
        })
        .map_err(store_err)
    }

    fn create_multipart_upload(&self, handle: &ObjectHandle, options: &UploadOptions) -> StoreResult<String> {
        let client = self.client.clone();
        let handle = handle.clone();
        let content_type = options.content_type.clone();
        run_on_global_rt(async move {
            let resp = client
                .create_multipart_upload()
                .bucket(&handle.bucket)
                .key(&handle.key)
                .set_content_type(content_type)
                .send()
                .await
                .map_err(map_sdk_error)?;
            resp.upload_id()
                .map(str::to_string)
                .ok_or_else(|| StoreError::Other("CreateMultipartUpload returned no upload id".into()).into())
        })
        .map_err(store_err)
    }

    fn upload_part(&self, handle: &ObjectHandle, upload_id: &str, part_number: i32, body: Bytes) -> StoreResult<String> {
        let client = self.client.clone();
        let handle = handle.clone();
        let upload_id = upload_id.to_string();
        run_on_global_rt(async move {
            let resp = client
                .upload_part()
                .bucket(&handle.bucket)
                .key(&handle.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(body))
                .send()
                .await
                .map_err(map_sdk_error)?;
            Ok(resp.e_tag().unwrap_or_default().to_string())
        })
        .map_err(store_err)
    }

    fn complete_multipart_upload(&self, handle: &ObjectHandle, upload_id: &str, parts: &[CompletedPart]) -> StoreResult<()> {
        let client = self.client.clone();
        let handle = handle.clone();
        let upload_id = upload_id.to_string();
        let parts: Vec<SdkCompletedPart> = parts
            .iter()
            .map(|p| {
                SdkCompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.e_tag)
                    .build()
            })
            .collect();
        run_on_global_rt(async move {
            client
                .complete_multipart_upload()
                .bucket(&handle.bucket)
                .key(&handle.key)
                .upload_id(upload_id)
                .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
                .send()
                .await
                .map_err(map_sdk_error)?;
            Ok(())
        })
        .map_err(store_err)
    }

    fn abort_multipart_upload(&self, handle: &ObjectHandle, upload_id: &str) -> StoreResult<()> {
        let client = self.client.clone();
        let handle = handle.clone();
        let upload_id = upload_id.to_string();
        run_on_global_rt(async move {
            client
                .abort_multipart_upload()
                .bucket(&handle.bucket)
                .key(&handle.key)
                .upload_id(upload_id)
                .send()
                .await
                .map_err(map_sdk_error)?;
            Ok(())
        })
        .map_err(store_err)
    }

    fn list_objects(&self, bucket: &str, prefix: &str, continuation_token: Option<&str>) -> StoreResult<ListPage> {
        let client = self.client.clone();
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        let token = continuation_token.map(str::to_string);
        run_on_global_rt(async move {
            let resp = client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(token)
                .send()
                .await
                .map_err(map_sdk_error)?;
            let keys = resp
                .contents()
                .iter()
                .filter_map(|obj| obj.key().map(str::to_string))
                .collect();
            let next_token = if resp.is_truncated().unwrap_or(false) {
                resp.next_continuation_token().map(str::to_string)
            } else {
                None
            };
            Ok(ListPage { keys, next_token })
        })
        .map_err(store_err)
    }

    fn head_bucket(&self, bucket: &str) -> StoreResult<()> {
        let client = self.client.clone();
        let bucket = bucket.to_string();
        run_on_global_rt(async move {
            client
                .head_bucket()
                .bucket(bucket)
                .send()
                .await
                .map_err(map_sdk_error)?;
            Ok(())
        })
        .map_err(store_err)
    }
}
