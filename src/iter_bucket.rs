// src/iter_bucket.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Parallel download of every object under a prefix.
//!
//! Three stages run on the global runtime:
//!   - a listing task pages through LIST and feeds accepted keys into a
//!     bounded queue, so it never runs far ahead of the downloads
//!   - a dispatcher hands each key to a blocking download task, with a
//!     semaphore capping how many run at once
//!   - finished downloads land on a bounded results channel that
//!     [`BucketIter`] drains, in completion order
//!
//! A download that still fails after its retries ends the whole iteration.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::IterConfig;
use crate::constants::ITER_QUEUE_DEPTH_PER_WORKER;
use crate::error::{Error, Result, StoreErrorKind};
use crate::object_store::{ObjectHandle, ObjectStore};
use crate::retry::RetryPolicy;
use crate::s3_client::global_rt_handle;

type KeyResult = Result<(String, Bytes)>;

/// Start iterating `bucket` according to `cfg`.
///
/// Fails up front only for a bad configuration; listing and download
/// failures are reported through the iterator.
pub fn iter_bucket(store: Arc<dyn ObjectStore>, bucket: &str, cfg: IterConfig) -> Result<BucketIter> {
    if cfg.workers == 0 {
        return Err(Error::config("workers must be >= 1"));
    }
    debug!("iter_bucket {bucket} {cfg:?}");

    if cfg.key_limit == Some(0) {
        return Ok(BucketIter {
            rx: None,
            cancel: CancellationToken::new(),
            key_limit: cfg.key_limit,
            yielded: 0,
            total_bytes: 0,
        });
    }

    let depth = cfg.workers * ITER_QUEUE_DEPTH_PER_WORKER;
    let (key_tx, key_rx) = mpsc::channel::<String>(depth);
    let (res_tx, res_rx) = mpsc::channel::<KeyResult>(depth);
    let cancel = CancellationToken::new();
    let handle = global_rt_handle();

    {
        let store = store.clone();
        let bucket = bucket.to_string();
        let cfg = cfg.clone();
        let res_tx = res_tx.clone();
        let cancel = cancel.clone();
        handle.spawn_blocking(move || list_keys(&*store, &bucket, &cfg, key_tx, res_tx, cancel));
    }

    handle.spawn(dispatch(
        store,
        bucket.to_string(),
        key_rx,
        res_tx,
        cfg.workers,
        cfg.retries,
        cfg.key_limit,
        cancel.clone(),
    ));

    Ok(BucketIter {
        rx: Some(res_rx),
        cancel,
        key_limit: cfg.key_limit,
        yielded: 0,
        total_bytes: 0,
    })
}

// Listing stage. Runs on a blocking thread; `blocking_send` applies backpressure.
fn list_keys(
    store: &dyn ObjectStore,
    bucket: &str,
    cfg: &IterConfig,
    key_tx: mpsc::Sender<String>,
    res_tx: mpsc::Sender<KeyResult>,
    cancel: CancellationToken,
) {
    let mut token: Option<String> = None;
    let mut listed = 0usize;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let page = match store.list_objects(bucket, &cfg.prefix, token.as_deref()) {
            Ok(page) => page,
            Err(e) => {
                let err = Error::store(format!("listing s3://{bucket}/{} failed", cfg.prefix), e);
                let _ = res_tx.blocking_send(Err(err));
                return;
            }
        };
        for key in page.keys {
            if !cfg.accepts(&key) {
                continue;
            }
            if key_tx.blocking_send(key).is_err() {
                // Dispatcher is gone: iteration was stopped.
                return;
            }
            listed += 1;
            if cfg.key_limit.is_some_and(|limit| listed >= limit) {
                debug!("listed {listed} keys, enough for the key limit");
                return;
            }
        }
        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    debug!("listed {listed} keys under s3://{bucket}/{}", cfg.prefix);
}

// Download stage: at most `workers` blocking downloads in flight.
async fn dispatch(
    store: Arc<dyn ObjectStore>,
    bucket: String,
    mut key_rx: mpsc::Receiver<String>,
    res_tx: mpsc::Sender<KeyResult>,
    workers: usize,
    retries: usize,
    key_limit: Option<usize>,
    cancel: CancellationToken,
) {
    let sem = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();
    let mut dispatched = 0usize;

    loop {
        // Every dispatched key ends in a result or stops the iteration,
        // so more than `key_limit` downloads are never needed.
        if key_limit.is_some_and(|limit| dispatched >= limit) {
            break;
        }
        let key = tokio::select! {
            _ = cancel.cancelled() => break,
            key = key_rx.recv() => match key {
                Some(key) => key,
                None => break,
            },
        };
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = sem.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        while tasks.try_join_next().is_some() {}
        dispatched += 1;

        let store = store.clone();
        let bucket = bucket.clone();
        let res_tx = res_tx.clone();
        let cancel = cancel.clone();
        tasks.spawn_blocking(move || {
            let _permit = permit;
            if cancel.is_cancelled() {
                return;
            }
            let result = download_key(&*store, &bucket, &key, retries).map(|data| (key, data));
            // A closed channel means the consumer is done; drop the result.
            let _ = res_tx.blocking_send(result);
        });
    }

    // Stop the listing stage, then let in-flight downloads drain.
    drop(key_rx);
    while tasks.join_next().await.is_some() {}
}

/// Fetch one object, retrying client and transport errors `retries` extra times.
/// The last failure is returned, not skipped.
pub fn download_key(store: &dyn ObjectStore, bucket: &str, key: &str, retries: usize) -> Result<Bytes> {
    let handle = ObjectHandle::new(bucket, key);
    RetryPolicy::new(retries + 1, Duration::ZERO)
        .retry_on(&[StoreErrorKind::Client, StoreErrorKind::Connection, StoreErrorKind::Body])
        .run(&format!("download of {handle}"), || store.get_object_bytes(&handle))
}

/// Lazy, single-pass sequence of `(key, content)` pairs in completion order.
///
/// Iteration blocks the calling thread; do not drive it from inside an
/// async task. Dropping the iterator stops the listing and discards any
/// downloads still in flight.
#[derive(Debug)]
pub struct BucketIter {
    rx: Option<mpsc::Receiver<KeyResult>>,
    cancel: CancellationToken,
    key_limit: Option<usize>,
    yielded: usize,
    total_bytes: u64,
}

impl BucketIter {
    /// Results handed out so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        self.rx = None;
    }

    fn limit_reached(&self) -> bool {
        self.key_limit.is_some_and(|limit| self.yielded >= limit)
    }
}

impl Iterator for BucketIter {
    type Item = KeyResult;

    fn next(&mut self) -> Option<KeyResult> {
        if self.limit_reached() {
            self.stop();
            return None;
        }
        let rx = self.rx.as_mut()?;
        match rx.blocking_recv() {
            Some(Ok((key, data))) => {
                self.yielded += 1;
                self.total_bytes += data.len() as u64;
                info!("yielding key #{}: {key:?}, size: {}", self.yielded, data.len());
                if self.limit_reached() {
                    self.stop();
                }
                Some(Ok((key, data)))
            }
            Some(Err(e)) => {
                self.stop();
                Some(Err(e))
            }
            None => {
                info!("processed {} keys, total size {}", self.yielded, self.total_bytes);
                self.rx = None;
                None
            }
        }
    }
}

impl Drop for BucketIter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
