// src/s3_client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Blocking bridge onto the async AWS Rust SDK.
//! Owns a single global multi-thread Tokio runtime; clients are built on it
//! from a [`ClientConfig`].
//!

use anyhow::{Context, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials as SdkCredentials, Region};
use aws_sdk_s3::Client;
use std::sync::mpsc;
use std::{env, thread, time::Duration};
use tokio::runtime::{Builder as TokioBuilder, Handle};
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::ClientConfig;
use crate::constants::{DEFAULT_REGION, ENV_RT_THREADS};

// -----------------------------------------------------------------------------
// Global runtime (lazy, thread-safe)
// -----------------------------------------------------------------------------
static RT_HANDLE: once_cell::sync::OnceCell<Handle> = once_cell::sync::OnceCell::new();

// Create (once) a background multi-thread Tokio runtime and return its Handle.
pub(crate) fn global_rt_handle() -> &'static Handle {
    RT_HANDLE.get_or_init(|| {
        let (tx, rx) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("s3stream-rt".to_string())
            .spawn(move || {
                let threads = get_runtime_threads();
                debug!("Creating Tokio runtime with {} worker threads", threads);

                let rt = TokioBuilder::new_multi_thread()
                    .enable_io()
                    .enable_time()
                    .worker_threads(threads)
                    .thread_name("s3stream-rt-worker")
                    .build()
                    .expect("failed to build global tokio runtime");

                // Send a Handle clone back to the creator, then park the runtime forever.
                let handle = rt.handle().clone();
                tx.send(handle).expect("send runtime handle");
                rt.block_on(async { std::future::pending::<()>().await });
            })
            .expect("failed to spawn s3stream runtime thread");

        rx.recv().expect("receive runtime handle")
    })
}

/// Worker thread count, overridable through `S3STREAM_RT_THREADS`.
fn get_runtime_threads() -> usize {
    env::var(ENV_RT_THREADS)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or_else(|| {
            let cores = num_cpus::get();
            std::cmp::min(std::cmp::max(4, cores * 2), 32)
        })
}

/// Run an async `fut` on the global runtime and block the **current** thread
/// until it completes. Handles both runtime and non-runtime contexts.
pub fn run_on_global_rt<F, T>(fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = global_rt_handle().clone();
    match Handle::try_current() {
        Ok(_) => {
            // Inside some runtime: a std channel can be received without
            // tripping tokio's blocking-in-async check.
            let (tx, rx) = mpsc::channel();
            handle.spawn(async move {
                let _ = tx.send(fut.await);
            });
            rx.recv()
                .map_err(|_| anyhow::anyhow!("global runtime task crashed: RecvError(())"))?
        }
        Err(_) => {
            let (tx, rx) = oneshot::channel();
            handle.spawn(async move {
                let _ = tx.send(fut.await);
            });
            // Block this plain OS thread until the async result arrives.
            rx.blocking_recv()
                .map_err(|_| anyhow::anyhow!("global runtime task crashed: RecvError(())"))?
        }
    }
}

// -----------------------------------------------------------------------------
// Client factory
// -----------------------------------------------------------------------------

/// Operation timeout, overridable through `S3STREAM_OPERATION_TIMEOUT_SECS`.
fn get_operation_timeout() -> Duration {
    env::var("S3STREAM_OPERATION_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(120))
}

/// Build an S3 client on the global runtime.
pub fn build_s3_client(config: &ClientConfig) -> Result<Client> {
    let config = config.clone();
    run_on_global_rt(async move { build_s3_client_async(&config).await })
}

/// Async flavour of [`build_s3_client`].
///
/// Region resolution: `config.region`, then `AWS_REGION`, then the default
/// provider chain, then us-east-1. Without explicit credentials the default
/// AWS provider chain is used. `.env` is loaded first if present.
pub async fn build_s3_client_async(config: &ClientConfig) -> Result<Client> {
    dotenvy::dotenv().ok();

    let region = RegionProviderChain::first_try(config.region.clone().map(Region::new))
        .or_else(env::var("AWS_REGION").ok().map(Region::new))
        .or_default_provider()
        .or_else(Region::new(DEFAULT_REGION));

    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(5))
        .operation_timeout(get_operation_timeout())
        .build();

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(region)
        .timeout_config(timeout_config);

    let endpoint = config
        .endpoint_url
        .clone()
        .or_else(|| env::var("AWS_ENDPOINT_URL").ok().filter(|e| !e.is_empty()));
    if let Some(endpoint) = &endpoint {
        debug!("using S3 endpoint {endpoint}");
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;

    let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
        // Custom endpoints (MinIO, Ceph, ...) generally need path-style addressing.
        .force_path_style(config.force_path_style || endpoint.is_some());
    if let Some(creds) = &config.credentials {
        builder = builder.credentials_provider(SdkCredentials::new(
            &creds.access_key_id,
            &creds.secret_access_key,
            None,
            None,
            "s3stream",
        ));
    }

    Ok(Client::from_conf(builder.build()))
}

/// Build a client from `config`, wrapping failures with the endpoint for context.
pub fn client_for(config: &ClientConfig) -> Result<Client> {
    build_s3_client(config).with_context(|| {
        format!(
            "failed to build S3 client (endpoint {})",
            config.endpoint_url.as_deref().unwrap_or("default")
        )
    })
}
