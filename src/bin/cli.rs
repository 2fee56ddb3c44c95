//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `cat`, `put`, and `iter`.
//!
//! Examples:
//! ```bash
//! s3stream-cli cat   s3://bucket/key.txt                  # stream one object to stdout
//! s3stream-cli cat   s3://bucket/key.txt --offset 100     # from byte 100 on
//! s3stream-cli put   local-file s3://bucket/key           # multipart upload
//! s3stream-cli put   - s3://bucket/key --single-part      # stdin, one PUT
//! s3stream-cli iter  s3://bucket/prefix/ -j 32 --limit 10 # parallel download, print sizes
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

use s3stream::{
    constants::{DEFAULT_BUFFER_SIZE, DEFAULT_ITER_RETRIES, DEFAULT_ITER_WORKERS, DEFAULT_MIN_PART_SIZE},
    iter_bucket, open, with_writer, ClientConfig, IterConfig, ObjectStore, ObjectWriter, OpenMode,
    OpenOptions, RetryPolicy, S3File, S3ObjectStore, S3Uri,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

// -- Commands

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// Custom endpoint (MinIO, Ceph, ...). Falls back to AWS_ENDPOINT_URL.
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    /// Region. Falls back to AWS_REGION, then us-east-1.
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream an object to stdout.
    Cat {
        /// S3 URI, e.g. s3://bucket/key
        uri: String,

        /// Read a specific object version.
        #[arg(long)]
        version_id: Option<String>,

        /// Start reading at this byte offset.
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Read buffer size in bytes.
        #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
        buffer_size: usize,
    },

    /// Upload a local file (or `-` for stdin) to an object.
    Put {
        /// Local file, or `-` for stdin.
        source: String,

        /// Destination S3 URI.
        uri: String,

        /// Staged bytes that trigger a part upload.
        #[arg(long, default_value_t = DEFAULT_MIN_PART_SIZE)]
        min_part_size: usize,

        /// Buffer everything and issue one PUT instead of a multipart upload.
        #[arg(long)]
        single_part: bool,

        /// Tries per part before giving up on an unreachable endpoint.
        #[arg(long, default_value_t = 6)]
        attempts: usize,

        /// Pause between tries, e.g. `10s` or `500ms`.
        #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
        retry_backoff: Duration,
    },

    /// Download every object under a prefix in parallel and print key + size.
    Iter {
        /// S3 URI of the prefix, e.g. s3://bucket/prefix/
        uri: String,

        /// Concurrent downloads.
        #[arg(short = 'j', long, default_value_t = DEFAULT_ITER_WORKERS)]
        workers: usize,

        /// Stop after this many objects.
        #[arg(long)]
        limit: Option<usize>,

        /// Extra attempts per key.
        #[arg(long, default_value_t = DEFAULT_ITER_RETRIES)]
        retries: usize,

        /// Only download keys ending with this suffix.
        #[arg(long)]
        suffix: Option<String>,
    },
}

fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let client = ClientConfig {
        endpoint_url: cli.endpoint_url,
        region: cli.region,
        ..Default::default()
    };

    match cli.cmd {
        Command::Cat { uri, version_id, offset, buffer_size } => {
            let opts = OpenOptions {
                version_id,
                buffer_size,
                defer_seek: offset > 0,
                ..Default::default()
            };
            cat_cmd(&uri, client, &opts, offset)?;
        }

        Command::Put { source, uri, min_part_size, single_part, attempts, retry_backoff } => {
            let opts = OpenOptions {
                min_part_size,
                multipart_upload: !single_part,
                retry: RetryPolicy::new(attempts, retry_backoff),
                ..Default::default()
            };
            put_cmd(&source, &uri, client, &opts)?;
        }

        Command::Iter { uri, workers, limit, retries, suffix } => {
            let mut cfg = IterConfig::default().with_workers(workers).with_retries(retries);
            if let Some(limit) = limit {
                cfg = cfg.with_key_limit(limit);
            }
            if let Some(suffix) = suffix {
                cfg = cfg.with_filter(move |key| key.ends_with(&suffix));
            }
            iter_cmd(&uri, client, cfg)?;
        }
    }

    Ok(())
}

/// Resolve a URI into a store plus bucket and key.
fn store_for(uri: &str, client: ClientConfig) -> Result<(Arc<dyn ObjectStore>, S3Uri)> {
    let (uri, client) = S3Uri::parse(uri)?.consolidate(client);
    let store = S3ObjectStore::from_config(&client)?;
    Ok((Arc::new(store), uri))
}

fn cat_cmd(uri: &str, client: ClientConfig, opts: &OpenOptions, offset: u64) -> Result<()> {
    let (store, uri) = store_for(uri, client)?;
    let file = open(store, &uri.bucket_id, &uri.key_id, OpenMode::Read, opts)?;
    let mut reader = file.into_reader().context("open for read returned a writer")?;
    if offset > 0 {
        reader.seek(io::SeekFrom::Start(offset))?;
    }

    let mut stdout = io::stdout().lock();
    match io::copy(&mut reader, &mut stdout) {
        Ok(n) => info!("wrote {n} bytes from s3://{}/{}", uri.bucket_id, uri.key_id),
        Err(e) if e.kind() == ErrorKind::BrokenPipe => return Ok(()),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn put_cmd(source: &str, uri: &str, client: ClientConfig, opts: &OpenOptions) -> Result<()> {
    let mut input: Box<dyn Read> = if source == "-" {
        Box::new(io::stdin().lock())
    } else {
        let path = PathBuf::from(source);
        Box::new(File::open(&path).with_context(|| format!("failed to open {}", path.display()))?)
    };

    let (store, uri) = store_for(uri, client)?;
    let t0 = Instant::now();
    let writer: S3File = open(store, &uri.bucket_id, &uri.key_id, OpenMode::Write, opts)?;

    let total = with_writer(writer, |w| {
        let mut chunk = vec![0u8; DEFAULT_BUFFER_SIZE];
        loop {
            let n = input
                .read(&mut chunk)
                .map_err(|e| s3stream::Error::io(format!("reading {source} failed: {e}")))?;
            if n == 0 {
                break;
            }
            ObjectWriter::write(w, &chunk[..n])?;
        }
        Ok(w.tell())
    })?;

    let secs = t0.elapsed().as_secs_f64();
    safe_println!(
        "uploaded {total} bytes to s3://{}/{} in {:.2}s ({:.2} MiB/s)",
        uri.bucket_id,
        uri.key_id,
        secs,
        total as f64 / (1024.0 * 1024.0) / secs.max(f64::EPSILON)
    );
    Ok(())
}

fn iter_cmd(uri: &str, client: ClientConfig, cfg: IterConfig) -> Result<()> {
    let (store, uri) = store_for(uri, client)?;
    let cfg = cfg.with_prefix(uri.key_id.clone());
    let t0 = Instant::now();

    let mut count = 0usize;
    let mut bytes = 0u64;
    for item in iter_bucket(store, &uri.bucket_id, cfg)? {
        let (key, data) = item?;
        count += 1;
        bytes += data.len() as u64;
        safe_println!("{key}\t{}", data.len());
    }

    info!(
        "downloaded {count} objects, {bytes} bytes in {}",
        humantime::format_duration(Duration::from_millis(t0.elapsed().as_millis() as u64))
    );
    Ok(())
}
