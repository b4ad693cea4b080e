//! HTTP downloads.
//!
//! The async client is driven to completion on a current-thread runtime so
//! callers see a plain blocking call. Transient failures are retried with
//! exponential backoff and partial files are resumed with a Range request.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;

use crate::progress::ProgressSink;

/// Fetches a URL into a local file.
pub trait Downloader {
    /// Download `url` into `dest`, reporting bytes through `progress`.
    ///
    /// If `dest` already holds a partial download it may be resumed.
    fn download(&self, url: &str, dest: &Path, progress: &dyn ProgressSink) -> Result<()>;
}

/// Download configuration options.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Request timeout (none for large files)
    pub timeout: Option<Duration>,
    /// Number of retry attempts for transient failures
    pub retries: u32,
    /// Delay before the first retry, doubling each attempt
    pub retry_delay: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// [`Downloader`] backed by reqwest.
#[derive(Debug, Clone, Default)]
pub struct HttpDownloader {
    options: DownloadOptions,
}

impl HttpDownloader {
    pub fn new(options: DownloadOptions) -> Self {
        Self { options }
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path, progress: &dyn ProgressSink) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start download runtime")?;
        runtime.block_on(http(url, dest, &self.options, progress))
    }
}

/// Download a file via HTTP with resume support.
async fn http(
    url: &str,
    dest: &Path,
    options: &DownloadOptions,
    progress: &dyn ProgressSink,
) -> Result<()> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("usbforge/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")?;

    let mut attempt = 0;
    loop {
        if attempt > 0 {
            // Exponential backoff, max 16x
            let delay = options.retry_delay * (1 << (attempt - 1).min(4));
            println!("    Retry {}/{} in {:?}...", attempt, options.retries, delay);
            tokio::time::sleep(delay).await;
        }
        attempt += 1;

        match http_attempt(&client, url, dest, options, progress).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if !is_retryable_error(&e) || attempt > options.retries {
                    return Err(e);
                }
                log::warn!("Download of {} failed, will retry: {:#}", url, e);
            }
        }
    }
}

/// Single HTTP download attempt.
async fn http_attempt(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    options: &DownloadOptions,
    progress: &dyn ProgressSink,
) -> Result<()> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let mut start_byte = if dest.exists() {
        std::fs::metadata(dest).map(|m| m.len()).unwrap_or(0)
    } else {
        0
    };

    let mut response = send(client, url, options, start_byte).await?;

    // The partial file is already complete or longer than upstream.
    if start_byte > 0 && response.status() == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
        log::warn!(
            "Server rejected resume of {} at {} bytes, restarting",
            url,
            start_byte
        );
        tokio::fs::remove_file(dest)
            .await
            .with_context(|| format!("Failed to remove {}", dest.display()))?;
        start_byte = 0;
        response = send(client, url, options, start_byte).await?;
    }
    let requested_resume = start_byte > 0;

    let status = response.status();
    if !status.is_success() {
        bail!(
            "HTTP {} for {}: {}",
            status.as_u16(),
            url,
            status.canonical_reason().unwrap_or("Unknown error")
        );
    }

    // Requested a range but got 200: the server ignores ranges, start over.
    let resuming = requested_resume && status == reqwest::StatusCode::PARTIAL_CONTENT;
    let start_byte = if resuming { start_byte } else { 0 };

    let total_size = response.content_length().map(|len| len + start_byte);

    let file = if resuming {
        log::info!("Resuming {} from {} bytes", url, start_byte);
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(dest)
            .await
            .with_context(|| format!("Failed to open {} for append", dest.display()))?
    } else {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?
    };
    let mut writer = tokio::io::BufWriter::new(file);

    let label = format!("Downloading {}", url);
    progress.start(&label, total_size);
    if start_byte > 0 {
        progress.advance(start_byte);
    }

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("Failed to read chunk from {}", url))?;
        writer
            .write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write to {}", dest.display()))?;
        progress.advance(chunk.len() as u64);
    }

    writer
        .flush()
        .await
        .with_context(|| format!("Failed to flush {}", dest.display()))?;
    progress.finish();

    Ok(())
}

/// Issue a GET, asking for the tail from `start_byte` when non-zero.
async fn send(
    client: &reqwest::Client,
    url: &str,
    options: &DownloadOptions,
    start_byte: u64,
) -> Result<reqwest::Response> {
    let mut request = client.get(url);
    if let Some(timeout) = options.timeout {
        request = request.timeout(timeout);
    }
    if start_byte > 0 {
        request = request.header(reqwest::header::RANGE, format!("bytes={}-", start_byte));
    }

    request
        .send()
        .await
        .with_context(|| format!("HTTP request failed: {}", url))
}

/// Check if an error is likely transient and worth retrying.
fn is_retryable_error(e: &anyhow::Error) -> bool {
    let msg = format!("{:#}", e).to_lowercase();
    msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("connection reset")
        || msg.contains("connection refused")
        || msg.contains("temporarily unavailable")
        || msg.contains("try again")
        || msg.contains("http 502")
        || msg.contains("http 503")
        || msg.contains("http 504")
}
