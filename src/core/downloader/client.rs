use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::transport::Transport;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::progress::CancelFlag;

/// A single file to fetch. `urls` are tried in order on every attempt
/// (mirror first, official host last).
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    /// Human-readable name used in errors (maven coordinate, asset name, ...).
    pub label: String,
    pub urls: Vec<String>,
    pub dest: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// The file was already present and valid.
    Skipped,
    Downloaded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub downloaded: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub retries: u32,
    /// Delay before the second attempt; doubles after every failure.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Concurrent, resumable, SHA-1 validated downloader.
///
/// Every file is written to `<dest>.part` and renamed into place only after
/// it passed verification, so the final path never holds a partial artifact.
/// Clones share one lock per destination, so concurrent installs never write
/// the same `.part` file at once.
#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn Transport>,
    /// Maximum number of parallel downloads.
    concurrency: usize,
    retry: RetryPolicy,
    in_flight: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            concurrency: 8,
            retry: RetryPolicy::default(),
            in_flight: Arc::default(),
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    // ── Single file ─────────────────────────────────────

    /// Ensure `entry` exists at its destination, downloading it when the
    /// local copy is missing or fails verification.
    pub async fn fetch(&self, entry: &DownloadEntry) -> LauncherResult<FetchStatus> {
        if is_present_and_valid(entry).await? {
            debug!("Up to date: {}", entry.label);
            return Ok(FetchStatus::Skipped);
        }

        let lock = self.dest_lock(&entry.dest);
        let result = {
            let _guard = lock.lock().await;
            self.fetch_exclusive(entry).await
        };
        self.release_dest_lock(&entry.dest, lock);
        result
    }

    async fn fetch_exclusive(&self, entry: &DownloadEntry) -> LauncherResult<FetchStatus> {
        // Another task may have finished this file while we waited.
        if is_present_and_valid(entry).await? {
            debug!("Up to date: {}", entry.label);
            return Ok(FetchStatus::Skipped);
        }

        let attempts = self.retry.retries + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            for url in &entry.urls {
                match self.download_once(url, entry).await {
                    Ok(()) => {
                        debug!("Downloaded: {} -> {:?}", url, entry.dest);
                        return Ok(FetchStatus::Downloaded);
                    }
                    Err(e) if !e.is_retryable() => return Err(e),
                    Err(e) => {
                        warn!(
                            "Attempt {}/{} for {} via {} failed: {}",
                            attempt, attempts, entry.label, url, e
                        );
                        last_error = Some(e);
                    }
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.retry.delay_after(attempt)).await;
            }
        }

        Err(LauncherError::DownloadExhausted {
            artifact: entry.label.clone(),
            attempts,
            last: Box::new(last_error.unwrap_or_else(|| {
                LauncherError::Other(format!("no download source for {}", entry.label))
            })),
        })
    }

    fn dest_lock(&self, dest: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(in_flight.entry(dest.to_path_buf()).or_default())
    }

    fn release_dest_lock(&self, dest: &Path, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if in_flight
            .get(dest)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            in_flight.remove(dest);
        }
    }

    async fn download_once(&self, url: &str, entry: &DownloadEntry) -> LauncherResult<()> {
        let dest = &entry.dest;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let temp = part_path(dest);
        let mut offset = match tokio::fs::metadata(&temp).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        // A partial that already reaches the expected size has nothing left
        // to request: keep it if it verifies, otherwise start over.
        if let Some(size) = entry.size.filter(|size| offset > 0 && offset >= *size) {
            if offset == size && verify(&temp, entry).await.is_ok() {
                debug!("Partial download of {} is already complete", entry.label);
                return tokio::fs::rename(&temp, dest)
                    .await
                    .map_err(|e| LauncherError::io(dest, e));
            }
            debug!(
                "Discarding partial download of {} ({} bytes, expected {})",
                entry.label, offset, size
            );
            discard(&temp).await?;
            offset = 0;
        }

        let mut body = match self.transport.open(url, offset).await {
            Err(LauncherError::DownloadFailed { status: 416, .. }) if offset > 0 => {
                debug!(
                    "{} rejected resuming {} at byte {}; restarting",
                    url, entry.label, offset
                );
                discard(&temp).await?;
                self.transport.open(url, 0).await?
            }
            opened => opened?,
        };
        if offset > 0 && body.resumed {
            debug!("Resuming {} at byte {}", entry.label, offset);
        }

        // Write inside a block so the handle is closed before the rename.
        {
            let mut file = if body.resumed {
                tokio::fs::OpenOptions::new()
                    .append(true)
                    .open(&temp)
                    .await
            } else {
                tokio::fs::File::create(&temp).await
            }
            .map_err(|e| LauncherError::io(&temp, e))?;

            while let Some(chunk) = body.chunks.next().await {
                let chunk = chunk?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| LauncherError::io(&temp, e))?;
            }
            file.flush().await.map_err(|e| LauncherError::io(&temp, e))?;
        }

        if let Err(e) = verify(&temp, entry).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }

        tokio::fs::rename(&temp, dest)
            .await
            .map_err(|e| LauncherError::io(dest, e))
    }

    // ── Batch ───────────────────────────────────────────

    /// Fetch many files with at most `concurrency` in flight.
    ///
    /// Duplicate destinations are collapsed before scheduling. Once `cancel`
    /// is raised or any file exhausts its retries, no new downloads start;
    /// in-flight ones run to completion. `on_progress(done, total)` is called
    /// after every finished entry.
    pub async fn download_batch<F>(
        &self,
        entries: Vec<DownloadEntry>,
        cancel: &CancelFlag,
        mut on_progress: F,
    ) -> LauncherResult<BatchReport>
    where
        F: FnMut(usize, usize),
    {
        let entries = dedup_by_dest(entries);
        let total = entries.len();
        info!(
            "Starting batch download: {} files, concurrency={}",
            total, self.concurrency
        );

        let halt = CancelFlag::detached();
        let mut results = stream::iter(entries)
            .map(|entry| {
                let halt = halt.clone();
                async move {
                    if cancel.is_cancelled() || halt.is_cancelled() {
                        return None;
                    }
                    Some(self.fetch(&entry).await)
                }
            })
            .buffer_unordered(self.concurrency);

        let mut report = BatchReport::default();
        let mut first_error = None;
        let mut done = 0;

        while let Some(result) = results.next().await {
            match result {
                None => {}
                Some(Ok(status)) => {
                    match status {
                        FetchStatus::Downloaded => report.downloaded += 1,
                        FetchStatus::Skipped => report.skipped += 1,
                    }
                    done += 1;
                    on_progress(done, total);
                }
                Some(Err(e)) => {
                    halt.cancel();
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancel.is_cancelled() && done < total {
            return Err(LauncherError::Cancelled(cancel.task_id().to_string()));
        }

        info!(
            "Batch finished: {} downloaded, {} already present",
            report.downloaded, report.skipped
        );
        Ok(report)
    }
}

fn dedup_by_dest(entries: Vec<DownloadEntry>) -> Vec<DownloadEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.dest.clone()))
        .collect()
}

async fn discard(path: &Path) -> LauncherResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LauncherError::io(path, e)),
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn verify(path: &Path, entry: &DownloadEntry) -> LauncherResult<()> {
    if let Some(expected) = &entry.sha1 {
        let actual = sha1_file(path).await?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(LauncherError::ChecksumMismatch {
                artifact: entry.label.clone(),
                expected: expected.clone(),
                actual,
            });
        }
        return Ok(());
    }

    let len = tokio::fs::metadata(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?
        .len();
    match entry.size {
        Some(size) if size != len => Err(LauncherError::ChecksumMismatch {
            artifact: entry.label.clone(),
            expected: format!("{} bytes", size),
            actual: format!("{} bytes", len),
        }),
        _ => Ok(()),
    }
}

/// Whether the destination already holds a valid copy: sha1 match when a
/// checksum is known, otherwise a matching (or at least non-zero) size.
pub async fn is_present_and_valid(entry: &DownloadEntry) -> LauncherResult<bool> {
    let meta = match tokio::fs::metadata(&entry.dest).await {
        Ok(meta) if meta.is_file() => meta,
        _ => return Ok(false),
    };

    if let Some(expected) = &entry.sha1 {
        return Ok(sha1_file(&entry.dest).await?.eq_ignore_ascii_case(expected));
    }

    Ok(match entry.size {
        Some(size) => meta.len() == size,
        None => meta.len() > 0,
    })
}

/// Streaming SHA-1 of a file, hex encoded.
pub async fn sha1_file(path: &Path) -> LauncherResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn sha1_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
