// SPDX-License-Identifier: MIT
//! Multipart download: up to `connections_per_file` byte-range streams
//! write to disjoint offsets of the same `<hash>.incomplete` file.
//!
//! Resume policy (spec.md open question, resolved in SPEC_FULL.md §4.3):
//! multipart downloads always restart every part from scratch. File size
//! on disk is never treated as a resume indicator for multipart files.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::cache::lock;
use crate::downloader::retry::backoff_delay;
use crate::error::{Error, Result};
use crate::hub_client::{ByteRange, HubClient};
use crate::progress::{Event, ProgressSink};
use crate::settings::Token;

/// `N = min(C, ceil(size / min_part_size))`, partitioned into `N`
/// contiguous, as-even-as-possible byte ranges covering `[0, size)`.
pub fn split_ranges(size: u64, connections_per_file: usize, min_part_size: u64) -> Vec<ByteRange> {
    if size == 0 {
        return vec![ByteRange { start: 0, end: 0 }];
    }
    let by_min_part = size.div_ceil(min_part_size.max(1));
    let n = (connections_per_file as u64).min(by_min_part).max(1) as usize;

    let base = size / n as u64;
    let remainder = size % n as u64;
    let mut ranges = Vec::with_capacity(n);
    let mut start = 0u64;
    for i in 0..n {
        let this_size = base + u64::from(i < remainder as usize);
        let end = start + this_size;
        ranges.push(ByteRange { start, end });
        start = end;
    }
    ranges
}

#[allow(clippy::too_many_arguments)]
pub async fn download_multipart(
    hub_client: &Arc<dyn HubClient>,
    url: &str,
    incomplete_path: &Path,
    total_size: u64,
    connections_per_file: usize,
    min_part_size: u64,
    token: Option<&Token>,
    cancellation: &CancellationToken,
    progress: &ProgressSink,
    relative_path: &str,
    retry_attempts: u32,
    backoff_initial: Duration,
    backoff_max: Duration,
) -> Result<()> {
    {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(incomplete_path)
            .await
            .map_err(|e| Error::fs(incomplete_path.display().to_string(), e))?;
        file.set_len(total_size)
            .await
            .map_err(|e| Error::fs(incomplete_path.display().to_string(), e))?;
    }

    let ranges = split_ranges(total_size, connections_per_file, min_part_size);
    let group_cancel = cancellation.child_token();
    let downloaded = Arc::new(AtomicU64::new(0));

    let mut tasks = tokio::task::JoinSet::new();
    for range in ranges {
        let hub_client = Arc::clone(hub_client);
        let url = url.to_string();
        let incomplete_path = incomplete_path.to_path_buf();
        let token = token.cloned();
        let group_cancel = group_cancel.clone();
        let downloaded = Arc::clone(&downloaded);
        let progress = progress.clone();
        let relative_path = relative_path.to_string();

        tasks.spawn(async move {
            download_part_with_retry(
                &hub_client,
                &url,
                &incomplete_path,
                range,
                token.as_ref(),
                &group_cancel,
                &downloaded,
                total_size,
                &progress,
                &relative_path,
                retry_attempts,
                backoff_initial,
                backoff_max,
            )
            .await
        });
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.map_err(|e| Error::Other(format!("download part task panicked: {e}")))?;
        if let Err(e) = result {
            // One part failing cancels its siblings; the partial file is
            // left on disk with whatever was written, per spec.md §4.3.3.
            group_cancel.cancel();
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn download_part_with_retry(
    hub_client: &Arc<dyn HubClient>,
    url: &str,
    incomplete_path: &Path,
    range: ByteRange,
    token: Option<&Token>,
    cancellation: &CancellationToken,
    downloaded: &Arc<AtomicU64>,
    total_size: u64,
    progress: &ProgressSink,
    relative_path: &str,
    retry_attempts: u32,
    backoff_initial: Duration,
    backoff_max: Duration,
) -> Result<()> {
    let mut last_error = None;
    for attempt in 1..=retry_attempts.max(1) {
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled {
                path: relative_path.to_string(),
            });
        }
        if attempt > 1 {
            let jitter = jitter_unit();
            tokio::time::sleep(backoff_delay(attempt, backoff_initial, backoff_max, jitter)).await;
        }

        match download_part_once(
            hub_client,
            url,
            incomplete_path,
            range,
            token,
            cancellation,
            downloaded,
            total_size,
            progress,
            relative_path,
        )
        .await
        {
            Ok(()) => return Ok(()),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| Error::Other("retry budget exhausted".into())))
}

#[allow(clippy::too_many_arguments)]
async fn download_part_once(
    hub_client: &Arc<dyn HubClient>,
    url: &str,
    incomplete_path: &Path,
    range: ByteRange,
    token: Option<&Token>,
    cancellation: &CancellationToken,
    downloaded: &Arc<AtomicU64>,
    total_size: u64,
    progress: &ProgressSink,
    relative_path: &str,
) -> Result<()> {
    if range.start == range.end {
        return Ok(());
    }

    let response = hub_client.fetch(url, Some(range), token).await?;
    if !response.is_partial_content() {
        return Err(Error::Upstream {
            url: url.to_string(),
            status: response.status,
            attempts: 1,
        });
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(incomplete_path)
        .await
        .map_err(|e| Error::fs(incomplete_path.display().to_string(), e))?;
    file.seek(std::io::SeekFrom::Start(range.start))
        .await
        .map_err(|e| Error::fs(incomplete_path.display().to_string(), e))?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled {
                path: relative_path.to_string(),
            });
        }
        let chunk = chunk.map_err(|e| Error::network(url, e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::fs(incomplete_path.display().to_string(), e))?;

        let now = downloaded.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
        if now % (1024 * 1024) < chunk.len() as u64 {
            lock::touch(incomplete_path).await?;
        }
        progress.emit(Event::FileProgress {
            path: relative_path.to_string(),
            downloaded: now,
            total: total_size,
        });
    }
    file.flush()
        .await
        .map_err(|e| Error::fs(incomplete_path.display().to_string(), e))
}

fn jitter_unit() -> f64 {
    // A simple, dependency-free source of jitter: the low bits of the
    // current time's subsecond nanoseconds, mapped to [-1.0, 1.0].
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (f64::from(nanos % 1000) / 500.0) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_min_of_connections_and_size_over_min_part() {
        let ranges = split_ranges(52_428_800, 4, 4 * 1024 * 1024);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges.last().unwrap().end, 52_428_800);
        for window in ranges.windows(2) {
            assert_eq!(window[0].end, window[1].start);
        }
    }

    #[test]
    fn small_file_under_min_part_size_is_a_single_range() {
        let ranges = split_ranges(1024, 8, 4 * 1024 * 1024);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0], ByteRange { start: 0, end: 1024 });
    }

    #[test]
    fn ranges_are_contiguous_and_cover_whole_file() {
        let ranges = split_ranges(10_000_003, 3, 1);
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges.last().unwrap().end, 10_000_003);
        let total: u64 = ranges.iter().map(|r| r.end - r.start).sum();
        assert_eq!(total, 10_000_003);
    }
}
