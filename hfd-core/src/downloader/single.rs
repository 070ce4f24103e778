// SPDX-License-Identifier: MIT
//! Single-stream download: one HTTP connection writes to `<hash>.incomplete`
//! sequentially, resuming from the file's current length on restart.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::cache::blob::StreamingHasher;
use crate::cache::lock;
use crate::error::{Error, Result};
use crate::hub_client::{ByteRange, HubClient};
use crate::progress::{Event, ProgressSink};
use crate::settings::Token;

pub struct SingleDownloadResult {
    pub bytes_written: u64,
    /// The SHA-256 of the *entire* file content, known only when the
    /// download ran start-to-finish in this call (no resume).
    pub streamed_sha256: Option<String>,
}

#[allow(clippy::too_many_arguments)]
pub async fn download_single(
    hub_client: &dyn HubClient,
    url: &str,
    incomplete_path: &Path,
    token: Option<&Token>,
    cancellation: &CancellationToken,
    progress: &ProgressSink,
    relative_path: &str,
    total_size: u64,
) -> Result<SingleDownloadResult> {
    let existing_len = tokio::fs::metadata(incomplete_path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);

    if existing_len >= total_size && total_size > 0 {
        // Bytes are already all on disk (e.g. a crash right before
        // finalization); nothing left to fetch, let the caller verify.
        return Ok(SingleDownloadResult {
            bytes_written: existing_len,
            streamed_sha256: None,
        });
    }

    let range = if existing_len > 0 && existing_len < total_size {
        Some(ByteRange {
            start: existing_len,
            end: total_size,
        })
    } else {
        None
    };
    let resuming = range.is_some();

    let response = hub_client.fetch(url, range, token).await?;
    if resuming && !response.is_partial_content() {
        return Err(Error::Verification {
            path: incomplete_path.display().to_string(),
            reason: "server did not honor resume range request".into(),
        });
    }
    if !resuming && !response.is_success() {
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
    file.seek(std::io::SeekFrom::Start(existing_len))
        .await
        .map_err(|e| Error::fs(incomplete_path.display().to_string(), e))?;

    let mut hasher = (!resuming).then(StreamingHasher::new);
    let mut downloaded = existing_len;
    let mut since_last_touch = 0u64;
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
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(&chunk);
        }

        downloaded += chunk.len() as u64;
        since_last_touch += chunk.len() as u64;
        if since_last_touch >= 1024 * 1024 {
            lock::touch(incomplete_path).await?;
            since_last_touch = 0;
        }

        progress.emit(Event::FileProgress {
            path: relative_path.to_string(),
            downloaded,
            total: total_size,
        });
    }

    file.flush()
        .await
        .map_err(|e| Error::fs(incomplete_path.display().to_string(), e))?;

    Ok(SingleDownloadResult {
        bytes_written: downloaded,
        streamed_sha256: hasher.map(StreamingHasher::finish_hex),
    })
}

/// Shared by both single and multipart callers: produce a fresh cancellable
/// token tied to the scheduler's job-wide token, so per-file cancellation
/// composes with job-wide cancellation without extra plumbing.
pub fn child_token(parent: &CancellationToken) -> CancellationToken {
    parent.child_token()
}

pub type SharedCancellation = Arc<CancellationToken>;
