// SPDX-License-Identifier: MIT
//! Per-item orchestration: the state machine in `state.rs` driven end to
//! end for one `PlanItem` — skip check, lock, transfer, finalize, and the
//! whole-item retry loop on verification failure (spec.md §4.3).

pub mod finalize;
pub mod multipart;
pub mod retry;
pub mod single;
pub mod state;

use std::sync::Arc;

use crate::cache::layout::RepoLayout;
use crate::cache::{blob, lock};
use crate::error::{Error, Result};
use crate::hub_client::HubClient;
use crate::planner::PlanItem;
use crate::progress::{Event, ProgressSink};
use crate::scheduler::Scheduler;
use crate::settings::{Settings, Token};
use finalize::{finalize, FinalizeRequest};
use state::{Outcome, SkipReason};

/// `download_item`'s result, enriched with the blob hash backing the
/// friendly-view entry — known immediately for LFS items, computed during
/// finalize for everything else, and needed by the job layer to write a
/// manifest entry regardless of which path produced it.
pub struct ItemResult {
    pub outcome: Outcome,
    pub blob_hash: Option<String>,
}

pub struct DownloadItemRequest<'a> {
    pub layout: &'a RepoLayout,
    pub hub_client: &'a Arc<dyn HubClient>,
    pub settings: &'a Settings,
    pub commit: &'a str,
    pub item: &'a PlanItem,
    pub filter_subdir: Option<&'a str>,
    pub token: Option<&'a Token>,
}

/// Run one item through its whole lifecycle. Retries the entire
/// download-and-verify cycle up to `settings.retry_attempts` times, discarding
/// the partial file between attempts (spec.md §4.3.5/§7 — a verification
/// failure is not resumable, since it means the bytes on disk are wrong).
pub async fn download_item(
    request: &DownloadItemRequest<'_>,
    scheduler: &Scheduler,
    progress: &ProgressSink,
) -> Result<ItemResult> {
    let item = request.item;
    let layout = request.layout;

    if let Some(reason) = already_satisfied(request).await {
        log::debug!("{} already satisfied ({reason:?}), skipping transfer", item.relative_path);
        let event = match reason {
            SkipReason::Sha256Match => Event::skip_sha256_match(item.relative_path.clone()),
            _ => Event::skip_size_match(item.relative_path.clone()),
        };
        progress.emit(event);
        let friendly_entry = layout.friendly_entry(request.filter_subdir, &item.relative_path);
        let blob_hash = resolved_blob_hash(&friendly_entry).await;
        return Ok(ItemResult {
            outcome: Outcome::Skipped { reason },
            blob_hash,
        });
    }

    let permit = scheduler.admit().await;
    let cancellation = scheduler.cancellation();
    progress.emit(Event::FileStart {
        path: item.relative_path.clone(),
        size: item.size_bytes,
    });

    // A hash is only known up front for LFS items, so only those can be
    // keyed by their final blob path before the bytes arrive. Non-LFS
    // items are keyed provisionally by a content-addressed temp name and
    // only take on their real blob name once the content is hashed.
    let lock_key = item
        .sha256
        .clone()
        .unwrap_or_else(|| format!("pending-{}", uuid::Uuid::new_v4()));
    let incomplete_path = layout.incomplete_path(&lock_key);
    let meta_path = layout.incomplete_meta_path(&lock_key);

    let result = run_with_retry(request, &permit, &incomplete_path, &meta_path, &cancellation, progress).await;

    if result.is_err() {
        log::debug!("cleaning up partial state for {} after terminal failure", item.relative_path);
        let _ = tokio::fs::remove_file(&incomplete_path).await;
        let _ = tokio::fs::remove_file(&meta_path).await;
    }
    result
}

/// Follow `entry_path` through however many symlink hops to its ultimate
/// target and report that target's filename — the blob hash, for entries
/// that live under `blobs/`.
async fn resolved_blob_hash(entry_path: &std::path::Path) -> Option<String> {
    let resolved = tokio::fs::canonicalize(entry_path).await.ok()?;
    resolved.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// §4.3.6: before touching the blob store at all, check whether the
/// friendly-view path already points at content matching this item.
async fn already_satisfied(request: &DownloadItemRequest<'_>) -> Option<SkipReason> {
    let item = request.item;
    let friendly_entry = request
        .layout
        .friendly_entry(request.filter_subdir, &item.relative_path);

    if blob::blob_size_matches(&friendly_entry, item.size_bytes).await {
        if item.is_lfs {
            if let Some(expected) = &item.sha256 {
                if request.layout.blob_path(expected).exists() {
                    return Some(SkipReason::Sha256Match);
                }
            }
        } else {
            return Some(SkipReason::SizeMatch);
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
async fn run_with_retry(
    request: &DownloadItemRequest<'_>,
    permit: &crate::scheduler::FilePermit<'_>,
    incomplete_path: &std::path::Path,
    meta_path: &std::path::Path,
    cancellation: &tokio_util::sync::CancellationToken,
    progress: &ProgressSink,
) -> Result<ItemResult> {
    let item = request.item;
    let settings = request.settings;
    let attempts = settings.retry_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            let _ = tokio::fs::remove_file(incomplete_path).await;
            let _ = tokio::fs::remove_file(meta_path).await;
            log::debug!(
                "retrying {} (attempt {attempt}/{attempts}): {}",
                item.relative_path,
                last_error.as_ref().map(ToString::to_string).unwrap_or_default()
            );
            progress.emit(Event::Retry {
                path: item.relative_path.clone(),
                attempt,
                message: last_error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "previous attempt failed verification".into()),
            });
        }

        match try_once(request, permit, incomplete_path, meta_path, cancellation, progress).await {
            Ok(result) => return Ok(result),
            Err(e @ Error::Locked { .. }) => return Err(e),
            Err(e @ Error::Cancelled { .. }) => return Err(e),
            Err(e) => {
                log::warn!("{} failed: {e}", item.relative_path);
                progress.emit(Event::Error {
                    path: Some(item.relative_path.clone()),
                    message: e.to_string(),
                });
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| Error::Other("retry budget exhausted".into())))
}

#[allow(clippy::too_many_arguments)]
async fn try_once(
    request: &DownloadItemRequest<'_>,
    permit: &crate::scheduler::FilePermit<'_>,
    incomplete_path: &std::path::Path,
    meta_path: &std::path::Path,
    cancellation: &tokio_util::sync::CancellationToken,
    progress: &ProgressSink,
) -> Result<ItemResult> {
    let item = request.item;
    let settings = request.settings;

    match lock::acquire(
        incomplete_path,
        meta_path,
        item.size_bytes,
        item.sha256.clone(),
        settings.stale_timeout,
    )
    .await?
    {
        lock::AcquireOutcome::Locked { pid } => {
            log::debug!("{} locked by sibling pid {pid}, skipping", item.relative_path);
            return Ok(ItemResult {
                outcome: Outcome::LockedBySibling { owner_pid: pid },
                blob_hash: None,
            });
        }
        lock::AcquireOutcome::Acquired => {}
    }

    let use_multipart = item.size_bytes >= settings.multipart_threshold && settings.connections_per_file > 1;

    let bytes_transferred = if use_multipart {
        let _connections = permit.acquire_connections(settings.connections_per_file).await;
        multipart::download_multipart(
            request.hub_client,
            &item.fetch_url,
            incomplete_path,
            item.size_bytes,
            settings.connections_per_file,
            settings.min_part_size,
            request.token,
            cancellation,
            progress,
            &item.relative_path,
            settings.retry_attempts,
            settings.backoff_initial,
            settings.backoff_max,
        )
        .await?;
        item.size_bytes
    } else {
        let _connection = permit.acquire_connections(1).await;
        let result = single::download_single(
            request.hub_client.as_ref(),
            &item.fetch_url,
            incomplete_path,
            request.token,
            cancellation,
            progress,
            &item.relative_path,
            item.size_bytes,
        )
        .await?;
        result.bytes_written
    };

    let finalize_request = FinalizeRequest {
        layout: request.layout,
        commit: request.commit,
        relative_path: &item.relative_path,
        expected_size: item.size_bytes,
        is_lfs: item.is_lfs,
        declared_sha256: item.sha256.as_deref(),
        verify_mode: settings.verify_mode,
        filter_subdir: request.filter_subdir,
    };
    let finalize_outcome = finalize(&finalize_request, incomplete_path, meta_path).await?;
    log::info!("installed {} ({} bytes) as blob {}", item.relative_path, bytes_transferred, finalize_outcome.hash);

    progress.emit(Event::ok(item.relative_path.clone()));
    Ok(ItemResult {
        outcome: Outcome::Installed { bytes_transferred },
        blob_hash: Some(finalize_outcome.hash),
    })
}
