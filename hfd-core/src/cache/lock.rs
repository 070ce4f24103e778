// SPDX-License-Identifier: MIT
//! The advisory lock protocol on partial blobs (spec.md §4.3.2).
//!
//! `<hash>.incomplete.meta` records which process owns a partial download.
//! The protocol is advisory: a race on the meta write can let two processes
//! both believe they own the file, which is tolerated because both write
//! the same content and the final rename is atomic.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialMeta {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub expected_size: u64,
    pub sha256: Option<String>,
}

/// What `acquire` found when it looked at an existing partial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// No partial existed, or it was ours already, or the prior owner is
    /// dead/stalled: we now own it.
    Acquired,
    /// A living owner holds a fresh lock; caller should skip this file.
    Locked { pid: u32 },
}

async fn read_meta(meta_path: &Path) -> Result<Option<PartialMeta>> {
    match tokio::fs::read(meta_path).await {
        Ok(bytes) => {
            let meta: PartialMeta = serde_json::from_slice(&bytes).map_err(|e| {
                Error::Verification {
                    path: meta_path.display().to_string(),
                    reason: format!("corrupt lock metadata: {e}"),
                }
            })?;
            Ok(Some(meta))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::fs(meta_path.display().to_string(), e)),
    }
}

async fn write_meta(meta_path: &Path, meta: &PartialMeta) -> Result<()> {
    let json = serde_json::to_vec_pretty(meta).expect("PartialMeta always serializes");
    // Write to a sibling temp file then rename, so a concurrent reader never
    // observes a half-written meta file.
    let tmp_path = meta_path.with_extension("meta.tmp");
    tokio::fs::write(&tmp_path, &json)
        .await
        .map_err(|e| Error::fs(tmp_path.display().to_string(), e))?;
    tokio::fs::rename(&tmp_path, meta_path)
        .await
        .map_err(|e| Error::fs(meta_path.display().to_string(), e))
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    // Signal 0 performs no action but still does the existence/permission
    // check; EPERM means it exists but is owned by someone else, which we
    // still treat as alive.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM) }
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    // No portable liveness probe; treat as dead so a stale lock on an
    // unsupported platform doesn't wedge the cache forever.
    false
}

async fn mtime_age(path: &Path) -> Result<Duration> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::fs(path.display().to_string(), e))?;
    let modified = meta
        .modified()
        .map_err(|e| Error::fs(path.display().to_string(), e))?;
    Ok(modified.elapsed().unwrap_or_default())
}

/// Acquire ownership of `incomplete_path`'s lock, creating the `.incomplete`
/// file if it doesn't exist and writing our pid into the meta file.
pub async fn acquire(
    incomplete_path: &Path,
    meta_path: &Path,
    expected_size: u64,
    sha256: Option<String>,
    stale_timeout: Duration,
) -> Result<AcquireOutcome> {
    if tokio::fs::metadata(incomplete_path).await.is_err() {
        if let Some(parent) = incomplete_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::fs(parent.display().to_string(), e))?;
        }
        tokio::fs::File::create(incomplete_path)
            .await
            .map_err(|e| Error::fs(incomplete_path.display().to_string(), e))?;
    }

    if let Some(existing) = read_meta(meta_path).await? {
        let age = mtime_age(incomplete_path).await.unwrap_or(Duration::MAX);

        if process_is_alive(existing.pid) && age < stale_timeout {
            log::debug!("{} locked by live pid {} (age {age:?})", incomplete_path.display(), existing.pid);
            return Ok(AcquireOutcome::Locked { pid: existing.pid });
        }
        log::info!(
            "taking over stale lock on {} from pid {} (age {age:?})",
            incomplete_path.display(),
            existing.pid
        );
    }

    let meta = PartialMeta {
        pid: std::process::id(),
        started_at: Utc::now(),
        expected_size,
        sha256,
    };
    write_meta(meta_path, &meta).await?;
    Ok(AcquireOutcome::Acquired)
}

/// Touch the `.incomplete` file's mtime so a concurrent lock check sees
/// activity. Called after each chunk write.
pub async fn touch(incomplete_path: &Path) -> Result<()> {
    let path = incomplete_path.to_path_buf();
    tokio::task::spawn_blocking(move || filetime::set_file_mtime(&path, filetime::FileTime::now()))
        .await
        .expect("blocking task panicked")
        .map_err(|e| Error::fs(incomplete_path.display().to_string(), e))
}

/// Release on success: rename `.incomplete` to the final blob path and
/// remove the meta file.
pub async fn release(incomplete_path: &Path, meta_path: &Path, blob_path: &Path) -> Result<()> {
    if let Some(parent) = blob_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::fs(parent.display().to_string(), e))?;
    }

    // Two processes racing the same content converge here (invariant 7):
    // if another finalized first, drop ours rather than overwrite.
    if tokio::fs::metadata(blob_path).await.is_ok() {
        log::debug!("{} already present, dropping redundant download", blob_path.display());
        tokio::fs::remove_file(incomplete_path)
            .await
            .map_err(|e| Error::fs(incomplete_path.display().to_string(), e))?;
        return remove_meta(meta_path).await;
    }

    match tokio::fs::rename(incomplete_path, blob_path).await {
        Ok(()) => {}
        Err(e) if is_cross_device(&e) => {
            // rename-across-device: retried with a byte-by-byte copy
            // fallback, per spec.md §7.
            tokio::fs::copy(incomplete_path, blob_path)
                .await
                .map_err(|e| Error::fs(blob_path.display().to_string(), e))?;
            tokio::fs::remove_file(incomplete_path)
                .await
                .map_err(|e| Error::fs(incomplete_path.display().to_string(), e))?;
        }
        Err(e) => return Err(Error::fs(blob_path.display().to_string(), e)),
    }
    remove_meta(meta_path).await
}

async fn remove_meta(meta_path: &Path) -> Result<()> {
    match tokio::fs::remove_file(meta_path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::fs(meta_path.display().to_string(), e)),
    }
}

#[cfg(unix)]
fn is_cross_device(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_e: &std::io::Error) -> bool {
    false
}

#[cfg(unix)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_acquire_succeeds_and_writes_meta() {
        let dir = tempfile::tempdir().unwrap();
        let incomplete = dir.path().join("h.incomplete");
        let meta = dir.path().join("h.incomplete.meta");

        let outcome = acquire(&incomplete, &meta, 100, None, Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Acquired);
        assert!(incomplete.exists());
        assert!(meta.exists());
    }

    #[tokio::test]
    async fn dead_owner_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let incomplete = dir.path().join("h.incomplete");
        let meta_path = dir.path().join("h.incomplete.meta");
        tokio::fs::write(&incomplete, b"").await.unwrap();

        // Spawn and reap a child so its pid is guaranteed dead: kill(2) on a
        // live pid 0 signals our own process group and reports alive.
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();

        let dead = PartialMeta {
            pid: dead_pid,
            started_at: Utc::now(),
            expected_size: 100,
            sha256: None,
        };
        write_meta(&meta_path, &dead).await.unwrap();

        let outcome = acquire(&incomplete, &meta_path, 100, None, Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Acquired);

        let new_meta = read_meta(&meta_path).await.unwrap().unwrap();
        assert_eq!(new_meta.pid, std::process::id());
    }

    #[tokio::test]
    async fn living_owner_within_timeout_locks_out() {
        let dir = tempfile::tempdir().unwrap();
        let incomplete = dir.path().join("h.incomplete");
        let meta_path = dir.path().join("h.incomplete.meta");
        tokio::fs::write(&incomplete, b"").await.unwrap();

        let live = PartialMeta {
            pid: std::process::id(),
            started_at: Utc::now(),
            expected_size: 100,
            sha256: None,
        };
        write_meta(&meta_path, &live).await.unwrap();

        let outcome = acquire(&incomplete, &meta_path, 100, None, Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AcquireOutcome::Locked {
                pid: std::process::id()
            }
        );
    }

    #[tokio::test]
    async fn release_renames_and_removes_meta() {
        let dir = tempfile::tempdir().unwrap();
        let incomplete = dir.path().join("h.incomplete");
        let meta_path = dir.path().join("h.incomplete.meta");
        let blob = dir.path().join("blobs").join("h");
        tokio::fs::write(&incomplete, b"payload").await.unwrap();
        tokio::fs::write(&meta_path, b"{}").await.unwrap();

        release(&incomplete, &meta_path, &blob).await.unwrap();

        assert!(blob.exists());
        assert!(!incomplete.exists());
        assert!(!meta_path.exists());
    }

    #[tokio::test]
    async fn release_dedups_against_existing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let incomplete = dir.path().join("h.incomplete");
        let meta_path = dir.path().join("h.incomplete.meta");
        let blob = dir.path().join("blobs").join("h");
        tokio::fs::create_dir_all(blob.parent().unwrap()).await.unwrap();
        tokio::fs::write(&blob, b"payload").await.unwrap();
        tokio::fs::write(&incomplete, b"payload").await.unwrap();
        tokio::fs::write(&meta_path, b"{}").await.unwrap();

        release(&incomplete, &meta_path, &blob).await.unwrap();

        assert!(blob.exists());
        assert!(!incomplete.exists());
        assert!(!meta_path.exists());
    }
}
