// SPDX-License-Identifier: MIT
//! Snapshot symlink creation: `snapshots/<commit>/<path>` → `../blobs/<hash>`.

use std::path::Path;

use crate::cache::layout::relative_symlink_target;
use crate::error::{Error, Result};

/// Create or rewrite the symlink at `entry_path` so it points at `blob_path`
/// (both absolute). Idempotent: if the symlink already has the right
/// target, nothing is written.
pub async fn ensure_symlink(entry_path: &Path, blob_path: &Path) -> Result<()> {
    if let Some(parent) = entry_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::fs(parent.display().to_string(), e))?;
    }

    let desired_target = relative_symlink_target(entry_path, blob_path);

    if let Ok(existing_target) = tokio::fs::read_link(entry_path).await {
        if existing_target == desired_target {
            return Ok(());
        }
        tokio::fs::remove_file(entry_path)
            .await
            .map_err(|e| Error::fs(entry_path.display().to_string(), e))?;
    } else if tokio::fs::symlink_metadata(entry_path).await.is_ok() {
        // A regular file or directory occupies this path; replace it.
        tokio::fs::remove_file(entry_path)
            .await
            .map_err(|e| Error::fs(entry_path.display().to_string(), e))?;
    }

    create_relative_symlink(&desired_target, entry_path).await
}

#[cfg(unix)]
async fn create_relative_symlink(target: &Path, link: &Path) -> Result<()> {
    let target = target.to_path_buf();
    let link = link.to_path_buf();
    tokio::task::spawn_blocking(move || std::os::unix::fs::symlink(&target, &link))
        .await
        .expect("blocking task panicked")
        .map_err(|e| Error::fs(link.display().to_string(), e))
}

#[cfg(not(unix))]
async fn create_relative_symlink(target: &Path, link: &Path) -> Result<()> {
    // Symlinks are advisory in structure only; on symlink-hostile platforms
    // fall back to a plain copy, per spec.md §9's portability note.
    if let Some(parent) = link.parent() {
        let resolved = parent.join(target);
        tokio::fs::copy(&resolved, link)
            .await
            .map(|_| ())
            .map_err(|e| Error::fs(link.display().to_string(), e))
    } else {
        Err(Error::Other(format!(
            "cannot resolve symlink fallback copy for {}",
            link.display()
        )))
    }
}

/// Does `entry_path` resolve (through however many relative hops) to an
/// existing file? Used by invariant checks and the synchronizer's cleanup
/// walk — this only checks the immediate target exists, never recurses
/// through further symlinks, per spec.md §9's acyclicity note.
pub async fn resolves(entry_path: &Path) -> bool {
    tokio::fs::metadata(entry_path).await.is_ok()
}
