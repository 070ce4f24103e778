// SPDX-License-Identifier: MIT
//! The friendly view: human-readable symlinks under `models/`/`datasets/`
//! mirroring snapshot entries, plus the orphan-cleanup walk used by
//! `synchronize(clean)`.

use std::path::{Path, PathBuf};

use crate::cache::snapshot::{ensure_symlink, resolves};
use crate::error::{Error, Result};

/// Ensure a friendly-view symlink exists at `link_path` pointing at
/// `snapshot_entry`. Identical mechanics to a snapshot symlink; kept as a
/// distinct name because the two layers have different lifecycle owners
/// (§3's lifecycle rules).
pub async fn ensure_friendly_entry(link_path: &Path, snapshot_entry: &Path) -> Result<()> {
    ensure_symlink(link_path, snapshot_entry).await
}

/// Walk `root` depth-first and collect every symlink whose target does not
/// resolve, without dereferencing through it (spec.md §9: never follow
/// symlinks during the cleanup walk, to avoid unbounded traversal through
/// any accidental cycle).
pub async fn find_dangling_symlinks(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dangling = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::fs(dir.display().to_string(), e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::fs(dir.display().to_string(), e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::fs(path.display().to_string(), e))?;

            if file_type.is_symlink() {
                if !resolves(&path).await {
                    dangling.push(path);
                }
            } else if file_type.is_dir() {
                stack.push(path);
            }
        }
    }

    Ok(dangling)
}

/// Remove `paths`, then delete now-empty directories bottom-up, stopping at
/// `root` (inclusive of removing `root` itself if it ends up empty, but
/// never ascending past it).
pub async fn remove_and_prune(root: &Path, paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::fs(path.display().to_string(), e)),
        }
    }

    let mut dirs_to_check: Vec<PathBuf> = paths
        .iter()
        .filter_map(|p| p.parent().map(Path::to_path_buf))
        .collect();
    dirs_to_check.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
    dirs_to_check.dedup();

    for dir in dirs_to_check {
        prune_empty_ancestors(root, &dir).await?;
    }
    Ok(())
}

async fn prune_empty_ancestors(root: &Path, start: &Path) -> Result<()> {
    let mut current = start.to_path_buf();
    loop {
        if current == *root || !current.starts_with(root) {
            break;
        }
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(_) => break,
        };
        let is_empty = entries
            .next_entry()
            .await
            .map_err(|e| Error::fs(current.display().to_string(), e))?
            .is_none();
        if !is_empty {
            break;
        }
        if tokio::fs::remove_dir(&current).await.is_err() {
            break;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
    Ok(())
}
