// SPDX-License-Identifier: MIT
//! Rebuild the friendly view (`models/`/`datasets/<owner>/<name>/…`) from
//! canonical cache state: whatever `refs/main` (or `refs/master`) currently
//! points at (spec.md §4.4). Idempotent, and tolerant of one repository's
//! failure not blocking the rest of the run.

use std::path::{Path, PathBuf};

use hfd_shared::RepoKind;

use crate::cache::layout::{parse_canonical_dir_name, RepoLayout};
use crate::cache::{friendly, snapshot};
use crate::error::{Error, Result};

const PREFERRED_REFS: &[&str] = &["main", "master"];

/// One repository's worth of sync work, and how it went.
#[derive(Debug)]
pub struct RepoSyncResult {
    pub repo_dir: PathBuf,
    pub outcome: std::result::Result<SyncedRepo, String>,
}

#[derive(Debug, Default)]
pub struct SyncedRepo {
    pub entries_linked: usize,
    pub dangling_removed: usize,
}

/// Walk every repository directory under `hub_dir`, reading `<kind>s--`
/// canonical names to recover `{kind, owner, name}`, and resynchronize each.
/// Per-repository failures are collected rather than aborting the run.
pub async fn synchronize_all(
    hub_dir: &Path,
    models_dir: &Path,
    datasets_dir: &Path,
    clean: bool,
) -> Result<Vec<RepoSyncResult>> {
    let mut results = Vec::new();

    let mut entries = match tokio::fs::read_dir(hub_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(results),
        Err(e) => return Err(Error::fs(hub_dir.display().to_string(), e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::fs(hub_dir.display().to_string(), e))?
    {
        if !entry
            .file_type()
            .await
            .map_err(|e| Error::fs(entry.path().display().to_string(), e))?
            .is_dir()
        {
            continue;
        }
        let dir_name = entry.file_name().to_string_lossy().into_owned();
        let Some((kind, owner, name)) = parse_canonical_dir_name(&dir_name) else {
            continue;
        };
        let repo: hfd_shared::RepoId = format!("{owner}/{name}").parse().map_err(|e| Error::InvalidRepoId {
            id: format!("{owner}/{name}"),
            reason: format!("{e}"),
        })?;
        let layout = RepoLayout::new(
            hub_dir.to_path_buf(),
            models_dir.to_path_buf(),
            datasets_dir.to_path_buf(),
            repo,
            kind,
        );

        let outcome = synchronize_repo(&layout, clean).await.map_err(|e| e.to_string());
        if let Err(ref message) = outcome {
            log::warn!("{}: synchronization failed: {message}", entry.path().display());
        }
        results.push(RepoSyncResult {
            repo_dir: entry.path(),
            outcome,
        });
    }

    Ok(results)
}

/// Resynchronize one repository: pick a commit, link every file in its
/// snapshot into the friendly view, then optionally prune dangling links.
pub async fn synchronize_repo(layout: &RepoLayout, clean: bool) -> Result<SyncedRepo> {
    let commit = resolve_preferred_commit(layout).await?;
    let Some(commit) = commit else {
        log::debug!("{}: no ref or snapshot to synchronize from", layout.repo_dir().display());
        return Ok(SyncedRepo::default());
    };
    log::debug!("{}: synchronizing from commit {commit}", layout.repo_dir().display());

    let snapshot_dir = layout.snapshot_dir(&commit);
    let entries_linked = link_snapshot_tree(layout, &snapshot_dir, &snapshot_dir).await?;

    let mut dangling_removed = 0;
    if clean {
        let friendly_root = layout.friendly_repo_dir(None);
        let dangling = friendly::find_dangling_symlinks(&friendly_root).await?;
        dangling_removed = dangling.len();
        if dangling_removed > 0 {
            log::info!("{}: pruning {dangling_removed} dangling symlink(s)", friendly_root.display());
        }
        friendly::remove_and_prune(&friendly_root, &dangling).await?;
    }

    Ok(SyncedRepo {
        entries_linked,
        dangling_removed,
    })
}

async fn resolve_preferred_commit(layout: &RepoLayout) -> Result<Option<String>> {
    for revision in PREFERRED_REFS {
        let ref_path = layout.ref_path(revision);
        match tokio::fs::read_to_string(&ref_path).await {
            Ok(content) => return Ok(Some(content.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::fs(ref_path.display().to_string(), e)),
        }
    }

    // No ref resolved: fall back to any existing snapshot directory.
    let snapshots_dir = layout.snapshots_dir();
    let mut entries = match tokio::fs::read_dir(&snapshots_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::fs(snapshots_dir.display().to_string(), e)),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::fs(snapshots_dir.display().to_string(), e))?
    {
        if entry
            .file_type()
            .await
            .map_err(|e| Error::fs(entry.path().display().to_string(), e))?
            .is_dir()
        {
            return Ok(Some(entry.file_name().to_string_lossy().into_owned()));
        }
    }
    Ok(None)
}

/// Walk `dir` (a subtree of `snapshot_root`) and ensure a friendly-view
/// symlink exists for every file entry found, returning how many were
/// (re)linked.
fn link_snapshot_tree<'a>(
    layout: &'a RepoLayout,
    snapshot_root: &'a Path,
    dir: &'a Path,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<usize>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::fs(dir.display().to_string(), e)),
        };

        let mut linked = 0;
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

            if file_type.is_dir() {
                linked += link_snapshot_tree(layout, snapshot_root, &path).await?;
                continue;
            }

            let relative_path = path
                .strip_prefix(snapshot_root)
                .expect("walked path is always under snapshot_root")
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");

            let friendly_entry = layout.friendly_entry(None, &relative_path);
            snapshot::ensure_symlink(&friendly_entry, &path).await?;
            linked += 1;
        }
        Ok(linked)
    })
}

#[cfg(unix)]
#[cfg(test)]
mod tests {
    use super::*;

    fn layout(dir: &Path) -> RepoLayout {
        RepoLayout::new(
            dir.join("hub"),
            dir.join("models"),
            dir.join("datasets"),
            "owner/name".parse().unwrap(),
            RepoKind::Model,
        )
    }

    #[tokio::test]
    async fn links_every_snapshot_file_into_the_friendly_view() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());

        let blob = layout.blob_path("deadbeef");
        tokio::fs::create_dir_all(blob.parent().unwrap()).await.unwrap();
        tokio::fs::write(&blob, b"x").await.unwrap();

        let entry = layout.snapshot_entry("commit1", "sub/config.json");
        snapshot::ensure_symlink(&entry, &blob).await.unwrap();

        tokio::fs::create_dir_all(layout.refs_dir()).await.unwrap();
        tokio::fs::write(layout.ref_path("main"), "commit1").await.unwrap();

        let result = synchronize_repo(&layout, false).await.unwrap();
        assert_eq!(result.entries_linked, 1);

        let friendly = layout.friendly_entry(None, "sub/config.json");
        assert!(snapshot::resolves(&friendly).await);
    }

    #[tokio::test]
    async fn falls_back_to_master_then_any_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());

        let blob = layout.blob_path("deadbeef");
        tokio::fs::create_dir_all(blob.parent().unwrap()).await.unwrap();
        tokio::fs::write(&blob, b"x").await.unwrap();
        let entry = layout.snapshot_entry("commitA", "config.json");
        snapshot::ensure_symlink(&entry, &blob).await.unwrap();

        // no refs/ at all: falls back to the only existing snapshot dir.
        let result = synchronize_repo(&layout, false).await.unwrap();
        assert_eq!(result.entries_linked, 1);
    }

    #[tokio::test]
    async fn clean_removes_dangling_friendly_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        let friendly_root = layout.friendly_repo_dir(None);
        tokio::fs::create_dir_all(&friendly_root).await.unwrap();
        std::os::unix::fs::symlink(friendly_root.join("missing"), friendly_root.join("dangling.json")).unwrap();

        let result = synchronize_repo(&layout, true).await.unwrap();
        assert_eq!(result.dangling_removed, 1);
        assert!(!friendly_root.join("dangling.json").exists());
    }
}
