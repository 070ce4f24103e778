// SPDX-License-Identifier: MIT
//! Reconcile two caches by repository identity: diff what each has, then
//! copy repositories between them preserving the on-disk layout (spec.md
//! §4.5).

use std::path::{Path, PathBuf};

use hfd_shared::{RepoId, RepoKind};

use crate::cache::layout::parse_canonical_dir_name;
use crate::error::{Error, Result};

/// `{kind, owner, name, commit, total_blob_bytes, blob_count}` for one
/// repository directory under a hub root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSummary {
    pub kind: RepoKind,
    pub repo: RepoId,
    pub commit: Option<String>,
    pub total_blob_bytes: u64,
    pub blob_count: u64,
}

impl RepoSummary {
    fn dir_name(&self) -> String {
        self.repo.canonical_dir_name(self.kind)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Diff {
    pub missing: Vec<RepoSummary>,
    pub extra: Vec<RepoSummary>,
    pub outdated: Vec<(RepoSummary, RepoSummary)>,
}

/// Scan a `hub/` directory and summarize every repository found in it.
pub async fn scan_hub(hub_dir: &Path) -> Result<Vec<RepoSummary>> {
    let mut summaries = Vec::new();
    let mut entries = match tokio::fs::read_dir(hub_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(summaries),
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
        let repo: RepoId = format!("{owner}/{name}")
            .parse()
            .map_err(|e| Error::InvalidRepoId {
                id: format!("{owner}/{name}"),
                reason: format!("{e}"),
            })?;

        summaries.push(summarize_repo(&entry.path(), kind, repo).await?);
    }

    Ok(summaries)
}

async fn summarize_repo(repo_dir: &Path, kind: RepoKind, repo: RepoId) -> Result<RepoSummary> {
    let commit = match tokio::fs::read_to_string(repo_dir.join("refs").join("main")).await {
        Ok(content) => Some(content.trim().to_string()),
        Err(_) => None,
    };

    let (total_blob_bytes, blob_count) = sum_blobs(&repo_dir.join("blobs")).await?;

    Ok(RepoSummary {
        kind,
        repo,
        commit,
        total_blob_bytes,
        blob_count,
    })
}

async fn sum_blobs(blobs_dir: &Path) -> Result<(u64, u64)> {
    let mut total = 0u64;
    let mut count = 0u64;
    let mut entries = match tokio::fs::read_dir(blobs_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(Error::fs(blobs_dir.display().to_string(), e)),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::fs(blobs_dir.display().to_string(), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".incomplete") || name.ends_with(".incomplete.meta") {
            continue;
        }
        let meta = entry
            .metadata()
            .await
            .map_err(|e| Error::fs(entry.path().display().to_string(), e))?;
        if meta.is_file() {
            total += meta.len();
            count += 1;
        }
    }
    Ok((total, count))
}

/// Compare `source` and `destination` hub directories by repository
/// identity and commit.
pub async fn diff(source_hub: &Path, destination_hub: &Path) -> Result<Diff> {
    let source = scan_hub(source_hub).await?;
    let destination = scan_hub(destination_hub).await?;

    let mut result = Diff::default();
    for src in &source {
        match destination.iter().find(|d| d.repo == src.repo && d.kind == src.kind) {
            None => result.missing.push(src.clone()),
            Some(dst) if dst.commit != src.commit => {
                result.outdated.push((src.clone(), dst.clone()));
            }
            Some(_) => {}
        }
    }
    for dst in &destination {
        if !source.iter().any(|s| s.repo == dst.repo && s.kind == dst.kind) {
            result.extra.push(dst.clone());
        }
    }
    Ok(result)
}

/// Is the destination repository incomplete, per spec.md §4.5's integrity
/// rule: any of `refs/`, `blobs/`, `snapshots/` missing or empty, or any
/// snapshot symlink resolving to a missing blob?
pub async fn is_incomplete(repo_dir: &Path) -> Result<bool> {
    for required in ["refs", "blobs", "snapshots"] {
        let dir = repo_dir.join(required);
        if !dir_has_entries(&dir).await? {
            return Ok(true);
        }
    }

    let snapshots_dir = repo_dir.join("snapshots");
    let mut commit_dirs = match tokio::fs::read_dir(&snapshots_dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(true),
    };
    while let Some(commit_entry) = commit_dirs
        .next_entry()
        .await
        .map_err(|e| Error::fs(snapshots_dir.display().to_string(), e))?
    {
        if any_dangling_entry(&commit_entry.path()).await? {
            return Ok(true);
        }
    }
    Ok(false)
}

async fn dir_has_entries(dir: &Path) -> Result<bool> {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => Ok(entries
            .next_entry()
            .await
            .map_err(|e| Error::fs(dir.display().to_string(), e))?
            .is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::fs(dir.display().to_string(), e)),
    }
}

fn any_dangling_entry(dir: &Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<bool>> + Send + '_>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(false),
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
                if tokio::fs::metadata(&path).await.is_err() {
                    return Ok(true);
                }
            } else if file_type.is_dir() && any_dangling_entry(&path).await? {
                return Ok(true);
            }
        }
        Ok(false)
    })
}

/// Copy one repository directory tree from `source_repo_dir` to
/// `destination_repo_dir`, preserving symlinks as symlinks (their relative
/// targets stay valid since both trees have the same internal shape).
pub async fn copy_repo(source_repo_dir: &Path, destination_repo_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(destination_repo_dir)
        .await
        .map_err(|e| Error::fs(destination_repo_dir.display().to_string(), e))?;
    copy_tree(source_repo_dir, destination_repo_dir).await
}

fn copy_tree<'a>(src: &'a Path, dst: &'a Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(src)
            .await
            .map_err(|e| Error::fs(src.display().to_string(), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::fs(src.display().to_string(), e))?
        {
            let src_path = entry.path();
            let dst_path = dst.join(entry.file_name());
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::fs(src_path.display().to_string(), e))?;

            if file_type.is_symlink() {
                copy_symlink(&src_path, &dst_path).await?;
            } else if file_type.is_dir() {
                tokio::fs::create_dir_all(&dst_path)
                    .await
                    .map_err(|e| Error::fs(dst_path.display().to_string(), e))?;
                copy_tree(&src_path, &dst_path).await?;
            } else {
                tokio::fs::copy(&src_path, &dst_path)
                    .await
                    .map_err(|e| Error::fs(dst_path.display().to_string(), e))?;
            }
        }
        Ok(())
    })
}

#[cfg(unix)]
async fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = tokio::fs::read_link(src)
        .await
        .map_err(|e| Error::fs(src.display().to_string(), e))?;
    let _ = tokio::fs::remove_file(dst).await;
    let target_owned = target;
    let dst_owned = dst.to_path_buf();
    tokio::task::spawn_blocking(move || std::os::unix::fs::symlink(&target_owned, &dst_owned))
        .await
        .expect("blocking task panicked")
        .map_err(|e| Error::fs(dst.display().to_string(), e))
}

#[cfg(not(unix))]
async fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    tokio::fs::copy(src, dst)
        .await
        .map(|_| ())
        .map_err(|e| Error::fs(dst.display().to_string(), e))
}

/// After a copy, walk the destination `blobs/` directory and assert each
/// file's size matches the source (`--verify`); optionally also recompute
/// and compare its SHA-256 against its own filename.
pub async fn verify_copy(source_repo_dir: &Path, destination_repo_dir: &Path, check_hash: bool) -> Result<()> {
    let src_blobs = source_repo_dir.join("blobs");
    let dst_blobs = destination_repo_dir.join("blobs");

    let mut entries = match tokio::fs::read_dir(&dst_blobs).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::fs(dst_blobs.display().to_string(), e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::fs(dst_blobs.display().to_string(), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".incomplete") || name.ends_with(".incomplete.meta") {
            continue;
        }
        let dst_path = entry.path();
        let src_path = src_blobs.join(&name);

        let (dst_meta, src_meta) = (
            tokio::fs::metadata(&dst_path)
                .await
                .map_err(|e| Error::fs(dst_path.display().to_string(), e))?,
            tokio::fs::metadata(&src_path)
                .await
                .map_err(|e| Error::fs(src_path.display().to_string(), e))?,
        );
        if dst_meta.len() != src_meta.len() {
            return Err(Error::Verification {
                path: dst_path.display().to_string(),
                reason: format!(
                    "copied size {} does not match source size {}",
                    dst_meta.len(),
                    src_meta.len()
                ),
            });
        }

        if check_hash {
            let actual = crate::cache::blob::sha256_file(&dst_path).await?;
            if actual != name {
                return Err(Error::Verification {
                    path: dst_path.display().to_string(),
                    reason: format!("blob content does not hash to its own filename: computed {actual}"),
                });
            }
        }
    }
    Ok(())
}

/// Remove a destination repository directory entirely, used by force mode
/// before re-copying an incomplete or outdated repository.
pub async fn remove_repo(repo_dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(repo_dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::fs(repo_dir.display().to_string(), e)),
    }
}

/// The destination path for a repository under a hub directory.
pub fn repo_dir_in(hub_dir: &Path, summary: &RepoSummary) -> PathBuf {
    hub_dir.join(summary.dir_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_repo(hub_dir: &Path, kind: &str, owner: &str, name: &str, commit: &str, blob_sizes: &[u64]) {
        let repo_dir = hub_dir.join(format!("{kind}--{owner}--{name}"));
        tokio::fs::create_dir_all(repo_dir.join("refs")).await.unwrap();
        tokio::fs::create_dir_all(repo_dir.join("blobs")).await.unwrap();
        tokio::fs::create_dir_all(repo_dir.join("snapshots").join(commit)).await.unwrap();
        tokio::fs::write(repo_dir.join("refs").join("main"), commit).await.unwrap();
        for (i, size) in blob_sizes.iter().enumerate() {
            let data = vec![0u8; *size as usize];
            tokio::fs::write(repo_dir.join("blobs").join(format!("blob{i}")), data)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn diff_reports_missing_extra_and_outdated() {
        let dir = tempfile::tempdir().unwrap();
        let source_hub = dir.path().join("source").join("hub");
        let dest_hub = dir.path().join("dest").join("hub");
        tokio::fs::create_dir_all(&source_hub).await.unwrap();
        tokio::fs::create_dir_all(&dest_hub).await.unwrap();

        write_repo(&source_hub, "models", "owner", "a", "c1", &[10]).await;
        write_repo(&source_hub, "models", "owner", "b", "c1", &[10]).await;
        write_repo(&source_hub, "models", "owner", "c", "c1", &[10]).await;
        write_repo(&dest_hub, "models", "owner", "a", "c1", &[10]).await;
        write_repo(&dest_hub, "models", "owner", "c", "c2", &[10]).await;
        write_repo(&dest_hub, "models", "owner", "d", "c1", &[10]).await;

        let result = diff(&source_hub, &dest_hub).await.unwrap();
        assert_eq!(result.missing.len(), 1);
        assert_eq!(result.missing[0].repo.name, "b");
        assert_eq!(result.extra.len(), 1);
        assert_eq!(result.extra[0].repo.name, "d");
        assert_eq!(result.outdated.len(), 1);
        assert_eq!(result.outdated[0].0.repo.name, "c");
    }

    #[tokio::test]
    async fn copy_repo_preserves_tree_and_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src-repo");
        let dst = dir.path().join("dst-repo");
        tokio::fs::create_dir_all(src.join("blobs")).await.unwrap();
        tokio::fs::write(src.join("blobs").join("deadbeef"), b"content").await.unwrap();
        tokio::fs::create_dir_all(src.join("snapshots").join("c1")).await.unwrap();

        #[cfg(unix)]
        std::os::unix::fs::symlink("../../blobs/deadbeef", src.join("snapshots").join("c1").join("file.bin")).unwrap();

        copy_repo(&src, &dst).await.unwrap();

        assert!(dst.join("blobs").join("deadbeef").exists());
        #[cfg(unix)]
        {
            let link = dst.join("snapshots").join("c1").join("file.bin");
            assert!(tokio::fs::symlink_metadata(&link).await.unwrap().file_type().is_symlink());
            assert!(tokio::fs::metadata(&link).await.is_ok());
        }
    }

    #[tokio::test]
    async fn is_incomplete_detects_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        tokio::fs::create_dir_all(repo.join("refs")).await.unwrap();
        tokio::fs::create_dir_all(repo.join("blobs")).await.unwrap();
        tokio::fs::write(repo.join("blobs").join("x"), b"x").await.unwrap();
        // snapshots/ missing entirely.
        assert!(is_incomplete(&repo).await.unwrap());
    }

    #[tokio::test]
    async fn is_incomplete_detects_dangling_snapshot_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        tokio::fs::create_dir_all(repo.join("refs")).await.unwrap();
        tokio::fs::write(repo.join("refs").join("main"), "c1").await.unwrap();
        tokio::fs::create_dir_all(repo.join("blobs")).await.unwrap();
        tokio::fs::write(repo.join("blobs").join("present"), b"x").await.unwrap();
        tokio::fs::create_dir_all(repo.join("snapshots").join("c1")).await.unwrap();

        #[cfg(unix)]
        std::os::unix::fs::symlink("../../blobs/missing", repo.join("snapshots").join("c1").join("gone.bin")).unwrap();

        assert!(is_incomplete(&repo).await.unwrap());
    }
}
