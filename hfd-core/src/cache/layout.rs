// SPDX-License-Identifier: MIT
//! Path builders for one repository's slice of the cache, and the
//! relative-symlink arithmetic shared by snapshots and the friendly view.

use std::path::{Path, PathBuf};

use hfd_shared::{RepoId, RepoKind};

/// All paths rooted at one repository's directory under `hub/`.
#[derive(Debug, Clone)]
pub struct RepoLayout {
    pub hub_dir: PathBuf,
    pub models_dir: PathBuf,
    pub datasets_dir: PathBuf,
    pub repo: RepoId,
    pub kind: RepoKind,
}

impl RepoLayout {
    pub fn new(hub_dir: PathBuf, models_dir: PathBuf, datasets_dir: PathBuf, repo: RepoId, kind: RepoKind) -> Self {
        RepoLayout {
            hub_dir,
            models_dir,
            datasets_dir,
            repo,
            kind,
        }
    }

    /// `hub/<kind>s--<owner>--<name>`
    pub fn repo_dir(&self) -> PathBuf {
        self.hub_dir.join(self.repo.canonical_dir_name(self.kind))
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.repo_dir().join("blobs")
    }

    pub fn refs_dir(&self) -> PathBuf {
        self.repo_dir().join("refs")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.repo_dir().join("snapshots")
    }

    pub fn ref_path(&self, revision: &str) -> PathBuf {
        self.refs_dir().join(revision)
    }

    pub fn snapshot_dir(&self, commit: &str) -> PathBuf {
        self.snapshots_dir().join(commit)
    }

    pub fn blob_path(&self, hash: &str) -> PathBuf {
        self.blobs_dir().join(hash)
    }

    pub fn incomplete_path(&self, hash: &str) -> PathBuf {
        self.blobs_dir().join(format!("{hash}.incomplete"))
    }

    pub fn incomplete_meta_path(&self, hash: &str) -> PathBuf {
        self.blobs_dir().join(format!("{hash}.incomplete.meta"))
    }

    pub fn snapshot_entry(&self, commit: &str, relative_path: &str) -> PathBuf {
        self.snapshot_dir(commit).join(relative_path)
    }

    /// The friendly-view root for this repository, e.g.
    /// `models/<owner>/<name>[/<filter_subdir>]`.
    pub fn friendly_repo_dir(&self, filter_subdir: Option<&str>) -> PathBuf {
        let base = match self.kind {
            RepoKind::Model => &self.models_dir,
            RepoKind::Dataset => &self.datasets_dir,
        };
        let mut dir = base.join(&self.repo.owner).join(&self.repo.name);
        if let Some(subdir) = filter_subdir {
            dir = dir.join(subdir);
        }
        dir
    }

    pub fn friendly_entry(&self, filter_subdir: Option<&str>, relative_path: &str) -> PathBuf {
        self.friendly_repo_dir(filter_subdir).join(relative_path)
    }

    pub fn manifest_path(&self, filter_subdir: Option<&str>) -> PathBuf {
        self.friendly_repo_dir(filter_subdir).join("hfd.yaml")
    }
}

/// Recover `{kind, owner, name}` from a canonical directory name such as
/// `models--owner--name`, the inverse of `RepoId::canonical_dir_name`.
pub fn parse_canonical_dir_name(dir_name: &str) -> Option<(RepoKind, String, String)> {
    let (prefix, rest) = dir_name.split_once("--")?;
    let kind = match prefix {
        "models" => RepoKind::Model,
        "datasets" => RepoKind::Dataset,
        _ => return None,
    };
    let (owner, name) = rest.split_once("--")?;
    Some((kind, owner.to_string(), name.to_string()))
}

/// The relative symlink text from `link_path`'s parent directory to
/// `target_path`, both rooted at the same repository directory. Per the
/// data model: the number of `../` segments equals the relative path depth
/// plus the fixed hops from the link's directory to the repo root.
pub fn relative_symlink_target(link_path: &Path, target_path: &Path) -> PathBuf {
    let link_dir = link_path.parent().unwrap_or(link_path);
    let mut link_components: Vec<_> = link_dir.components().collect();
    let mut target_components: Vec<_> = target_path.components().collect();

    while !link_components.is_empty()
        && !target_components.is_empty()
        && link_components[0] == target_components[0]
    {
        link_components.remove(0);
        target_components.remove(0);
    }

    let mut relative = PathBuf::new();
    for _ in 0..link_components.len() {
        relative.push("..");
    }
    for component in target_components {
        relative.push(component);
    }
    relative
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_target_has_expected_up_hops() {
        // snapshots/<commit>/sub/dir/file.bin -> blobs/<hash>; relative path
        // depth below snapshots/<commit>/ is 2 (sub, dir), plus two more
        // hops out of snapshots/<commit>/ into blobs/ => 4 "../" segments.
        let link = Path::new("repo/snapshots/abc123/sub/dir/file.bin");
        let target = Path::new("repo/blobs/deadbeef");
        let rel = relative_symlink_target(link, target);
        assert_eq!(rel, PathBuf::from("../../../../blobs/deadbeef"));
    }

    #[test]
    fn top_level_snapshot_entry_has_two_up_hops() {
        let link = Path::new("repo/snapshots/abc123/config.json");
        let target = Path::new("repo/blobs/deadbeef");
        let rel = relative_symlink_target(link, target);
        assert_eq!(rel, PathBuf::from("../../blobs/deadbeef"));
    }

    #[test]
    fn friendly_entry_points_into_snapshot() {
        let link = Path::new("models/owner/name/config.json");
        let target = Path::new("hub/models--owner--name/snapshots/abc123/config.json");
        let rel = relative_symlink_target(link, target);
        assert_eq!(
            rel,
            PathBuf::from("../../../hub/models--owner--name/snapshots/abc123/config.json")
        );
    }
}
