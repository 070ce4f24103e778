// SPDX-License-Identifier: MIT
//! Turns `{repo, kind, revision, include, exclude}` into a concrete
//! `Plan`: a resolved commit id and an ordered list of files to fetch.

use std::sync::Arc;

use hfd_shared::{RepoId, RepoKind};

use crate::error::{Error, Result};
use crate::hub_client::HubClient;
use crate::pattern;
use crate::settings::Token;

#[derive(Debug, Clone, PartialEq)]
pub struct PlanItem {
    pub relative_path: String,
    pub size_bytes: u64,
    pub is_lfs: bool,
    pub sha256: Option<String>,
    pub fetch_url: String,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub commit: String,
    pub items: Vec<PlanItem>,
    /// Set when `append_filter_subdir` was requested and exactly one
    /// include pattern matched every kept item's determining match.
    pub filter_subdir: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub append_filter_subdir: bool,
}

pub struct Planner {
    hub_client: Arc<dyn HubClient>,
}

impl Planner {
    pub fn new(hub_client: Arc<dyn HubClient>) -> Self {
        Planner { hub_client }
    }

    /// Resolve `repo` to a commit id. When `kind` is `None`, both kinds are
    /// tried; exactly one succeeding resolves, both succeeding is
    /// `Ambiguous`, neither is `NotFound`.
    pub async fn resolve(
        &self,
        repo: &RepoId,
        kind: Option<RepoKind>,
        revision: &str,
        token: Option<&Token>,
    ) -> Result<(RepoKind, String)> {
        match kind {
            Some(kind) => {
                let tree = self.hub_client.resolve_tree(repo, kind, revision, token).await?;
                Ok((kind, tree.commit))
            }
            None => {
                let mut resolved = Vec::new();
                for kind in RepoKind::ALL {
                    match self.hub_client.resolve_tree(repo, kind, revision, token).await {
                        Ok(tree) => resolved.push((kind, tree.commit)),
                        Err(Error::RevisionNotFound { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                match resolved.len() {
                    0 => Err(Error::RevisionNotFound {
                        repo: repo.to_string(),
                        revision: revision.to_string(),
                    }),
                    1 => Ok(resolved.into_iter().next().unwrap()),
                    _ => Err(Error::Ambiguous {
                        repo: repo.to_string(),
                        kinds: resolved.into_iter().map(|(k, _)| k.to_string()).collect(),
                    }),
                }
            }
        }
    }

    /// Build a plan for an already-resolved `{repo, kind, revision}`.
    pub async fn plan(
        &self,
        repo: &RepoId,
        kind: RepoKind,
        revision: &str,
        request: &PlanRequest,
        token: Option<&Token>,
    ) -> Result<Plan> {
        let tree = self
            .hub_client
            .resolve_tree(repo, kind, revision, token)
            .await?;

        let mut entries: Vec<_> = tree.entries.into_iter().collect();
        // Discovery order: depth-first, alphabetical per directory level.
        // Sorting by path-segment tuples approximates a directory walk
        // without needing to materialize a tree.
        entries.sort_by(|a, b| {
            let a_segments: Vec<&str> = a.path.split('/').collect();
            let b_segments: Vec<&str> = b.path.split('/').collect();
            a_segments.cmp(&b_segments)
        });

        let mut filter_subdir = None;
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            if !pattern::is_kept(&entry.path, &request.include, &request.exclude) {
                continue;
            }
            if request.append_filter_subdir {
                if let Some(sole) = pattern::sole_matching_include(&entry.path, &request.include) {
                    filter_subdir = Some(sole.to_string());
                }
            }
            let fetch_url = self.hub_client.resolve_url(repo, &tree.commit, &entry.path);
            items.push(PlanItem {
                relative_path: entry.path,
                size_bytes: entry.size,
                is_lfs: entry.is_lfs,
                sha256: entry.sha256,
                fetch_url,
            });
        }

        Ok(Plan {
            commit: tree.commit,
            items,
            filter_subdir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub_client::{ByteRange, FetchResponse, RepoTree, TreeEntry};
    use async_trait::async_trait;

    struct StubHubClient {
        commit: String,
        entries: Vec<TreeEntry>,
    }

    #[async_trait]
    impl HubClient for StubHubClient {
        async fn resolve_tree(
            &self,
            _repo: &RepoId,
            _kind: RepoKind,
            _revision: &str,
            _token: Option<&Token>,
        ) -> Result<RepoTree> {
            Ok(RepoTree {
                commit: self.commit.clone(),
                entries: self.entries.clone(),
            })
        }

        async fn fetch(
            &self,
            _url: &str,
            _range: Option<ByteRange>,
            _token: Option<&Token>,
        ) -> Result<FetchResponse> {
            unimplemented!("not used by planner tests")
        }

        fn resolve_url(&self, repo: &RepoId, revision: &str, path: &str) -> String {
            format!("https://stub/{repo}/resolve/{revision}/{path}")
        }
    }

    fn entry(path: &str, size: u64, is_lfs: bool) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            size,
            is_lfs,
            sha256: is_lfs.then(|| "deadbeef".to_string()),
        }
    }

    #[tokio::test]
    async fn orders_items_depth_first_alphabetical() {
        let client = Arc::new(StubHubClient {
            commit: "c1".into(),
            entries: vec![
                entry("z.json", 1, false),
                entry("onnx/model.onnx", 2, false),
                entry("a.json", 1, false),
                entry("onnx/config.json", 1, false),
            ],
        });
        let planner = Planner::new(client);
        let repo: RepoId = "owner/name".parse().unwrap();
        let plan = planner
            .plan(&repo, RepoKind::Model, "main", &PlanRequest::default(), None)
            .await
            .unwrap();

        let paths: Vec<_> = plan.items.iter().map(|i| i.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["a.json", "onnx/config.json", "onnx/model.onnx", "z.json"]);
    }

    #[tokio::test]
    async fn include_exclude_filters_and_reports_filter_subdir() {
        let client = Arc::new(StubHubClient {
            commit: "c1".into(),
            entries: vec![
                entry("model.gguf", 10, false),
                entry("model.safetensors", 20, false),
                entry("README.md", 1, false),
            ],
        });
        let planner = Planner::new(client);
        let repo: RepoId = "owner/name".parse().unwrap();
        let request = PlanRequest {
            include: vec!["*.gguf".to_string()],
            exclude: vec![],
            append_filter_subdir: true,
        };
        let plan = planner
            .plan(&repo, RepoKind::Model, "main", &request, None)
            .await
            .unwrap();

        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].relative_path, "model.gguf");
        assert_eq!(plan.filter_subdir.as_deref(), Some("*.gguf"));
    }
}
