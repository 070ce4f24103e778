// SPDX-License-Identifier: MIT
//! Whole-repository download jobs: plan, fan out one task per file bounded
//! by the scheduler, and aggregate per-file outcomes into a manifest.
//!
//! Concurrent tasks push their finished item into one `parking_lot`-guarded
//! collector rather than routing results back through a channel of their
//! own — the same shared-state-under-a-lock shape used elsewhere in this
//! ecosystem for tracking progress across tasks that otherwise don't talk
//! to each other.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use hfd_shared::{Manifest, ManifestFile, RepoId, RepoKind};

use crate::cache::layout::RepoLayout;
use crate::downloader::{download_item, DownloadItemRequest, ItemResult};
use crate::error::{Error, Result};
use crate::hub_client::HubClient;
use crate::planner::{PlanRequest, Planner};
use crate::progress::{Event, ProgressSink};
use crate::scheduler::Scheduler;
use crate::settings::{Settings, Token};

pub struct JobRequest<'a> {
    pub hub_client: Arc<dyn HubClient>,
    pub settings: &'a Settings,
    pub repo: &'a RepoId,
    pub kind: Option<RepoKind>,
    pub revision: &'a str,
    pub plan_request: &'a PlanRequest,
    pub token: Option<&'a Token>,
    pub command: String,
}

/// One file's terminal error, surfaced without stopping sibling files
/// (spec.md §7: a file-level terminal error doesn't abort the job).
#[derive(Debug, Clone)]
pub struct JobItemError {
    pub path: String,
    pub message: String,
}

pub struct JobOutcome {
    pub kind: RepoKind,
    pub manifest: Manifest,
    pub errors: Vec<JobItemError>,
}

struct Collected {
    path: String,
    size: u64,
    is_lfs: bool,
    outcome: Result<ItemResult>,
}

#[derive(Default)]
struct JobState {
    completed: Mutex<Vec<Collected>>,
}

impl JobState {
    fn record(&self, item: Collected) {
        self.completed.lock().push(item);
    }
}

/// Plan a repository, download every kept item, and write `hfd.yaml` once
/// every file has either installed or been skipped. The manifest is only
/// written when no file ended in a terminal error; a partial job leaves the
/// friendly view as-is rather than publishing an incomplete manifest.
pub async fn run_job(request: &JobRequest<'_>, scheduler: &Scheduler, progress: &ProgressSink) -> Result<JobOutcome> {
    progress.emit(Event::ScanStart {
        repo: request.repo.to_string(),
        revision: request.revision.to_string(),
    });

    let planner = Planner::new(Arc::clone(&request.hub_client));
    let kind = match request.kind {
        Some(kind) => kind,
        None => {
            planner
                .resolve(request.repo, None, request.revision, request.token)
                .await?
                .0
        }
    };
    let plan = planner
        .plan(request.repo, kind, request.revision, request.plan_request, request.token)
        .await?;

    let layout = RepoLayout::new(
        request.settings.hub_dir.clone(),
        request.settings.models_dir(),
        request.settings.datasets_dir(),
        request.repo.clone(),
        kind,
    );
    write_ref(&layout, request.revision, &plan.commit).await?;
    log::debug!("resolved {} @ {} to commit {}", request.repo, request.revision, plan.commit);

    for item in &plan.items {
        progress.emit(Event::PlanItem {
            path: item.relative_path.clone(),
            size: item.size_bytes,
            is_lfs: item.is_lfs,
        });
    }
    progress.emit(Event::ScanDone { total: plan.items.len() });

    let state = Arc::new(JobState::default());
    let started_at = Utc::now();

    let mut tasks = tokio::task::JoinSet::new();
    for item in plan.items.clone() {
        let layout = layout.clone();
        let hub_client = Arc::clone(&request.hub_client);
        let settings = request.settings.clone();
        let commit = plan.commit.clone();
        let filter_subdir = plan.filter_subdir.clone();
        let token = request.token.cloned();
        let scheduler = scheduler.clone();
        let progress = progress.clone();
        let state = Arc::clone(&state);

        tasks.spawn(async move {
            let download_request = DownloadItemRequest {
                layout: &layout,
                hub_client: &hub_client,
                settings: &settings,
                commit: &commit,
                item: &item,
                filter_subdir: filter_subdir.as_deref(),
                token: token.as_ref(),
            };
            let outcome = download_item(&download_request, &scheduler, &progress).await;
            state.record(Collected {
                path: item.relative_path.clone(),
                size: item.size_bytes,
                is_lfs: item.is_lfs,
                outcome,
            });
        });
    }

    while tasks.join_next().await.is_some() {}

    let completed = Arc::into_inner(state)
        .expect("every spawned task has completed and dropped its state clone")
        .completed
        .into_inner();

    let mut files = Vec::new();
    let mut errors = Vec::new();
    for item in completed {
        match item.outcome {
            // `LockedBySibling` carries no hash and isn't a failure: another
            // process owns that file for this run, nothing to record here.
            Ok(result) => {
                if let Some(hash) = result.blob_hash {
                    files.push(ManifestFile {
                        name: item.path,
                        size: item.size,
                        is_lfs: item.is_lfs,
                        blob: format!("blobs/{hash}"),
                    });
                }
            }
            Err(e) => errors.push(JobItemError {
                path: item.path,
                message: e.to_string(),
            }),
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));

    if errors.is_empty() {
        log::info!("{} @ {}: job complete, {} file(s)", request.repo, request.revision, files.len());
    } else {
        log::warn!(
            "{} @ {}: job finished with {} error(s), manifest not written",
            request.repo,
            request.revision,
            errors.len()
        );
    }

    progress.emit(if errors.is_empty() {
        Event::Done { message: "ok".into() }
    } else {
        Event::Done {
            message: format!("{} file(s) failed", errors.len()),
        }
    });

    let manifest = Manifest {
        version: "1".to_string(),
        kind: kind.to_string(),
        repo: request.repo.to_string(),
        revision: request.revision.to_string(),
        commit: plan.commit.clone(),
        started_at,
        completed_at: Utc::now(),
        command: request.command.clone(),
        total_size: 0,
        total_files: 0,
        files,
    }
    .recomputed_totals();

    if errors.is_empty() {
        let manifest_path = layout.manifest_path(plan.filter_subdir.as_deref());
        if let Some(parent) = manifest_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::fs(parent.display().to_string(), e))?;
        }
        let yaml = manifest.to_yaml().map_err(|e| Error::Other(e.to_string()))?;
        tokio::fs::write(&manifest_path, yaml)
            .await
            .map_err(|e| Error::fs(manifest_path.display().to_string(), e))?;
    }

    Ok(JobOutcome { kind, manifest, errors })
}

/// Record which commit `revision` resolved to, per spec.md §3: a ref is
/// created/updated at download start, once the planner has resolved the
/// commit, independent of whether any files still need transferring.
async fn write_ref(layout: &RepoLayout, revision: &str, commit: &str) -> Result<()> {
    let ref_path = layout.ref_path(revision);
    if let Some(parent) = ref_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::fs(parent.display().to_string(), e))?;
    }
    tokio::fs::write(&ref_path, commit.trim())
        .await
        .map_err(|e| Error::fs(ref_path.display().to_string(), e))
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

        async fn fetch(&self, _url: &str, _range: Option<ByteRange>, _token: Option<&Token>) -> Result<FetchResponse> {
            unimplemented!("not used: every entry here already matches on disk")
        }

        fn resolve_url(&self, repo: &RepoId, revision: &str, path: &str) -> String {
            format!("https://stub/{repo}/resolve/{revision}/{path}")
        }
    }

    #[tokio::test]
    async fn job_skips_already_present_file_and_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.cache_dir = dir.path().to_path_buf();
        settings.hub_dir = dir.path().join("hub");

        let repo: RepoId = "owner/name".parse().unwrap();
        let layout = RepoLayout::new(
            settings.hub_dir.clone(),
            settings.models_dir(),
            settings.datasets_dir(),
            repo.clone(),
            RepoKind::Model,
        );

        let hash = "deadbeef";
        let content = b"hello";
        let blob = layout.blob_path(hash);
        tokio::fs::create_dir_all(blob.parent().unwrap()).await.unwrap();
        tokio::fs::write(&blob, content).await.unwrap();
        let snapshot_entry = layout.snapshot_entry("commit1", "config.json");
        crate::cache::snapshot::ensure_symlink(&snapshot_entry, &blob).await.unwrap();
        let friendly_entry = layout.friendly_entry(None, "config.json");
        crate::cache::friendly::ensure_friendly_entry(&friendly_entry, &snapshot_entry)
            .await
            .unwrap();

        let hub_client: Arc<dyn HubClient> = Arc::new(StubHubClient {
            commit: "commit1".to_string(),
            entries: vec![TreeEntry {
                path: "config.json".to_string(),
                size: content.len() as u64,
                is_lfs: false,
                sha256: None,
            }],
        });

        let request = JobRequest {
            hub_client,
            settings: &settings,
            repo: &repo,
            kind: Some(RepoKind::Model),
            revision: "main",
            plan_request: &PlanRequest::default(),
            token: None,
            command: "hfd download owner/name".to_string(),
        };
        let scheduler = Scheduler::new(2, 4);
        let progress = ProgressSink::none();

        let outcome = run_job(&request, &scheduler, &progress).await.unwrap();
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.manifest.files.len(), 1);
        assert_eq!(outcome.manifest.files[0].blob, format!("blobs/{hash}"));

        let manifest_path = layout.manifest_path(None);
        assert!(manifest_path.exists());

        let ref_content = tokio::fs::read_to_string(layout.ref_path("main")).await.unwrap();
        assert_eq!(ref_content, "commit1");
    }
}
