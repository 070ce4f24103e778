// SPDX-License-Identifier: MIT
//! The hub HTTP surface consumed by the planner and downloader.
//!
//! Kept behind a trait so tests can run against a real local server
//! (`wiremock`) through the same `reqwest`-backed implementation the
//! production binary uses, rather than a hand-rolled stub.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::settings::Token;
use hfd_shared::{RepoId, RepoKind};

/// One file entry in a repository's tree, as reported by the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEntry {
    pub path: String,
    pub size: u64,
    pub is_lfs: bool,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RepoTree {
    pub commit: String,
    pub entries: Vec<TreeEntry>,
}

/// A byte-range, half-open: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end - 1)
    }
}

pub struct FetchResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub accept_ranges: bool,
    inner: reqwest::Response,
}

impl FetchResponse {
    pub fn is_partial_content(&self) -> bool {
        self.status == 206
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn bytes_stream(
        self,
    ) -> impl futures::Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> {
        self.inner.bytes_stream()
    }
}

#[async_trait]
pub trait HubClient: Send + Sync {
    /// Resolve `{repo, kind, revision}` to a commit id and the file tree at
    /// that commit.
    async fn resolve_tree(
        &self,
        repo: &RepoId,
        kind: RepoKind,
        revision: &str,
        token: Option<&Token>,
    ) -> Result<RepoTree>;

    /// Issue a `GET` against a fully-qualified fetch URL, optionally with a
    /// byte range. Redirects (LFS → CDN) are followed transparently by the
    /// underlying HTTP client.
    async fn fetch(
        &self,
        url: &str,
        range: Option<ByteRange>,
        token: Option<&Token>,
    ) -> Result<FetchResponse>;

    /// The URL to fetch a given file's bytes at a revision.
    fn resolve_url(&self, repo: &RepoId, revision: &str, path: &str) -> String;
}

/// Production `HubClient`, backed by `reqwest`.
pub struct ReqwestHubClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ReqwestHubClient {
    pub fn new(endpoint: impl Into<String>, connect_timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|source| Error::network("<client build>", source))?;
        Ok(ReqwestHubClient {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn tree_url(&self, repo: &RepoId, kind: RepoKind, revision: &str) -> String {
        format!(
            "{}/api/{kind}s/{repo}/revision/{revision}",
            self.endpoint
        )
    }
}

#[derive(Debug, Deserialize)]
struct HubSibling {
    rfilename: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    lfs: Option<HubLfsInfo>,
}

#[derive(Debug, Deserialize)]
struct HubLfsInfo {
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct HubTreeResponse {
    sha: String,
    siblings: Vec<HubSibling>,
}

#[async_trait]
impl HubClient for ReqwestHubClient {
    async fn resolve_tree(
        &self,
        repo: &RepoId,
        kind: RepoKind,
        revision: &str,
        token: Option<&Token>,
    ) -> Result<RepoTree> {
        let url = self.tree_url(repo, kind, revision);
        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.bearer_auth(token.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|source| Error::network(&url, source))?;

        match response.status().as_u16() {
            200 => {}
            404 => {
                return Err(Error::RevisionNotFound {
                    repo: repo.to_string(),
                    revision: revision.to_string(),
                });
            }
            status => {
                return Err(Error::Upstream {
                    url,
                    status,
                    attempts: 1,
                });
            }
        }

        let body: HubTreeResponse = response
            .json()
            .await
            .map_err(|source| Error::network(&url, source))?;

        let entries = body
            .siblings
            .into_iter()
            .map(|s| {
                let (is_lfs, sha256, size) = match s.lfs {
                    Some(lfs) => (true, lfs.sha256, lfs.size.or(s.size).unwrap_or(0)),
                    None => (false, None, s.size.unwrap_or(0)),
                };
                TreeEntry {
                    path: s.rfilename,
                    size,
                    is_lfs,
                    sha256,
                }
            })
            .collect();

        Ok(RepoTree {
            commit: body.sha,
            entries,
        })
    }

    async fn fetch(
        &self,
        url: &str,
        range: Option<ByteRange>,
        token: Option<&Token>,
    ) -> Result<FetchResponse> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(reqwest::header::RANGE, range.header_value());
        }
        if let Some(token) = token {
            request = request.bearer_auth(token.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|source| Error::network(url, source))?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let accept_ranges = response
            .headers()
            .get(reqwest::header::ACCEPT_RANGES)
            .map(|v| v.as_bytes() == b"bytes")
            .unwrap_or(false);

        Ok(FetchResponse {
            status,
            content_length,
            accept_ranges,
            inner: response,
        })
    }

    fn resolve_url(&self, repo: &RepoId, revision: &str, path: &str) -> String {
        format!("{}/{repo}/resolve/{revision}/{path}", self.endpoint)
    }
}

/// Is an HTTP status one that's worth retrying, per spec.md §4.3.4?
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 500 | 502 | 503 | 504)
}
