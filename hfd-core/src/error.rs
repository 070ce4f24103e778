// SPDX-License-Identifier: MIT
//! The error taxonomy used across the download core.
//!
//! Every variant carries the structured context (which file, which attempt,
//! which URL) needed to act on it; only the outermost layer renders these
//! to text for a human.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid repository id {id:?}: {reason}")]
    InvalidRepoId { id: String, reason: String },

    #[error("revision {revision:?} not found for {repo}")]
    RevisionNotFound { repo: String, revision: String },

    #[error("{repo} is ambiguous: could be {kinds:?}")]
    Ambiguous { repo: String, kinds: Vec<String> },

    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream error {status} fetching {url} after {attempts} attempt(s)")]
    Upstream {
        url: String,
        status: u16,
        attempts: u32,
    },

    #[error("verification failed for {path}: {reason}")]
    Verification { path: String, reason: String },

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is locked by pid {pid}")]
    Locked { path: String, pid: u32 },

    #[error("download of {path} was cancelled")]
    Cancelled { path: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn fs(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Error::Network {
            url: url.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
