// SPDX-License-Identifier: MIT
//! The per-repository manifest written to the friendly-view directory root
//! at successful job completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in `Manifest::files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub name: String,
    pub size: u64,
    pub is_lfs: bool,
    /// `blobs/<hash>`, relative to the hub repository directory.
    pub blob: String,
}

/// `hfd.yaml` at the root of a friendly-view directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub kind: String,
    pub repo: String,
    pub revision: String,
    pub commit: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub command: String,
    pub total_size: u64,
    pub total_files: u64,
    pub files: Vec<ManifestFile>,
}

impl Manifest {
    /// Recompute `total_size`/`total_files` from `files`, enforcing
    /// invariant 6 of the data model rather than trusting a caller-supplied
    /// value.
    pub fn recomputed_totals(mut self) -> Self {
        self.total_size = self.files.iter().map(|f| f.size).sum();
        self.total_files = self.files.len() as u64;
        self
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }
}
