// SPDX-License-Identifier: MIT
//! The progress event vocabulary consumed by external UIs.
//!
//! Events are plain values sent over a channel (see `hfd-core`'s
//! `progress` module), not an installed callback, so the core stays
//! synchronous at its boundary and the consumer controls its own batching.

use serde::{Deserialize, Serialize};

/// One emitted progress event. The variant name matches the `event` column
/// of the external-interfaces table exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    ScanStart {
        repo: String,
        revision: String,
    },
    PlanItem {
        path: String,
        size: u64,
        is_lfs: bool,
    },
    ScanDone {
        total: usize,
    },
    FileStart {
        path: String,
        size: u64,
    },
    FileProgress {
        path: String,
        downloaded: u64,
        total: u64,
    },
    FileDone {
        path: String,
        message: String,
    },
    Retry {
        path: String,
        attempt: u32,
        message: String,
    },
    Error {
        path: Option<String>,
        message: String,
    },
    Done {
        message: String,
    },
}

impl Event {
    /// `file_done` event for the common "already present" fast path.
    pub fn skip_size_match(path: impl Into<String>) -> Self {
        Event::FileDone {
            path: path.into(),
            message: "skip: size match".into(),
        }
    }

    pub fn skip_sha256_match(path: impl Into<String>) -> Self {
        Event::FileDone {
            path: path.into(),
            message: "skip: sha256 match".into(),
        }
    }

    pub fn ok(path: impl Into<String>) -> Self {
        Event::FileDone {
            path: path.into(),
            message: "ok".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_tagged_event_field() {
        let e = Event::FileStart {
            path: "config.json".into(),
            size: 120,
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"event\":\"file_start\""));
    }
}
