// SPDX-License-Identifier: MIT
//! The download engine behind a hub-style, content-addressed model and
//! dataset cache: planning, scheduling, transferring, verifying, and
//! reconciling the on-disk layout described in `cache::layout`.
//!
//! This crate has no CLI, server, or UI surface of its own; it is a library
//! consumed by whatever front end drives it.

pub mod cache;
pub mod downloader;
pub mod error;
pub mod hub_client;
pub mod job;
pub mod mirror;
pub mod pattern;
pub mod planner;
pub mod progress;
pub mod scheduler;
pub mod settings;
pub mod synchronizer;
pub mod verifier;

pub use error::{Error, Result};
pub use hub_client::{HubClient, ReqwestHubClient};
pub use job::{run_job, JobItemError, JobOutcome, JobRequest};
pub use planner::{Plan, PlanItem, PlanRequest, Planner};
pub use progress::ProgressSink;
pub use scheduler::Scheduler;
pub use settings::{Settings, Token, VerifyMode};

pub use hfd_shared::{Manifest, ManifestFile, RepoId, RepoIdError, RepoKind};
