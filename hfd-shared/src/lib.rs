// SPDX-License-Identifier: MIT
//! Shared, dependency-light types for the hub download cache engine.
//!
//! This crate holds data that both the download core and any outer layer
//! (CLI, server, TUI — none of which live in this workspace) need to agree
//! on: repository identifiers, the manifest record written per download,
//! mirror target records, and the progress event vocabulary. Nothing here
//! touches the filesystem or the network.

pub mod manifest;
pub mod progress;
pub mod repo;
pub mod target;

pub use manifest::{Manifest, ManifestFile};
pub use progress::Event;
pub use repo::{RepoId, RepoIdError, RepoKind};
pub use target::{Target, TargetStore};
