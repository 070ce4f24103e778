// SPDX-License-Identifier: MIT
//! The on-disk cache layout and its invariants: blobs, refs, snapshots,
//! partial files, lock metadata, friendly-view symlinks, per-repo manifest.

pub mod blob;
pub mod friendly;
pub mod layout;
pub mod lock;
pub mod snapshot;

pub use layout::RepoLayout;
