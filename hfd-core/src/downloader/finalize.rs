// SPDX-License-Identifier: MIT
//! Finalizing a downloaded blob: verify, rename into `blobs/<hash>`, then
//! wire up the snapshot and friendly-view symlinks (strict order — an
//! observer never sees a snapshot symlink to a missing blob, per spec.md
//! §5's ordering guarantee).

use std::path::Path;

use crate::cache::layout::RepoLayout;
use crate::cache::{friendly, lock, snapshot};
use crate::error::Result;
use crate::settings::VerifyMode;
use crate::verifier::verify;

pub struct FinalizeRequest<'a> {
    pub layout: &'a RepoLayout,
    pub commit: &'a str,
    pub relative_path: &'a str,
    pub expected_size: u64,
    pub is_lfs: bool,
    pub declared_sha256: Option<&'a str>,
    pub verify_mode: VerifyMode,
    pub filter_subdir: Option<&'a str>,
}

pub struct FinalizeOutcome {
    pub hash: String,
    pub blob_path: std::path::PathBuf,
}

/// Verify the bytes at `incomplete_path`, rename into place, and ensure
/// both the snapshot entry and friendly entry point at the finalized blob.
pub async fn finalize(request: &FinalizeRequest<'_>, incomplete_path: &Path, meta_path: &Path) -> Result<FinalizeOutcome> {
    let hash = verify(
        incomplete_path,
        request.expected_size,
        request.is_lfs,
        request.declared_sha256,
        request.verify_mode,
    )
    .await?;

    let blob_path = request.layout.blob_path(&hash);
    lock::release(incomplete_path, meta_path, &blob_path).await?;

    let snapshot_entry = request.layout.snapshot_entry(request.commit, request.relative_path);
    snapshot::ensure_symlink(&snapshot_entry, &blob_path).await?;

    let friendly_entry = request
        .layout
        .friendly_entry(request.filter_subdir, request.relative_path);
    friendly::ensure_friendly_entry(&friendly_entry, &snapshot_entry).await?;

    Ok(FinalizeOutcome { hash, blob_path })
}
