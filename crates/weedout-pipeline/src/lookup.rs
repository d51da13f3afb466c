//! Resolution of requested artifact names.
//!
//! Clients ask for results by whatever name they remember: the canonical
//! `processed_<name>`, the bare upload name, or a fragment of either.
//! [`resolve`] tries, in order:
//!
//! 1. an exact match in processed storage;
//! 2. the name with the `processed_` prefix prepended, if it lacked it;
//! 3. the first file (in sorted order) whose name contains the request.
//!
//! A miss is a [`PipelineError::NotFound`] carrying the full listing.

use std::path::PathBuf;

use crate::error::{PipelineError, Result};
use crate::staging::{PROCESSED_PREFIX, StorageLayout, artifact_name, list_files};

/// Names of every processed artifact, sorted.
pub fn list_processed(layout: &StorageLayout) -> Result<Vec<String>> {
    layout.ensure_directories()?;
    list_files(&layout.processed_dir).map_err(|e| {
        PipelineError::storage(
            format!("Failed to list {}", layout.processed_dir.display()),
            e,
        )
    })
}

/// Locate the processed artifact best matching `requested`.
pub fn resolve(layout: &StorageLayout, requested: &str) -> Result<PathBuf> {
    let available = list_processed(layout)?;

    if is_plain_name(requested) {
        if available.iter().any(|name| name == requested) {
            return Ok(layout.processed_dir.join(requested));
        }

        if !requested.starts_with(PROCESSED_PREFIX) {
            let prefixed = artifact_name(requested);
            if available.contains(&prefixed) {
                return Ok(layout.processed_dir.join(prefixed));
            }
        }
    }

    if !requested.is_empty()
        && let Some(name) = available.iter().find(|name| name.contains(requested))
    {
        return Ok(layout.processed_dir.join(name));
    }

    Err(PipelineError::NotFound {
        requested: requested.to_string(),
        available,
    })
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}
