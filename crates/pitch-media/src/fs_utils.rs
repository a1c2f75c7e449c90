//! Partial-output file handling.
//!
//! Encoders write to `<final>.part` and only promote the file once the
//! encoder has exited cleanly, so an aborted run never leaves a file at a
//! final output path.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

const PART_SUFFIX: &str = "part";

/// Temporary path used while a view is being encoded.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(".");
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Move a finished partial file to its final path.
///
/// `src` is the [`partial_path`] sibling of `dst`, so this is a plain
/// same-directory rename.
pub async fn promote_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    fs::rename(src, dst).await.map_err(MediaError::from)
}

/// Remove a partial file if present. Never fails.
pub async fn discard_file(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Discarded partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to discard {}: {}", path.display(), e),
    }
}
