//! Asynchronous directory removal with progress reporting
//!
//! Used to wipe stale staging directories before re-initializing them.
//! Individual filesystem failures are logged as warnings and skipped; the
//! reap continues best-effort so a partially unlinkable tree never aborts a
//! build.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Removes `root` and everything under it, invoking `on_progress` with the
/// running count of removed entries.
///
/// Returns the number of entries removed. Only a failure to read the root
/// directory itself is returned as an error; per-entry failures are warnings.
pub async fn reap_dir<F>(root: &Path, mut on_progress: F) -> io::Result<u64>
where
    F: FnMut(u64),
{
    let mut removed: u64 = 0;
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    let mut dirs: Vec<PathBuf> = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                if dir == root {
                    return Err(err);
                }
                warn!(path = %dir.display(), error = %err, "Failed to enumerate directory during reap");
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "Failed to read directory entry during reap");
                    break;
                }
            };

            let path = entry.path();
            let is_dir = match entry.file_type().await {
                // Symlinks are reported as their own type, never followed
                Ok(file_type) => file_type.is_dir(),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to stat entry during reap");
                    continue;
                }
            };

            if is_dir {
                pending.push(path);
            } else {
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        removed += 1;
                        on_progress(removed);
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Failed to remove file during reap");
                    }
                }
            }
        }

        dirs.push(dir);
    }

    // Children first, then parents
    for dir in dirs.iter().rev() {
        match fs::remove_dir(dir).await {
            Ok(()) => {
                removed += 1;
                on_progress(removed);
            }
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "Failed to remove directory during reap");
            }
        }
    }

    debug!(path = %root.display(), removed, "Directory reap finished");
    Ok(removed)
}
