//! Scoped scratch storage under the configured temp root.

use std::fs;
use std::io;
use std::path::Path;

use tempfile::TempDir;

use crate::TRACING_TARGET_PIPELINE;

/// Name prefix of every scratch directory created by the pipeline.
pub const SCRATCH_PREFIX: &str = "lumen-";

/// Creates a scratch directory under `root`.
///
/// The directory and everything in it is removed when the guard drops, which
/// covers success, error and unwinding paths alike.
pub fn scratch_dir(root: &Path) -> io::Result<TempDir> {
    fs::create_dir_all(root)?;
    tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir_in(root)
}

/// Creates the temp root if needed and clears scratch left by a previous run.
///
/// Returns the number of stale directories removed.
pub fn prepare_temp_root(root: &Path) -> io::Result<usize> {
    fs::create_dir_all(root)?;
    sweep_temp_root(root)
}

/// Removes scratch directories under `root`, leaving unrelated files alone.
///
/// Returns the number of directories removed. A missing root is not an error.
pub fn sweep_temp_root(root: &Path) -> io::Result<usize> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let is_scratch = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(SCRATCH_PREFIX));

        if !is_scratch || !entry.file_type()?.is_dir() {
            continue;
        }

        match fs::remove_dir_all(entry.path()) {
            Ok(()) => removed += 1,
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET_PIPELINE,
                    path = %entry.path().display(),
                    error = %err,
                    "failed to remove stale scratch directory"
                );
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let scratch = scratch_dir(root.path()).unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.exists());

        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn sweep_only_touches_scratch_directories() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("lumen-stale")).unwrap();
        fs::create_dir(root.path().join("keep-me")).unwrap();
        fs::write(root.path().join("lumen-file.txt"), b"data").unwrap();

        let removed = prepare_temp_root(root.path()).unwrap();

        assert_eq!(removed, 1);
        assert!(!root.path().join("lumen-stale").exists());
        assert!(root.path().join("keep-me").exists());
        assert!(root.path().join("lumen-file.txt").exists());
    }

    #[test]
    fn sweep_of_missing_root_is_a_noop() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("absent");
        assert_eq!(sweep_temp_root(&missing).unwrap(), 0);
    }
}
