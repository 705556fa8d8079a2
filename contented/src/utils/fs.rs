//! Filesystem helpers shared across modules.
//!
//! These helpers attach the operation and path to IO errors.

use std::path::Path;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error(op, path, e))
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Remove a directory and everything below it. A missing directory is not an error.
pub async fn remove_dir_all_if_exists(op: &'static str, path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(op, path, e)),
    }
}

/// Whether `path` exists and is a regular file.
pub async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Strip `root` from any occurrence in `message`, so user-facing task
/// messages never carry absolute locations.
pub fn strip_root(message: &str, root: &Path) -> String {
    let root = root.to_string_lossy();
    let root = root.trim_end_matches(['/', '\\']);
    if root.is_empty() || root == "." {
        return message.to_string();
    }
    message
        .replace(&format!("{root}/"), "")
        .replace(&format!("{root}\\"), "")
        .replace(root, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remove_missing_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        remove_dir_all_if_exists("removing", &missing).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_and_is_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_dir_all_with_op("creating", &nested).await.unwrap();
        assert!(!is_file(&nested).await);
        let file = nested.join("f.txt");
        std::fs::write(&file, b"1").unwrap();
        assert!(is_file(&file).await);
    }

    #[test]
    fn test_strip_root() {
        let root = Path::new("/srv/media/");
        assert_eq!(
            strip_root("failed on /srv/media/box/a.mp4", root),
            "failed on box/a.mp4"
        );
        assert_eq!(strip_root("nothing here", root), "nothing here");
        assert_eq!(strip_root("x", Path::new(".")), "x");
    }
}
