//! Crash-safe file writes.

use std::io::Write;
use std::path::Path;

use crate::error::{AttoError, Result};

/// Write `data` to `path` atomically.
///
/// The bytes go to a uniquely named temp file in the same directory, are
/// flushed to stable storage, and the temp file is then renamed over `path`.
/// A reader sees either the old file or the new one, never a partial write.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| AttoError::Validation(format!("no parent directory: {}", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".atto-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(path).map_err(|e| AttoError::Io(e.error))?;
    Ok(())
}

/// Async wrapper around [`write_atomic`] that runs on the blocking pool.
pub async fn write_atomic_async(path: std::path::PathBuf, data: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || write_atomic(&path, &data))
        .await
        .map_err(|e| AttoError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        write_atomic(&path, b"{\"a\":1}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["data.json".to_string()]);
    }

    #[test]
    fn test_write_atomic_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("state.json");
        write_atomic(&path, b"x").unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_write_atomic_async() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("async.json");
        write_atomic_async(path.clone(), b"ok".to_vec()).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "ok");
    }
}
