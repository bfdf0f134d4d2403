//! Private, atomic file writes shared by the caches and the PoP key store.

use kubelogin_core::{Error, Result};
use std::io::Write;
use std::path::Path;

/// Create `dir` (and parents) with mode 0700.
pub fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|e| Error::io_at(dir, e))
}

/// Write `contents` to `path` through a temp file and rename.
///
/// Readers never observe a truncated file; the result has mode 0600.
pub fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = stage_private(path, contents)?;
    tmp.persist(path).map_err(|e| Error::io_at(path, e.error))?;
    Ok(())
}

/// Like [`write_private`], but never replaces an existing file.
///
/// Returns `false` when another writer created `path` first.
pub fn write_private_new(path: &Path, contents: &[u8]) -> Result<bool> {
    let tmp = stage_private(path, contents)?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(Error::io_at(path, e.error)),
    }
}

fn stage_private(path: &Path, contents: &[u8]) -> Result<tempfile::NamedTempFile> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    create_private_dir(dir)?;

    // NamedTempFile is created with mode 0600 on unix.
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io_at(dir, e))?;
    tmp.write_all(contents).map_err(|e| Error::io_at(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io_at(tmp.path(), e))?;
    Ok(tmp)
}

/// Read a file, mapping a missing file to `Ok(None)`.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io_at(path, e)),
    }
}

/// Recursively delete a directory; a missing directory is not an error.
pub fn remove_dir_all_if_exists(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io_at(dir, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_private_creates_dirs_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.json");
        write_private(&path, b"one").unwrap();
        write_private(&path, b"two").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
            let dir_mode = std::fs::metadata(path.parent().unwrap())
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(dir_mode & 0o777, 0o700);
        }
    }

    #[test]
    fn test_write_private_new_keeps_first_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        assert!(write_private_new(&path, b"first").unwrap());
        assert!(!write_private_new(&path, b"second").unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn test_read_optional_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn test_remove_missing_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cache");
        remove_dir_all_if_exists(&target).unwrap();
        std::fs::create_dir_all(target.join("inner")).unwrap();
        remove_dir_all_if_exists(&target).unwrap();
        assert!(!target.exists());
    }
}
