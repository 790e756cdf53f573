//! Canonical plugin paths.
//!
//! The canonical path is the identity key of a loaded module, so load and
//! unload must resolve it the same way.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Resolve `path` to an absolute path with every symlink followed.
pub fn canonicalize(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|source| Error::Failed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_relative_components() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("series2.so");
        std::fs::write(&file, b"").unwrap();

        let indirect = dir.path().join(".").join("series2.so");
        assert_eq!(canonicalize(&indirect).unwrap(), file.canonicalize().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("series2.so");
        std::fs::write(&file, b"").unwrap();
        let link = dir.path().join("current.so");
        std::os::unix::fs::symlink(&file, &link).unwrap();

        assert_eq!(canonicalize(&link).unwrap(), canonicalize(&file).unwrap());
    }

    #[test]
    fn test_missing_path() {
        let err = canonicalize(Path::new("/nonexistent/series2.so")).unwrap_err();
        assert!(matches!(err, Error::Failed { .. }));
        assert_eq!(err.code(), crate::error::codes::FAILED);
    }
}
