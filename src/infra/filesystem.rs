//! Filesystem operations
//!
//! Handles file and directory operations.

use std::path::{Path, PathBuf};

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory and all its contents
pub fn remove_dir_all(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Replace a directory with an empty one
pub fn reset_dir(path: &Path) -> Result<(), FilesystemError> {
    remove_dir_all(path)?;
    create_dir_all(path)
}

/// Write content to a file, creating parent directories
pub fn write_file(path: &Path, content: impl AsRef<[u8]>) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// List regular files below a directory, sorted by path
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, FilesystemError> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| FilesystemError::ReadFile {
            path: e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf),
            error: e.to_string(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_file_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("etc/config/network");

        write_file(&path, "config interface 'lan'\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "config interface 'lan'\n"
        );
    }

    #[test]
    fn test_reset_dir_empties_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("files");
        write_file(&dir.join("etc/motd"), "old").unwrap();

        reset_dir(&dir).unwrap();

        assert!(dir.is_dir());
        assert!(list_files(&dir).unwrap().is_empty());
    }

    #[test]
    fn test_remove_missing_dir_is_ok() {
        let temp = TempDir::new().unwrap();
        assert!(remove_dir_all(&temp.path().join("nope")).is_ok());
    }

    #[test]
    fn test_list_files_sorted_and_recursive() {
        let temp = TempDir::new().unwrap();
        write_file(&temp.path().join("b.bin"), "b").unwrap();
        write_file(&temp.path().join("a/x.bin"), "x").unwrap();
        create_dir_all(&temp.path().join("empty")).unwrap();

        let files = list_files(temp.path()).unwrap();

        assert_eq!(
            files,
            vec![temp.path().join("a/x.bin"), temp.path().join("b.bin")]
        );
    }
}
