//! Persistence for received binary payloads.
//!
//! ```text
//! Connection ──binary event──► Persistence::write(file_name, bytes)
//!                                   │
//!                   ┌───────────────┴───────────────┐
//!                   ▼                               ▼
//!            BinaryFileStore                   MemoryStore
//!            (one file per name)               (HashMap, tests/demo)
//! ```
//!
//! Names come off the wire, so stores reject anything that could escape the
//! store root.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

/// Read/write binary payloads by name.
pub trait Persistence: Send + Sync {
    fn write(&self, name: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Returns the stored name alongside its bytes.
    fn read(&self, name: &str) -> Result<(String, Vec<u8>), StoreError>;
}

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store root does not exist or is not a directory
    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),
    /// Name is empty or contains a path component
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
    /// Nothing stored under this name
    #[error("File not found: {0}")]
    NotFound(String),
    /// Underlying filesystem error
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::IoError(e.to_string())
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        Err(StoreError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Filesystem store: one file per payload under a root directory.
#[derive(Debug, Clone)]
pub struct BinaryFileStore {
    root: PathBuf,
}

impl BinaryFileStore {
    /// Open a store rooted at an existing directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::DirectoryNotFound(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

impl Persistence for BinaryFileStore {
    fn write(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        // The root may have been removed since open()
        fs::create_dir_all(&self.root)?;
        fs::write(&path, data)?;
        log::debug!("Stored {} bytes as {}", data.len(), path.display());
        Ok(())
    }

    fn read(&self, name: &str) -> Result<(String, Vec<u8>), StoreError> {
        let path = self.path_for(name)?;
        match fs::read(&path) {
            Ok(data) => Ok((name.to_string(), data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }

    /// Stored names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Persistence for MemoryStore {
    fn write(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        validate_name(name)?;
        self.files.lock().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn read(&self, name: &str) -> Result<(String, Vec<u8>), StoreError> {
        self.files
            .lock()
            .get(name)
            .map(|data| (name.to_string(), data.clone()))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BinaryFileStore::open(dir.path()).unwrap();

        store.write("a1b2.png", &[1, 2, 3]).unwrap();
        let (name, data) = store.read("a1b2.png").unwrap();
        assert_eq!(name, "a1b2.png");
        assert_eq!(data, vec![1, 2, 3]);
        assert!(dir.path().join("a1b2.png").is_file());
    }

    #[test]
    fn test_file_store_requires_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            BinaryFileStore::open(&missing),
            Err(StoreError::DirectoryNotFound(p)) if p == missing
        ));
    }

    #[test]
    fn test_file_store_recreates_removed_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        fs::create_dir(&root).unwrap();
        let store = BinaryFileStore::open(&root).unwrap();

        fs::remove_dir(&root).unwrap();
        store.write("x.bin", b"data").unwrap();
        assert_eq!(store.read("x.bin").unwrap().1, b"data");
    }

    #[test]
    fn test_file_store_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = BinaryFileStore::open(dir.path()).unwrap();
        assert!(matches!(store.read("missing.bin"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_rejects_path_names() {
        let store = MemoryStore::new();
        for name in ["", ".", "..", "../etc/passwd", "a/b", "a\\b"] {
            assert!(
                matches!(store.write(name, b"x"), Err(StoreError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.write("b.txt", b"2").unwrap();
        store.write("a.txt", b"1").unwrap();
        store.write("a.txt", b"3").unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.names(), vec!["a.txt", "b.txt"]);
        assert_eq!(store.read("a.txt").unwrap().1, b"3");
        assert!(matches!(store.read("c.txt"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_store_error_display() {
        assert_eq!(
            StoreError::NotFound("x.png".into()).to_string(),
            "File not found: x.png"
        );
        assert_eq!(
            StoreError::DirectoryNotFound(PathBuf::from("/srv/uploads")).to_string(),
            "Directory not found: /srv/uploads"
        );
        assert_eq!(
            StoreError::InvalidName("../etc".into()).to_string(),
            "Invalid file name: \"../etc\""
        );

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io.into();
        assert_eq!(err.to_string(), "I/O error: denied");
        let _: &dyn std::error::Error = &err;
    }
}
