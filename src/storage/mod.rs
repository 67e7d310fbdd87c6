//! File storage used by the bootloader endpoints.
//!
//! # Responsibilities
//! - List, read, write and remove files by name
//! - Refuse names that could escape the storage root
//!
//! # Design Decisions
//! - Flat namespace: a name is a single path component
//! - `DirStore` lists every directory entry in the order the filesystem returns them
//! - `MemoryStore` keeps insertion order, for embedding and tests

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

/// Errors raised by a [`FileStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid file name '{0}'")]
    InvalidName(String),

    #[error("file '{0}' not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Io(#[from] io::Error),
}

/// Byte-addressable file storage.
pub trait FileStore: Send + Sync {
    fn list(&self) -> Result<Vec<String>, StoreError>;
    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError>;
    fn write(&self, name: &str, contents: &[u8]) -> Result<(), StoreError>;
    fn remove(&self, name: &str) -> Result<(), StoreError>;
}

/// Check that `name` is a plain file name.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);

    if invalid {
        Err(StoreError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Files stored in a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

fn not_found_as(name: &str) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |e| match e.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
        _ => StoreError::Io(e),
    }
}

impl FileStore for DirStore {
    fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_of(name)?;
        std::fs::read(path).map_err(not_found_as(name))
    }

    fn write(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> {
        let path = self.path_of(name)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        let path = self.path_of(name)?;
        std::fs::remove_file(path).map_err(not_found_as(name))
    }
}

/// Files kept in memory, listed in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<VecDeque<(String, Vec<u8>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `files`, in order.
    pub fn with_files<I, N, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<Vec<u8>>,
    {
        let files = files
            .into_iter()
            .map(|(name, contents)| (name.into(), contents.into()))
            .collect();
        Self {
            files: Mutex::new(files),
        }
    }

    fn files(&self) -> std::sync::MutexGuard<'_, VecDeque<(String, Vec<u8>)>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FileStore for MemoryStore {
    fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.files().iter().map(|(name, _)| name.clone()).collect())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        validate_name(name)?;
        self.files()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, contents)| contents.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn write(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> {
        validate_name(name)?;
        let mut files = self.files();
        match files.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = contents.to_vec(),
            None => files.push_back((name.to_string(), contents.to_vec())),
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        let mut files = self.files();
        let position = files
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        files.remove(position);
        Ok(())
    }
}
