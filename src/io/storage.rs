use crate::types::{FieldError, FieldResult};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Durable object storage for index artifacts
pub trait ObjectStore {
    /// Store `bytes` under `key`, replacing any existing object
    fn put(&self, key: &str, bytes: &[u8]) -> FieldResult<()>;
}

/// Object store backed by a directory tree
///
/// Objects are written to a temporary file next to their destination and
/// renamed into place, so readers never observe a partial object.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` below the root, rejecting absolute and parent components
    pub fn object_path(&self, key: &str) -> FieldResult<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(FieldError::Storage(format!("Invalid object key: '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, key: &str, bytes: &[u8]) -> FieldResult<()> {
        let destination = self.object_path(key)?;
        let parent = destination
            .parent()
            .ok_or_else(|| FieldError::Storage(format!("Object key has no parent: '{}'", key)))?;
        std::fs::create_dir_all(parent)?;

        let mut staging = tempfile::NamedTempFile::new_in(parent)?;
        staging.write_all(bytes)?;
        staging.flush()?;
        staging
            .persist(&destination)
            .map_err(|e| FieldError::Storage(format!("Failed to store '{}': {}", key, e)))?;

        log::info!("Stored {} bytes at {}", bytes.len(), destination.display());
        Ok(())
    }
}
