//! Durable record of listings that have already been acted upon.
//!
//! The in-memory set is the source of truth during a run; [`SeenStore::flush`]
//! rewrites the whole snapshot through a [`SnapshotBackend`].

use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid snapshot: {0}")]
    Corrupt(String),
}

/// Where snapshots live. `read` returns `Ok(None)` when no snapshot exists yet.
pub trait SnapshotBackend {
    fn read(&self) -> Result<Option<BTreeSet<String>>, StoreError>;
    fn write(&self, snapshot: &BTreeSet<String>) -> Result<(), StoreError>;
}

/// JSON array of identifiers on disk.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Self {
        let path = std::env::var("SEEN_LISTINGS_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "seen_listings.json".to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotBackend for JsonFileBackend {
    fn read(&self) -> Result<Option<BTreeSet<String>>, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|err| StoreError::Corrupt(err.to_string()))
    }

    fn write(&self, snapshot: &BTreeSet<String>) -> Result<(), StoreError> {
        let payload =
            serde_json::to_vec(snapshot).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        write_atomic(&self.path, &payload).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Writes to a sibling `.tmp` file and renames it over `path`, so readers only
/// ever observe a complete file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = File::create(&tmp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)
}

pub struct SeenStore<B> {
    backend: B,
    seen: BTreeSet<String>,
}

impl<B: SnapshotBackend> SeenStore<B> {
    /// Loads the previous snapshot. A missing or unreadable snapshot starts empty.
    pub fn load(backend: B) -> Self {
        let seen = match backend.read() {
            Ok(Some(seen)) => {
                info!(
                    target = "lowball.store",
                    count = seen.len(),
                    "loaded seen listings"
                );
                seen
            }
            Ok(None) => {
                info!(
                    target = "lowball.store",
                    "no previous seen listings found, starting fresh"
                );
                BTreeSet::new()
            }
            Err(err) => {
                warn!(
                    target = "lowball.store",
                    error = %err,
                    "seen listings snapshot unreadable, starting fresh"
                );
                BTreeSet::new()
            }
        };
        Self { backend, seen }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Returns `true` when the id was not already present.
    pub fn mark_seen(&mut self, id: impl Into<String>) -> bool {
        self.seen.insert(id.into())
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.backend.write(&self.seen)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[cfg(test)]
    pub fn ids(&self) -> &BTreeSet<String> {
        &self.seen
    }
}

#[cfg(test)]
pub use memory::MemoryBackend;

#[cfg(test)]
mod memory {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Shared in-memory snapshot; clones see the same data, like reopening a file.
    #[derive(Debug, Clone, Default)]
    pub struct MemoryBackend {
        snapshot: Arc<Mutex<Option<BTreeSet<String>>>>,
        writes: Arc<Mutex<usize>>,
    }

    impl MemoryBackend {
        pub fn writes(&self) -> usize {
            *self.writes.lock().unwrap()
        }
    }

    impl SnapshotBackend for MemoryBackend {
        fn read(&self) -> Result<Option<BTreeSet<String>>, StoreError> {
            Ok(self.snapshot.lock().unwrap().clone())
        }

        fn write(&self, snapshot: &BTreeSet<String>) -> Result<(), StoreError> {
            *self.snapshot.lock().unwrap() = Some(snapshot.clone());
            *self.writes.lock().unwrap() += 1;
            Ok(())
        }
    }
}
