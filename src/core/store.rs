//! Mapping store.
//!
//! Durable record of every link this tool created, keyed by destination path.
//! It is the only thing apply and rollback trust when deciding what they may
//! delete. Writers hold a [`StoreLock`] so separate processes never overwrite
//! each other's entries.

use crate::models::mapping::{MappingEntry, MappingFile, MAPPING_VERSION};
use crate::utils::fs::atomic_write;
use crate::Result;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Mapping store backed by a JSON file.
#[derive(Debug)]
pub struct MappingStore {
    path: PathBuf,
    file: MappingFile,
}

/// Store handle shared between the engines of one process.
pub type SharedStore = Arc<Mutex<MappingStore>>;

impl MappingStore {
    /// Load the store. An absent file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let corrupt = |reason: String| crate::Error::MappingStoreCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let file = match std::fs::read_to_string(path) {
            Ok(content) => {
                let file: MappingFile =
                    serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
                if file.version != MAPPING_VERSION {
                    return Err(corrupt(format!("unsupported version {}", file.version)));
                }
                if let Some((key, entry)) = file.entries.iter().find(|(k, e)| **k != e.destination) {
                    return Err(corrupt(format!(
                        "entry key {} does not match destination {}",
                        key.display(),
                        entry.destination.display()
                    )));
                }
                file
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No mapping store at {}, starting empty", path.display());
                MappingFile::default()
            }
            Err(e) => return Err(corrupt(e.to_string())),
        };

        tracing::debug!("Loaded {} mapping entries from {}", file.entries.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Load the store and wrap it for sharing.
    pub fn load_shared(path: &Path) -> Result<SharedStore> {
        Ok(Arc::new(Mutex::new(Self::load(path)?)))
    }

    /// Re-read the file, dropping in-memory state.
    pub fn reload(&mut self) -> Result<()> {
        let fresh = Self::load(&self.path)?;
        *self = fresh;
        Ok(())
    }

    /// Persist the store via write-temp-then-rename.
    ///
    /// On failure the in-memory timestamp is left as it was.
    pub fn save(&mut self) -> Result<()> {
        let previous = self.file.updated_at;
        self.file.updated_at = chrono::Utc::now();
        let written = serde_json::to_string_pretty(&self.file)
            .map_err(crate::Error::from)
            .and_then(|json| atomic_write(&self.path, json.as_bytes()));
        if written.is_err() {
            self.file.updated_at = previous;
        }
        written
    }

    /// Store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry at a destination.
    pub fn get(&self, destination: &Path) -> Option<&MappingEntry> {
        self.file.entries.get(destination)
    }

    /// Insert or overwrite the entry for its destination.
    pub fn upsert(&mut self, entry: MappingEntry) {
        self.file.entries.insert(entry.destination.clone(), entry);
    }

    /// Remove the entry at a destination.
    pub fn remove(&mut self, destination: &Path) -> Option<MappingEntry> {
        self.file.entries.remove(destination)
    }

    /// All entries, ordered by destination.
    pub fn entries(&self) -> impl Iterator<Item = &MappingEntry> {
        self.file.entries.values()
    }

    /// Snapshot of the underlying file.
    pub fn snapshot(&self) -> &MappingFile {
        &self.file
    }

    pub fn len(&self) -> usize {
        self.file.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.entries.is_empty()
    }

    /// Title and year already used for a show folder, if any.
    pub fn title_for_folder(&self, show_folder: &str) -> Option<(String, Option<u16>)> {
        self.entries()
            .find(|e| !e.show_folder.is_empty() && e.show_folder == show_folder)
            .map(|e| (e.title.clone(), e.year))
    }
}

/// Exclusive lock on a mapping store file, held across processes.
///
/// Released when dropped (the OS drops the lock when the file closes).
#[derive(Debug)]
pub struct StoreLock {
    _file: File,
    path: PathBuf,
}

/// Lock file path for a store: `mapping.json` -> `mapping.json.lock`.
pub fn lock_path_for(store_path: &Path) -> PathBuf {
    let mut path = store_path.to_path_buf();
    match store_path.extension() {
        Some(ext) => path.set_extension(format!("{}.lock", ext.to_string_lossy())),
        None => path.set_extension("lock"),
    };
    path
}

impl StoreLock {
    /// Take the lock without waiting. Fails with `ApplyInProgress` when
    /// another process (or another handle in this one) holds it.
    pub fn try_acquire(store_path: &Path) -> Result<Self> {
        let path = lock_path_for(store_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                tracing::debug!("Acquired store lock: {}", path.display());
                Ok(Self { _file: file, path })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(crate::Error::ApplyInProgress(format!(
                    "mapping store {} is locked by another process",
                    store_path.display()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        tracing::debug!("Releasing store lock: {}", self.path.display());
    }
}

/// Lock a shared store, turning poisoning into an error.
pub fn lock(store: &SharedStore) -> Result<MutexGuard<'_, MappingStore>> {
    store
        .lock()
        .map_err(|_| crate::Error::other("mapping store lock poisoned"))
}
