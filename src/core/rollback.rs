//! Rollback execution.
//!
//! Removes links recorded in the mapping store:
//! - a destination that is still a symbolic link is deleted
//! - a destination that is gone or was replaced by something else is left
//!   alone and its entry is dropped as stale
//! - directories left empty are pruned, never the target root
//!
//! Source files are never touched.

use crate::core::store::{self, SharedStore, StoreLock};
use crate::models::mapping::MappingEntry;
use crate::models::report::{RollbackResult, RollbackScope, StaleEntry};
use crate::utils::fs::{path_state, prune_empty_dirs, PathState};
use crate::Result;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Rollback engine.
pub struct RollbackEngine {
    store: SharedStore,
    target_root: PathBuf,
}

impl RollbackEngine {
    /// Create a rollback engine over a store.
    pub fn new(store: SharedStore, target_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            target_root: target_root.into(),
        }
    }

    /// Entries covered by a scope, matched on show title or source folder name.
    pub fn entries_in_scope(&self, scope: &RollbackScope) -> Result<Vec<MappingEntry>> {
        let guard = store::lock(&self.store)?;
        Ok(guard
            .entries()
            .filter(|e| scope.contains(&e.title) || scope.contains(&e.show_folder))
            .cloned()
            .collect())
    }

    /// Roll back every entry in scope. With `dry_run`, only report.
    ///
    /// A real rollback holds the store lock and works from a fresh read of
    /// the store file.
    pub fn rollback(&self, scope: &RollbackScope, dry_run: bool) -> Result<RollbackResult> {
        let _lock = if dry_run {
            None
        } else {
            let store_path = store::lock(&self.store)?.path().to_path_buf();
            Some(StoreLock::try_acquire(&store_path)?)
        };
        store::lock(&self.store)?.reload()?;

        let entries = self.entries_in_scope(scope)?;
        let mut result = RollbackResult {
            dry_run,
            ..Default::default()
        };

        tracing::info!(
            "Rolling back {} entries{}",
            entries.len(),
            if dry_run { " (dry run)" } else { "" }
        );

        let mut touched_dirs: BTreeSet<PathBuf> = BTreeSet::new();

        for entry in entries {
            let destination = &entry.destination;
            let state = match path_state(destination) {
                Ok(state) => state,
                Err(e) => {
                    result.errors.push(format!("{}: {}", destination.display(), e));
                    continue;
                }
            };

            match state {
                PathState::Symlink(_) => {
                    if !dry_run {
                        if let Err(e) = std::fs::remove_file(destination) {
                            tracing::error!("Failed to remove {}: {}", destination.display(), e);
                            result.errors.push(format!("{}: {}", destination.display(), e));
                            continue;
                        }
                        if let Some(parent) = destination.parent() {
                            touched_dirs.insert(parent.to_path_buf());
                        }
                    }
                    tracing::debug!("Removed link {}", destination.display());
                    result.removed.push(destination.clone());
                }
                PathState::Missing => {
                    result.stale.push(StaleEntry {
                        destination: destination.clone(),
                        reason: "link is already gone".to_string(),
                    });
                }
                found @ (PathState::File | PathState::Directory) => {
                    tracing::warn!(
                        "{} is now {}, leaving it in place",
                        destination.display(),
                        found.describe()
                    );
                    result.stale.push(StaleEntry {
                        destination: destination.clone(),
                        reason: format!("replaced by {}, left untouched", found.describe()),
                    });
                }
            }

            if !dry_run {
                let mut guard = store::lock(&self.store)?;
                guard.remove(destination);
                guard.save()?;
            }
        }

        // Deepest first so parents empty out before they are checked.
        for dir in touched_dirs.iter().rev() {
            result
                .pruned_dirs
                .extend(prune_empty_dirs(dir, &self.target_root));
        }

        tracing::info!(
            "Rollback: {} removed, {} stale, {} errors, {} directories pruned",
            result.removed.len(),
            result.stale.len(),
            result.errors.len(),
            result.pruned_dirs.len()
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MappingStore;
    use tempfile::TempDir;

    fn entry(root: &std::path::Path, title: &str, folder: &str) -> MappingEntry {
        MappingEntry {
            source: root.join("src").join(folder).join("e1.mkv"),
            destination: root.join("tv").join(title).join("Season 01").join(format!("{} S01E01.mkv", title)),
            title: title.to_string(),
            year: None,
            season: 1,
            episode: 1,
            show_folder: folder.to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_entries_in_scope() {
        let temp = TempDir::new().unwrap();
        let store = MappingStore::load_shared(&temp.path().join("m.json")).unwrap();
        {
            let mut guard = store.lock().unwrap();
            guard.upsert(entry(temp.path(), "Alpha", "alpha_raw"));
            guard.upsert(entry(temp.path(), "Beta", "beta_raw"));
        }
        let engine = RollbackEngine::new(store, temp.path().join("tv"));

        assert_eq!(engine.entries_in_scope(&RollbackScope::All).unwrap().len(), 2);
        let by_title = engine
            .entries_in_scope(&RollbackScope::Show("alpha".to_string()))
            .unwrap();
        assert_eq!(by_title.len(), 1);
        let by_folder = engine
            .entries_in_scope(&RollbackScope::Show("beta_raw".to_string()))
            .unwrap();
        assert_eq!(by_folder[0].title, "Beta");
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let temp = TempDir::new().unwrap();
        let store_path = temp.path().join("m.json");
        let store = MappingStore::load_shared(&store_path).unwrap();
        {
            let mut guard = store.lock().unwrap();
            guard.upsert(entry(temp.path(), "Alpha", "alpha"));
            guard.save().unwrap();
        }
        let before = std::fs::read(&store_path).unwrap();

        let engine = RollbackEngine::new(store.clone(), temp.path().join("tv"));
        let result = engine.rollback(&RollbackScope::All, true).unwrap();

        assert!(result.dry_run);
        assert_eq!(result.stale.len(), 1);
        assert_eq!(store.lock().unwrap().len(), 1);
        assert_eq!(std::fs::read(&store_path).unwrap(), before);
        assert!(!store::lock_path_for(&store_path).exists());
    }
}
