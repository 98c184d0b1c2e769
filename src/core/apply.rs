//! Plan application.
//!
//! Executes a plan against the destination tree:
//! - removals first, each verified to be a symbolic link before deletion
//! - then creates and replaces, swapping links in atomically
//! - unchanged operations are checked and repaired when their link vanished
//!
//! The mapping store is locked against other processes for the whole run,
//! reloaded from disk, and saved after every operation that changes it, so an
//! interrupted run leaves a store that matches the filesystem.

use crate::core::cancel::CancelFlag;
use crate::core::store::{self, SharedStore, StoreLock};
use crate::models::mapping::MappingEntry;
use crate::models::plan::{LinkOperation, OperationKind, ReconciliationPlan};
use crate::models::report::{
    AppliedOperation, ApplyResult, FailureKind, Issue, OperationFailure, Outcome,
};
use crate::utils::fs::{path_state, prune_empty_dirs, replace_symlink, PathState};
use crate::Result;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Destinations claimed by applies running in this process.
#[derive(Debug, Clone, Default)]
pub struct ApplyRegistry(Arc<Mutex<HashSet<PathBuf>>>);

/// Destinations held by one running apply; released on drop.
#[derive(Debug)]
pub struct Claim {
    registry: ApplyRegistry,
    destinations: Vec<PathBuf>,
}

impl ApplyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a destination set, failing if any of it is already claimed.
    pub fn claim(&self, destinations: Vec<PathBuf>) -> Result<Claim> {
        let mut held = self
            .0
            .lock()
            .map_err(|_| crate::Error::other("apply registry lock poisoned"))?;

        let overlapping: Vec<&PathBuf> = destinations.iter().filter(|d| held.contains(*d)).collect();
        if let Some(first) = overlapping.first() {
            return Err(crate::Error::ApplyInProgress(format!(
                "{} overlapping destination(s), e.g. {}",
                overlapping.len(),
                first.display()
            )));
        }

        held.extend(destinations.iter().cloned());
        Ok(Claim {
            registry: self.clone(),
            destinations,
        })
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if let Ok(mut held) = self.registry.0.lock() {
            for destination in &self.destinations {
                held.remove(destination);
            }
        }
    }
}

/// Apply engine.
pub struct ApplyEngine {
    store: SharedStore,
    registry: ApplyRegistry,
    cancel: CancelFlag,
    show_progress: bool,
}

/// What a single operation did, or why it failed.
type OpResult = std::result::Result<(Outcome, Option<Issue>), (FailureKind, String)>;

impl ApplyEngine {
    /// Create an engine over a store, sharing an overlap registry.
    pub fn new(store: SharedStore, registry: ApplyRegistry, cancel: CancelFlag) -> Self {
        Self {
            store,
            registry,
            cancel,
            show_progress: false,
        }
    }

    /// Show an indicatif progress bar while applying.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Apply a plan.
    ///
    /// Per-operation failures are collected in the result and do not stop
    /// the run. Fails as a whole when the plan overlaps an apply already in
    /// progress in this process, or another process holds the store lock.
    pub fn apply(&self, plan: &ReconciliationPlan) -> Result<ApplyResult> {
        let _claim = self.registry.claim(plan.destinations())?;
        let store_path = store::lock(&self.store)?.path().to_path_buf();
        let _lock = StoreLock::try_acquire(&store_path)?;
        store::lock(&self.store)?.reload()?;

        let ordered: Vec<&LinkOperation> = plan
            .operations
            .iter()
            .filter(|op| op.kind == OperationKind::Remove)
            .chain(plan.operations.iter().filter(|op| op.kind != OperationKind::Remove))
            .collect();

        tracing::info!(
            "Applying {} operations ({} pending)",
            ordered.len(),
            plan.summary.pending()
        );

        let pb = if self.show_progress {
            let pb = ProgressBar::new(ordered.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut result = ApplyResult::default();
        for (idx, op) in ordered.iter().enumerate() {
            if self.cancel.is_cancelled() {
                result.cancelled = true;
                result.not_attempted = ordered.len() - idx;
                tracing::warn!("Apply cancelled, {} operations not attempted", result.not_attempted);
                break;
            }

            pb.set_message(format!(
                "{}: {}",
                op.kind,
                op.destination.file_name().unwrap_or_default().to_string_lossy()
            ));

            match self.apply_one(op, &plan.target_root) {
                Ok((outcome, warning)) => {
                    tracing::debug!("{:?}: {}", outcome, op.destination.display());
                    if let Some(warning) = warning {
                        tracing::warn!("{}", warning.describe());
                        result.warnings.push(warning);
                    }
                    result.succeeded.push(AppliedOperation {
                        kind: op.kind,
                        outcome,
                        source: op.source.clone(),
                        destination: op.destination.clone(),
                    });
                }
                Err((failure, message)) => {
                    tracing::error!("{} failed: {} - {}", op.kind, op.destination.display(), message);
                    result.failed.push(OperationFailure {
                        kind: op.kind,
                        failure,
                        source: op.source.clone(),
                        destination: op.destination.clone(),
                        message,
                    });
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        tracing::info!(
            "Apply finished: {} succeeded ({} mutations), {} failed, {} warnings",
            result.succeeded.len(),
            result.mutations(),
            result.failed.len(),
            result.warnings.len()
        );

        Ok(result)
    }

    fn apply_one(&self, op: &LinkOperation, target_root: &Path) -> OpResult {
        match op.kind {
            OperationKind::Remove => self.apply_remove(op, target_root),
            OperationKind::Create | OperationKind::Replace | OperationKind::Unchanged => {
                self.apply_link(op)
            }
        }
    }

    fn apply_remove(&self, op: &LinkOperation, target_root: &Path) -> OpResult {
        let state = path_state(&op.destination).map_err(io_failure)?;

        let (outcome, warning) = match state {
            PathState::Symlink(_) => {
                std::fs::remove_file(&op.destination).map_err(|e| io_failure(e.into()))?;
                if let Some(parent) = op.destination.parent() {
                    prune_empty_dirs(parent, target_root);
                }
                (Outcome::Removed, None)
            }
            PathState::Missing => (Outcome::EntryRetired, None),
            found @ (PathState::File | PathState::Directory) => (
                Outcome::EntryRetired,
                Some(Issue::UnexpectedDestinationState {
                    destination: op.destination.clone(),
                    found: found.describe().to_string(),
                }),
            ),
        };

        self.update_store(&op.destination, |store| store.remove(&op.destination).is_some())?;
        Ok((outcome, warning))
    }

    fn apply_link(&self, op: &LinkOperation) -> OpResult {
        let Some(guess) = &op.guess else {
            return Err((FailureKind::Io, "operation has no episode metadata".to_string()));
        };

        if !op.source.exists() {
            return Err((
                FailureKind::Io,
                format!("source no longer exists: {}", op.source.display()),
            ));
        }

        let state = path_state(&op.destination).map_err(io_failure)?;
        let already_linked = match &state {
            PathState::File | PathState::Directory => {
                return Err((
                    FailureKind::DestinationConflict,
                    format!("destination is {}", state.describe()),
                ));
            }
            PathState::Symlink(target) => *target == op.source,
            PathState::Missing => false,
        };

        if !already_linked {
            replace_symlink(&op.source, &op.destination).map_err(io_failure)?;
        }

        let outcome = match (op.kind, already_linked) {
            (OperationKind::Unchanged, true) => Outcome::Unchanged,
            (OperationKind::Unchanged, false) => Outcome::Repaired,
            (OperationKind::Replace, _) => Outcome::Replaced,
            _ => Outcome::Created,
        };

        self.update_store(&op.destination, |store| {
            let existing = store.get(&op.destination);
            let created_at = existing
                .filter(|e| e.source == op.source)
                .map(|e| e.created_at)
                .unwrap_or_else(Utc::now);
            let entry = MappingEntry {
                source: op.source.clone(),
                destination: op.destination.clone(),
                title: guess.title.clone(),
                year: guess.year,
                season: guess.season,
                episode: guess.episode,
                show_folder: op.show_folder.clone(),
                created_at,
            };
            if existing == Some(&entry) {
                return false;
            }
            store.upsert(entry);
            true
        })?;

        Ok((outcome, None))
    }

    /// Mutate and save the store under its lock.
    ///
    /// `change` reports whether it modified anything; untouched stores are not
    /// rewritten. When the save fails the entry at `destination` is restored,
    /// so memory never holds a change the file lacks.
    fn update_store<F>(&self, destination: &Path, change: F) -> std::result::Result<(), (FailureKind, String)>
    where
        F: FnOnce(&mut store::MappingStore) -> bool,
    {
        let mut guard = store::lock(&self.store).map_err(io_failure)?;
        let previous = guard.get(destination).cloned();
        if !change(&mut *guard) {
            return Ok(());
        }

        if let Err(e) = guard.save() {
            match previous {
                Some(entry) => guard.upsert(entry),
                None => {
                    guard.remove(destination);
                }
            }
            return Err(io_failure(e));
        }
        Ok(())
    }
}

fn io_failure(e: crate::Error) -> (FailureKind, String) {
    (FailureKind::Io, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_rejects_overlap() {
        let registry = ApplyRegistry::new();
        let a = PathBuf::from("/tv/A/Season 01/A S01E01.mkv");
        let b = PathBuf::from("/tv/A/Season 01/A S01E02.mkv");

        let claim = registry.claim(vec![a.clone()]).unwrap();
        let err = registry.claim(vec![a.clone(), b.clone()]).unwrap_err();
        assert!(matches!(err, crate::Error::ApplyInProgress(ref msg) if msg.starts_with("1 overlapping")));

        let disjoint = registry.claim(vec![b.clone()]);
        assert!(disjoint.is_ok());
        drop(disjoint);

        drop(claim);
        assert!(registry.claim(vec![a, b]).is_ok());
    }

    fn entry(destination: &Path) -> MappingEntry {
        MappingEntry {
            source: PathBuf::from("/src/A/a.mkv"),
            destination: destination.to_path_buf(),
            title: "A".to_string(),
            year: None,
            season: 1,
            episode: 1,
            show_folder: "A".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_failed_save_reverts_memory() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("mapping.json");
        let shared = store::MappingStore::load_shared(&path).unwrap();
        // a directory where the file should go makes every save fail
        std::fs::create_dir(&path).unwrap();

        let engine = ApplyEngine::new(shared.clone(), ApplyRegistry::new(), CancelFlag::new());
        let destination = PathBuf::from("/tv/A/Season 01/A S01E01.mkv");
        let err = engine
            .update_store(&destination, |store| {
                store.upsert(entry(&destination));
                true
            })
            .unwrap_err();

        assert_eq!(err.0, FailureKind::Io);
        assert!(store::lock(&shared).unwrap().get(&destination).is_none());
    }

    #[test]
    fn test_unchanged_store_is_not_rewritten() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("mapping.json");
        let shared = store::MappingStore::load_shared(&path).unwrap();
        let engine = ApplyEngine::new(shared, ApplyRegistry::new(), CancelFlag::new());

        let destination = PathBuf::from("/tv/A/Season 01/A S01E01.mkv");
        engine.update_store(&destination, |_| false).unwrap();
        assert!(!path.exists());
    }

    // Filesystem behavior is covered in tests/engine_tests.rs
}
