//! Run reports: issues, apply results and rollback results.
//!
//! Every run returns one of these structures so the operator sees successes,
//! recoverable issues and warnings in one pass.

use super::plan::{OperationKind, ReconciliationPlan};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A recoverable, per-file or per-folder problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Issue {
    /// The classifier could not be reached; the folder was classified by the heuristic.
    ClassificationUnavailable { show_folder: String, reason: String },
    /// The classifier answered with something that does not follow the contract.
    ClassifierMalformed { show_folder: String, reason: String },
    /// A classifier guess was rejected for this file and the heuristic was used.
    FallbackUsed { source: PathBuf, reason: String },
    /// No episode number could be determined; the file is not linked.
    AmbiguousEpisode {
        source: PathBuf,
        show_folder: String,
        reason: String,
    },
    /// Two files resolved to the same destination; the loser is not linked.
    CollisionResolved {
        destination: PathBuf,
        kept: PathBuf,
        excluded: PathBuf,
        reason: String,
    },
    /// A managed destination is no longer a symbolic link; it was left untouched.
    UnexpectedDestinationState { destination: PathBuf, found: String },
    /// A file could not be read during the scan.
    Unreadable { source: PathBuf, reason: String },
    /// A file holds several episodes; only `linked` gets a destination.
    MultiEpisode {
        source: PathBuf,
        first: u16,
        last: u16,
        linked: u16,
    },
}

impl Issue {
    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Issue::ClassificationUnavailable { .. } => "classifier unavailable",
            Issue::ClassifierMalformed { .. } => "classifier malformed",
            Issue::FallbackUsed { .. } => "fallback",
            Issue::AmbiguousEpisode { .. } => "ambiguous",
            Issue::CollisionResolved { .. } => "collision",
            Issue::UnexpectedDestinationState { .. } => "unexpected destination",
            Issue::Unreadable { .. } => "unreadable",
            Issue::MultiEpisode { .. } => "multi-episode",
        }
    }

    /// Human-readable one-line description.
    pub fn describe(&self) -> String {
        match self {
            Issue::ClassificationUnavailable { show_folder, reason } => {
                format!("{}: classifier unavailable ({}), heuristic used", show_folder, reason)
            }
            Issue::ClassifierMalformed { show_folder, reason } => {
                format!("{}: malformed classifier response ({}), heuristic used", show_folder, reason)
            }
            Issue::FallbackUsed { source, reason } => {
                format!("{}: {}", source.display(), reason)
            }
            Issue::AmbiguousEpisode { source, reason, .. } => {
                format!("{}: {}", source.display(), reason)
            }
            Issue::CollisionResolved {
                destination,
                kept,
                excluded,
                reason,
            } => format!(
                "{} kept {} over {} ({})",
                destination.display(),
                kept.display(),
                excluded.display(),
                reason
            ),
            Issue::UnexpectedDestinationState { destination, found } => {
                format!("{}: expected a symbolic link, found {}", destination.display(), found)
            }
            Issue::Unreadable { source, reason } => format!("{}: {}", source.display(), reason),
            Issue::MultiEpisode {
                source,
                first,
                last,
                linked,
            } => format!(
                "{}: holds episodes {}-{}, linked as episode {} only",
                source.display(),
                first,
                last,
                linked
            ),
        }
    }
}

/// What applying one operation actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Replaced,
    Removed,
    Unchanged,
    /// An unchanged entry whose link had vanished was recreated.
    Repaired,
    /// The mapping entry was retired without touching the filesystem.
    EntryRetired,
}

/// A successfully applied operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedOperation {
    pub kind: OperationKind,
    pub outcome: Outcome,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Why an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The destination is occupied by something that is not a symbolic link.
    DestinationConflict,
    /// Filesystem or store error.
    Io,
}

/// A failed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationFailure {
    pub kind: OperationKind,
    pub failure: FailureKind,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub message: String,
}

/// Result of applying a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    pub succeeded: Vec<AppliedOperation>,
    pub failed: Vec<OperationFailure>,
    pub warnings: Vec<Issue>,
    /// Set when the run stopped early on request.
    pub cancelled: bool,
    /// Operations not attempted because of cancellation.
    pub not_attempted: usize,
}

impl ApplyResult {
    /// Whether every operation succeeded.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    /// Whether every operation was reported unchanged.
    pub fn all_unchanged(&self) -> bool {
        self.failed.is_empty()
            && self
                .succeeded
                .iter()
                .all(|op| op.outcome == Outcome::Unchanged)
    }

    /// Number of filesystem mutations performed.
    pub fn mutations(&self) -> usize {
        self.succeeded
            .iter()
            .filter(|op| {
                matches!(
                    op.outcome,
                    Outcome::Created | Outcome::Replaced | Outcome::Removed | Outcome::Repaired
                )
            })
            .count()
    }

    /// Count of operations with a given outcome.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.succeeded.iter().filter(|op| op.outcome == outcome).count()
    }
}

/// Which mapping entries a rollback covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackScope {
    All,
    /// Entries whose show title matches (case-insensitive).
    Show(String),
}

impl RollbackScope {
    /// Whether an entry title falls inside this scope.
    pub fn contains(&self, title: &str) -> bool {
        match self {
            RollbackScope::All => true,
            RollbackScope::Show(show) => show.trim().eq_ignore_ascii_case(title.trim()),
        }
    }
}

/// A mapping entry dropped without filesystem changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleEntry {
    pub destination: PathBuf,
    pub reason: String,
}

/// Result of a rollback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackResult {
    /// Links deleted.
    pub removed: Vec<PathBuf>,
    /// Entries dropped because the destination was gone or not a link.
    pub stale: Vec<StaleEntry>,
    /// Links that could not be removed.
    pub errors: Vec<String>,
    /// Empty directories pruned.
    pub pruned_dirs: Vec<PathBuf>,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl RollbackResult {
    /// Check if rollback was successful.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Everything a scan run produced, for the front end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Show folders that were processed.
    pub folders: Vec<String>,
    /// Number of source files found.
    pub files_scanned: usize,
    /// The plan, including its issues.
    pub plan: ReconciliationPlan,
    /// Set when the scan stopped early on request.
    pub cancelled: bool,
}
