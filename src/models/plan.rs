//! Plan data model.

use super::mapping::MappingEntry;
use super::media::{EpisodeGuess, SourceFile};
use super::report::Issue;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A classified file ready for planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Source file snapshot.
    pub file: SourceFile,
    /// Episode metadata for the file.
    pub guess: EpisodeGuess,
    /// Destination suffix, usually the extension (`.mkv`, `.en.srt`).
    pub suffix: String,
}

/// Operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Replace,
    Remove,
    Unchanged,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Replace => write!(f, "replace"),
            OperationKind::Remove => write!(f, "remove"),
            OperationKind::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// One planned link operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkOperation {
    /// Operation kind.
    pub kind: OperationKind,
    /// Source path the link points at (for removals: the recorded source).
    pub source: PathBuf,
    /// Link path in the target tree.
    pub destination: PathBuf,
    /// Show folder the source was discovered under.
    pub show_folder: String,
    /// Episode metadata (absent for removals).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guess: Option<EpisodeGuess>,
    /// Previously linked source (replace only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_source: Option<PathBuf>,
    /// Mapping entry this operation retires (remove only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retired: Option<MappingEntry>,
}

impl LinkOperation {
    /// Show title used for grouping.
    pub fn title(&self) -> &str {
        match (&self.guess, &self.retired) {
            (Some(guess), _) => &guess.title,
            (None, Some(entry)) => &entry.title,
            (None, None) => "",
        }
    }

    /// (season, episode) used for ordering.
    pub fn episode_key(&self) -> (u16, u16) {
        match (&self.guess, &self.retired) {
            (Some(guess), _) => (guess.season, guess.episode),
            (None, Some(entry)) => (entry.season, entry.episode),
            (None, None) => (0, 0),
        }
    }

    /// Whether applying this operation touches the filesystem.
    pub fn is_mutation(&self) -> bool {
        self.kind != OperationKind::Unchanged
    }
}

/// Summary counts for a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub create: usize,
    pub replace: usize,
    pub remove: usize,
    pub unchanged: usize,
    pub ambiguous: usize,
    pub collisions: usize,
}

impl PlanSummary {
    /// Number of operations that would touch the filesystem.
    pub fn pending(&self) -> usize {
        self.create + self.replace + self.remove
    }
}

/// Result of planning one scan run. Never persisted as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    /// Creation timestamp.
    pub created_at: String,
    /// Target root all destinations live under.
    pub target_root: PathBuf,
    /// Source folders covered by this run; removals are limited to them.
    pub scope: Vec<PathBuf>,
    /// Operations, grouped by show then season then episode.
    pub operations: Vec<LinkOperation>,
    /// Summary counts.
    pub summary: PlanSummary,
    /// Per-file issues found while scanning, classifying and planning.
    pub issues: Vec<Issue>,
}

impl ReconciliationPlan {
    /// Operations that would mutate the filesystem.
    pub fn pending(&self) -> impl Iterator<Item = &LinkOperation> {
        self.operations.iter().filter(|op| op.is_mutation())
    }

    /// Every destination path the plan touches or retains.
    pub fn destinations(&self) -> Vec<PathBuf> {
        self.operations.iter().map(|op| op.destination.clone()).collect()
    }

    /// Whether nothing would change on apply.
    pub fn is_noop(&self) -> bool {
        self.summary.pending() == 0
    }

    /// Recompute summary counts from operations and issues.
    pub fn recount(&mut self) {
        let mut summary = PlanSummary::default();
        for op in &self.operations {
            match op.kind {
                OperationKind::Create => summary.create += 1,
                OperationKind::Replace => summary.replace += 1,
                OperationKind::Remove => summary.remove += 1,
                OperationKind::Unchanged => summary.unchanged += 1,
            }
        }
        for issue in &self.issues {
            match issue {
                Issue::AmbiguousEpisode { .. } => summary.ambiguous += 1,
                Issue::CollisionResolved { .. } => summary.collisions += 1,
                _ => {}
            }
        }
        self.summary = summary;
    }
}
