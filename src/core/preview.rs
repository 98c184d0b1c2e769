//! Plan preview.
//!
//! Splits a plan into additions, replacements, removals and no-ops, checks
//! each destination with `lstat` to flag drift, and renders the resulting
//! layout as a tree. Never mutates the filesystem and never touches the
//! network, so it can be called any number of times.

use crate::models::plan::{LinkOperation, OperationKind, PlanSummary, ReconciliationPlan};
use crate::models::report::Issue;
use crate::utils::fs::{path_state, PathState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Kind of drift between the plan and the destination tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// A non-link occupies the destination; apply will fail this operation.
    WillConflict,
    /// A recorded link vanished or points elsewhere; apply will recreate it.
    WillRepair,
    /// A removal target is not a link; apply will leave it and retire the entry.
    RemovalSkipped,
    /// An unrecorded link occupies a create destination; apply will re-point it.
    WillOverwriteLink,
}

/// One drift warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftWarning {
    pub kind: DriftKind,
    pub destination: PathBuf,
    pub detail: String,
}

/// Human-reviewable diff of a plan against the destination tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preview {
    pub additions: Vec<LinkOperation>,
    pub replacements: Vec<LinkOperation>,
    pub removals: Vec<LinkOperation>,
    pub unchanged: Vec<LinkOperation>,
    pub drift: Vec<DriftWarning>,
    pub issues: Vec<Issue>,
    pub summary: PlanSummary,
    /// Target root the tree is rendered relative to.
    pub target_root: PathBuf,
}

impl Preview {
    /// Whether applying would change nothing.
    pub fn is_noop(&self) -> bool {
        self.additions.is_empty()
            && self.replacements.is_empty()
            && self.removals.is_empty()
            && !self.drift.iter().any(|d| d.kind == DriftKind::WillRepair)
    }

    /// Render the resulting layout as a tree, one block per show.
    ///
    /// Lines carry a marker: `+` create, `~` replace, `-` remove, blank for
    /// unchanged.
    pub fn render_tree(&self) -> String {
        // show -> season -> [(file name, marker, source)]
        let mut shows: BTreeMap<String, BTreeMap<String, Vec<(String, char, String)>>> =
            BTreeMap::new();

        let groups = [
            (&self.additions, '+'),
            (&self.replacements, '~'),
            (&self.removals, '-'),
            (&self.unchanged, ' '),
        ];
        for (ops, marker) in groups {
            for op in ops {
                let (show, season, file) = split_destination(&op.destination, &self.target_root);
                let source = op
                    .source
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                shows
                    .entry(show)
                    .or_default()
                    .entry(season)
                    .or_default()
                    .push((file, marker, source));
            }
        }

        let mut lines = Vec::new();
        for (show, seasons) in shows {
            lines.push(show);
            let season_count = seasons.len();
            for (i, (season, mut files)) in seasons.into_iter().enumerate() {
                let last_season = i + 1 == season_count;
                lines.push(format!("{}{}", if last_season { "└── " } else { "├── " }, season));
                files.sort();
                let file_count = files.len();
                for (j, (file, marker, source)) in files.into_iter().enumerate() {
                    let last_file = j + 1 == file_count;
                    let branch = match (last_season, last_file) {
                        (true, true) => "    └── ",
                        (true, false) => "    ├── ",
                        (false, true) => "│   └── ",
                        (false, false) => "│   ├── ",
                    };
                    lines.push(format!("{}{} {}  <- {}", branch, marker, file, source));
                }
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}

/// Split a destination into (show dir, season dir, file name) below the root.
fn split_destination(destination: &Path, root: &Path) -> (String, String, String) {
    let relative = destination.strip_prefix(root).unwrap_or(destination);
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    match parts.as_slice() {
        [show, season, rest @ ..] if !rest.is_empty() => (show.clone(), season.clone(), rest.join("/")),
        [show, file] => (show.clone(), String::new(), file.clone()),
        _ => (String::new(), String::new(), relative.display().to_string()),
    }
}

/// Probe one operation's destination for drift.
fn check_drift(op: &LinkOperation) -> Option<DriftWarning> {
    let state = match path_state(&op.destination) {
        Ok(state) => state,
        Err(e) => {
            tracing::debug!("Cannot inspect {}: {}", op.destination.display(), e);
            return None;
        }
    };

    let warning = |kind: DriftKind, detail: String| {
        Some(DriftWarning {
            kind,
            destination: op.destination.clone(),
            detail,
        })
    };

    match (op.kind, state) {
        (OperationKind::Create | OperationKind::Replace, PathState::File | PathState::Directory) => {
            warning(DriftKind::WillConflict, "destination is occupied by a non-link".to_string())
        }
        (OperationKind::Create, PathState::Symlink(target)) if target != op.source => warning(
            DriftKind::WillOverwriteLink,
            format!("unrecorded link to {}", target.display()),
        ),
        (OperationKind::Unchanged, PathState::Missing) => {
            warning(DriftKind::WillRepair, "link is missing".to_string())
        }
        (OperationKind::Unchanged, PathState::Symlink(target)) if target != op.source => warning(
            DriftKind::WillRepair,
            format!("link points at {}", target.display()),
        ),
        (OperationKind::Unchanged, state @ (PathState::File | PathState::Directory)) => warning(
            DriftKind::WillConflict,
            format!("link was replaced by {}", state.describe()),
        ),
        (OperationKind::Remove, state @ (PathState::File | PathState::Directory)) => warning(
            DriftKind::RemovalSkipped,
            format!("found {}, will not delete", state.describe()),
        ),
        _ => None,
    }
}

/// Build a preview of a plan.
pub fn preview(plan: &ReconciliationPlan) -> Preview {
    let mut preview = Preview {
        issues: plan.issues.clone(),
        summary: plan.summary.clone(),
        target_root: plan.target_root.clone(),
        ..Default::default()
    };

    for op in &plan.operations {
        if let Some(warning) = check_drift(op) {
            preview.drift.push(warning);
        }
        match op.kind {
            OperationKind::Create => preview.additions.push(op.clone()),
            OperationKind::Replace => preview.replacements.push(op.clone()),
            OperationKind::Remove => preview.removals.push(op.clone()),
            OperationKind::Unchanged => preview.unchanged.push(op.clone()),
        }
    }

    preview
}
