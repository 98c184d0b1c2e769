//! CLI command implementations.

pub mod apply;
pub mod preview;
pub mod rollback;
pub mod status;

use crate::cli::args::ScanArgs;
use crate::core::cancel::CancelFlag;
use crate::core::preview::{DriftKind, Preview};
use crate::models::config::Config;
use crate::models::report::Issue;
use colored::Colorize;

/// Apply command-line overrides to a loaded configuration.
pub fn apply_overrides(mut config: Config, scan: &ScanArgs) -> crate::Result<Config> {
    if let Some(source) = &scan.source {
        config.source_root = source.clone();
    }
    if let Some(target) = &scan.target {
        config.target_root = target.clone();
    }
    if scan.offline {
        config.classifier.enabled = false;
    }
    config.absolutize()?;
    config.validate()?;
    Ok(config)
}

/// Folder filter from `--folder` flags.
pub fn folder_filter(scan: &ScanArgs) -> Option<&[String]> {
    if scan.folders.is_empty() {
        None
    } else {
        Some(scan.folders.as_slice())
    }
}

/// Cancel on Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "[CANCEL] Stopping after the current step...".yellow());
            flag.cancel();
        }
    });
    cancel
}

/// Print per-file issues grouped by label.
pub fn print_issues(issues: &[Issue]) {
    if issues.is_empty() {
        return;
    }
    println!("{}", "[Issues]".bold().yellow());
    for issue in issues {
        let label = format!("[{}]", issue.label());
        let label = match issue {
            Issue::AmbiguousEpisode { .. } | Issue::Unreadable { .. } => label.red(),
            Issue::CollisionResolved { .. } | Issue::MultiEpisode { .. } => label.yellow(),
            _ => label.dimmed(),
        };
        println!("  {} {}", label, issue.describe());
    }
    println!();
}

/// Print a preview: tree, drift warnings, issues and summary.
pub fn print_preview(preview: &Preview) {
    let tree = preview.render_tree();
    if tree.is_empty() {
        println!("{}", "[INFO] No episodes to link.".dimmed());
    } else {
        println!("{}", "[Preview]".bold().cyan());
        println!("{}", tree);
    }

    if !preview.drift.is_empty() {
        println!("{}", "[Drift]".bold().yellow());
        for drift in &preview.drift {
            let tag = match drift.kind {
                DriftKind::WillConflict => "[CONFLICT]".red(),
                DriftKind::WillRepair => "[REPAIR]".cyan(),
                DriftKind::RemovalSkipped => "[SKIP]".yellow(),
                DriftKind::WillOverwriteLink => "[RELINK]".yellow(),
            };
            println!("  {} {} ({})", tag, drift.destination.display(), drift.detail);
        }
        println!();
    }

    print_issues(&preview.issues);

    let s = &preview.summary;
    println!("{}", "[Summary]".bold().green());
    println!("  {} {}", "Create:".bold(), s.create);
    println!("  {} {}", "Replace:".bold(), s.replace);
    println!("  {} {}", "Remove:".bold(), s.remove);
    println!("  {} {}", "Unchanged:".bold(), s.unchanged);
    println!("  {} {}", "Ambiguous:".bold(), s.ambiguous);
    println!("  {} {}", "Collisions:".bold(), s.collisions);
    println!();
}
