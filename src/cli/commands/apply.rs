//! Apply command implementation.
//!
//! Scans and plans like preview, asks for confirmation, then creates,
//! replaces and removes links and records them in the mapping store.

use super::{cancel_on_ctrl_c, folder_filter, print_issues, print_preview};
use crate::cli::args::ScanArgs;
use crate::core::apply::{ApplyEngine, ApplyRegistry};
use crate::core::preview::preview as build_preview;
use crate::core::reconciler::Reconciler;
use crate::core::store::MappingStore;
use crate::models::config::Config;
use crate::models::report::{ApplyResult, FailureKind, Outcome};
use crate::services::classifier::ClassifierClient;
use crate::Result;
use colored::Colorize;
use std::io::{BufRead, Write};

/// Run the apply command.
pub async fn apply(config: &Config, scan: &ScanArgs, yes: bool) -> Result<()> {
    println!("{}", "[APPLY] Scanning source tree...".bold().cyan());
    println!("  {} {}", "Source:".bold(), config.source_root.display());
    println!("  {} {}", "Target:".bold(), config.target_root.display());
    println!();

    let cancel = cancel_on_ctrl_c();
    let store = MappingStore::load_shared(&config.mapping_path())?;
    let client = ClassifierClient::new(config.classifier.clone())?;
    let reconciler = Reconciler::new(config, client, cancel.clone())?;

    let report = reconciler.scan(folder_filter(scan), &store).await?;
    if report.cancelled {
        println!("{}", "[CANCEL] Scan was cancelled; nothing applied.".yellow());
        return Ok(());
    }

    let preview = build_preview(&report.plan);
    print_preview(&preview);

    if preview.is_noop() {
        println!("{}", "[OK] Target tree is up to date.".green());
        return Ok(());
    }

    if !yes && !confirm("Apply these changes?")? {
        println!("{}", "[INFO] Aborted, no changes made.".dimmed());
        return Ok(());
    }

    std::fs::create_dir_all(&config.target_root)?;
    let engine = ApplyEngine::new(store, ApplyRegistry::new(), cancel).with_progress(true);
    let result = engine.apply(&report.plan)?;

    print_result(&result);

    println!("{}", "[Next Steps]".bold().cyan());
    println!("  To remove every link created by this tool:");
    println!("     {}", "series-linker rollback".bold());

    Ok(())
}

/// Ask a yes/no question on stdin.
fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question.bold());
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_result(result: &ApplyResult) {
    println!();
    println!("{}", "[Apply Summary]".bold().green());
    println!("  {} {}", "Created:".bold(), result.count(Outcome::Created));
    println!("  {} {}", "Replaced:".bold(), result.count(Outcome::Replaced));
    println!("  {} {}", "Removed:".bold(), result.count(Outcome::Removed));
    println!("  {} {}", "Repaired:".bold(), result.count(Outcome::Repaired));
    println!("  {} {}", "Unchanged:".bold(), result.count(Outcome::Unchanged));
    println!("  {} {}", "Entries retired:".bold(), result.count(Outcome::EntryRetired));
    println!("  {} {}", "Failed:".bold(), result.failed.len());
    println!();

    for failure in &result.failed {
        let tag = match failure.failure {
            FailureKind::DestinationConflict => "[CONFLICT]".red(),
            FailureKind::Io => "[FAILED]".red(),
        };
        println!("  {} {}: {}", tag, failure.destination.display(), failure.message);
    }
    if !result.failed.is_empty() {
        println!();
    }

    print_issues(&result.warnings);

    if result.cancelled {
        println!(
            "{} {} operations were not attempted.",
            "[CANCEL]".yellow(),
            result.not_attempted
        );
    } else if result.is_success() {
        println!("{}", "[OK] All operations applied.".green());
    } else {
        println!("{}", "[WARN] Some operations failed; re-run apply after fixing them.".yellow());
    }
    println!();
}
