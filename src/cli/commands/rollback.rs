//! Rollback command implementation.
//!
//! Removes links recorded in the mapping store, for every show or one show.

use crate::core::rollback::RollbackEngine;
use crate::core::store::MappingStore;
use crate::models::config::Config;
use crate::models::report::{RollbackResult, RollbackScope};
use crate::Result;
use colored::Colorize;

/// Run the rollback command.
pub async fn rollback(config: &Config, show: Option<&str>, dry_run: bool) -> Result<()> {
    println!("{}", "[ROLLBACK] Rollback command".bold().cyan());
    println!();

    let mapping_path = config.mapping_path();
    println!("[INFO] Loading mapping: {}", mapping_path.display());
    let store = MappingStore::load_shared(&mapping_path)?;

    let scope = match show {
        Some(title) => RollbackScope::Show(title.to_string()),
        None => RollbackScope::All,
    };

    let engine = RollbackEngine::new(store, config.target_root.clone());
    let in_scope = engine.entries_in_scope(&scope)?;
    println!("  {} {}", "Entries:".bold(), in_scope.len());
    println!();

    if in_scope.is_empty() {
        println!("{}", "[INFO] Nothing to roll back.".dimmed());
        return Ok(());
    }

    if dry_run {
        println!("{}", "[DRY-RUN] Showing what would be done:".bold().yellow());
    } else {
        println!("{}", "[WARNING] This will delete the links listed below!".bold().yellow());
    }
    println!();

    let result = engine.rollback(&scope, dry_run)?;
    print_summary(&result);

    if !result.is_success() {
        println!("{}", "[WARN] Some links could not be removed.".yellow());
    } else if dry_run {
        println!("{}", "[OK] Dry run complete - no changes were made".green());
        println!();
        println!("{}", "[Next Steps]".bold().cyan());
        println!("  To actually execute the rollback:");
        println!("     {}", "series-linker rollback".bold());
    } else {
        println!("{}", "[OK] Rollback completed successfully!".green());
    }

    Ok(())
}

fn print_summary(result: &RollbackResult) {
    let verb = if result.dry_run { "Would remove" } else { "Removed" };
    for path in &result.removed {
        println!("  {} {}", format!("[{}]", verb).green(), path.display());
    }
    for stale in &result.stale {
        println!("  {} {} ({})", "[STALE]".yellow(), stale.destination.display(), stale.reason);
    }
    for error in &result.errors {
        println!("  {} {}", "[FAILED]".red(), error);
    }
    println!();

    println!("{}", "[Rollback Summary]".bold().green());
    println!("  {} {}", format!("{}:", verb).bold(), result.removed.len());
    println!("  {} {}", "Stale entries:".bold(), result.stale.len());
    println!("  {} {}", "Errors:".bold(), result.errors.len());
    println!("  {} {}", "Directories pruned:".bold(), result.pruned_dirs.len());
    println!();
}
