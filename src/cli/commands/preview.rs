//! Preview command implementation.
//!
//! Scans, classifies and plans, then shows what apply would change without
//! touching the target tree.

use super::{cancel_on_ctrl_c, folder_filter, print_preview};
use crate::cli::args::ScanArgs;
use crate::core::preview::preview as build_preview;
use crate::core::reconciler::Reconciler;
use crate::core::store::MappingStore;
use crate::models::config::Config;
use crate::services::classifier::ClassifierClient;
use crate::Result;
use colored::Colorize;

/// Run the preview command.
pub async fn preview(config: &Config, scan: &ScanArgs, json: bool) -> Result<()> {
    if !json {
        println!("{}", "[PREVIEW] Scanning source tree...".bold().cyan());
        println!("  {} {}", "Source:".bold(), config.source_root.display());
        println!("  {} {}", "Target:".bold(), config.target_root.display());
        println!();
    }

    let store = MappingStore::load_shared(&config.mapping_path())?;
    let client = ClassifierClient::new(config.classifier.clone())?;
    let reconciler = Reconciler::new(config, client, cancel_on_ctrl_c())?;

    let report = reconciler.scan(folder_filter(scan), &store).await?;
    let preview = build_preview(&report.plan);

    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    println!(
        "  {} {} files in {} show folders",
        "Scanned:".bold(),
        report.files_scanned,
        report.folders.len()
    );
    println!();
    print_preview(&preview);

    if report.cancelled {
        println!("{}", "[WARN] Scan was cancelled; the preview is partial.".yellow());
    } else if preview.is_noop() {
        println!("{}", "[OK] Target tree is up to date.".green());
    } else {
        println!("{}", "[Next Steps]".bold().cyan());
        println!("  To create these links:");
        println!("     {}", "series-linker apply".bold());
    }

    Ok(())
}
