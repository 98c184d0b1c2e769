//! Status command implementation.
//!
//! Lists the show folders under the source root and summarizes the links
//! recorded in the mapping store.

use crate::core::scanner::list_show_folders;
use crate::core::store::MappingStore;
use crate::models::config::{config_dir, Config};
use crate::utils::fs::{path_state, PathState};
use crate::Result;
use colored::Colorize;
use std::collections::BTreeMap;

/// Run the status command.
pub async fn status(config: &Config) -> Result<()> {
    println!("{}", "[STATUS] Series Linker".bold().cyan());
    println!();
    println!("  {} {}", "Config dir:".bold(), config_dir().display());
    println!("  {} {}", "Source:".bold(), config.source_root.display());
    println!("  {} {}", "Target:".bold(), config.target_root.display());
    println!("  {} {}", "Mapping:".bold(), config.mapping_path().display());
    println!(
        "  {} {}",
        "Classifier:".bold(),
        if config.classifier.enabled {
            format!("{} ({})", config.classifier.base_url, config.classifier.model)
        } else {
            "disabled".to_string()
        }
    );
    println!();

    println!("{}", "[Show Folders]".bold().cyan());
    match list_show_folders(&config.source_root) {
        Ok(folders) if folders.is_empty() => println!("  {}", "(none)".dimmed()),
        Ok(folders) => {
            for folder in folders {
                let name = folder.file_name().unwrap_or_default().to_string_lossy().to_string();
                println!("  - {}", name);
            }
        }
        Err(e) => println!("  {} {}", "[WARN]".yellow(), e),
    }
    println!();

    let store = MappingStore::load(&config.mapping_path())?;
    println!("{}", "[Managed Links]".bold().cyan());
    if store.is_empty() {
        println!("  {}", "(none)".dimmed());
        println!();
        return Ok(());
    }

    // title -> (links, missing)
    let mut shows: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for entry in store.entries() {
        let counts = shows.entry(entry.title.as_str()).or_default();
        counts.0 += 1;
        if !matches!(path_state(&entry.destination), Ok(PathState::Symlink(_))) {
            counts.1 += 1;
        }
    }

    for (title, (links, missing)) in &shows {
        if *missing > 0 {
            println!(
                "  {} {} links, {}",
                title.bold(),
                links,
                format!("{} not a link on disk", missing).yellow()
            );
        } else {
            println!("  {} {} links", title.bold(), links);
        }
    }
    println!();
    println!("  {} {}", "Total:".bold(), store.len());
    println!();

    Ok(())
}
