//! Command line argument definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Series Linker - Link unordered episode files into a clean show/season layout
#[derive(Parser, Debug)]
#[command(name = "series-linker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: <config dir>/series_linker/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Skip preflight checks
    #[arg(long, global = true)]
    pub skip_preflight: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by preview and apply.
#[derive(Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Source root with one sub-folder per show
    #[arg(short, long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Target root for the organized links
    #[arg(short, long, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Only process this show folder (repeatable)
    #[arg(short, long = "folder", value_name = "NAME")]
    pub folders: Vec<String>,

    /// Do not call the classification service; use the heuristic only
    #[arg(long)]
    pub offline: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan, classify and show what apply would change
    Preview {
        #[command(flatten)]
        scan: ScanArgs,

        /// Print the preview as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan, classify and create the links
    Apply {
        #[command(flatten)]
        scan: ScanArgs,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Remove links created by this tool
    Rollback {
        /// Only roll back this show (title or source folder name)
        #[arg(long, value_name = "TITLE")]
        show: Option<String>,

        /// Target root whose mapping to use
        #[arg(short, long, value_name = "DIR")]
        target: Option<PathBuf>,

        /// Dry run - show what would be done
        #[arg(long)]
        dry_run: bool,
    },

    /// Show configuration, show folders and managed links
    Status {
        /// Source root to list
        #[arg(short, long, value_name = "DIR")]
        source: Option<PathBuf>,

        /// Target root whose mapping to summarize
        #[arg(short, long, value_name = "DIR")]
        target: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preview_with_folders() {
        let cli = Cli::try_parse_from([
            "series-linker",
            "preview",
            "--source",
            "/media/tv_unordered",
            "--folder",
            "Frieren",
            "--folder",
            "Dungeon Meshi",
            "--offline",
        ])
        .unwrap();
        match cli.command {
            Commands::Preview { scan, json } => {
                assert_eq!(scan.folders, vec!["Frieren", "Dungeon Meshi"]);
                assert!(scan.offline);
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags_after_command() {
        let cli = Cli::try_parse_from(["series-linker", "rollback", "--dry-run", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Rollback { dry_run: true, .. }));
    }
}
