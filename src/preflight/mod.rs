//! Preflight checks module.
//!
//! Checks only warn: a classifier outage is covered by the heuristic and
//! missing roots are reported again, as errors, by the command itself.

mod classifier;
mod paths;

use crate::models::config::Config;
use colored::Colorize;

/// Result of a preflight check.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub success: bool,
    pub message: String,
    pub hint: Option<String>,
}

impl CheckResult {
    pub fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            message: message.to_string(),
            hint: None,
        }
    }

    pub fn warn(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }
}

/// Run all preflight checks.
pub async fn run_preflight_checks(config: &Config) -> Vec<CheckResult> {
    let mut results = vec![
        paths::check_source(&config.source_root),
        paths::check_target(&config.target_root),
        classifier::check_api_key(&config.classifier),
    ];

    if config.classifier.enabled && config.classifier.api_key.is_some() {
        results.push(classifier::check_reachable(&config.classifier).await);
    }

    results
}

/// Print preflight check results.
pub fn print_results(results: &[CheckResult]) {
    for result in results {
        if result.success {
            println!(
                "{} {}: {}",
                "[OK]".green(),
                result.name.bold(),
                result.message
            );
        } else {
            println!(
                "{} {}: {}",
                "[WARN]".yellow(),
                result.name.bold(),
                result.message
            );
            if let Some(ref hint) = result.hint {
                println!("  {} {}", "->".yellow(), hint);
            }
        }
    }
}

/// Check if all preflight checks passed.
pub fn all_passed(results: &[CheckResult]) -> bool {
    results.iter().all(|r| r.success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_config_skips_network() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::new(temp.path().join("in"), temp.path().join("out"));
        config.classifier.enabled = false;

        let results = run_preflight_checks(&config).await;
        assert_eq!(results.len(), 3);
        assert!(!all_passed(&results));
        assert!(results.iter().any(|r| r.name == "Classifier" && r.success));
    }
}
