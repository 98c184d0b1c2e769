//! Classification service preflight checks.

use super::CheckResult;
use crate::models::config::{ClassifierConfig, API_KEY_ENV};
use crate::services::classifier::ClassifierClient;

/// Check that a credential is configured.
pub fn check_api_key(config: &ClassifierConfig) -> CheckResult {
    if !config.enabled {
        return CheckResult::ok("Classifier", "disabled, heuristic only");
    }
    match &config.api_key {
        Some(_) => CheckResult::ok("API key", "configured"),
        None => CheckResult::warn(
            "API key",
            "not configured, files will be classified by the heuristic",
            &format!("Set {} or classifier.api_key in the config file", API_KEY_ENV),
        ),
    }
}

/// Check that the service answers.
pub async fn check_reachable(config: &ClassifierConfig) -> CheckResult {
    let client = match ClassifierClient::new(config.clone()) {
        Ok(client) => client,
        Err(e) => {
            return CheckResult::warn("Classifier", &e.to_string(), "Check classifier.base_url")
        }
    };

    if client.health_check().await {
        CheckResult::ok(
            "Classifier",
            &format!("{} reachable (model {})", config.base_url, config.model),
        )
    } else {
        CheckResult::warn(
            "Classifier",
            &format!("{} not reachable", config.base_url),
            "Files will be classified by the heuristic; use --offline to skip the service",
        )
    }
}
