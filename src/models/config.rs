//! Configuration model.
//!
//! Configuration is an explicit structure handed to each component. Only the
//! binary reads it from disk or the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable consulted for the classifier credential.
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the unordered source tree (one sub-folder per show).
    pub source_root: PathBuf,
    /// Root of the organized target tree.
    pub target_root: PathBuf,
    /// Mapping store file. Defaults to `<target_root>/.series-linker/mapping.json`.
    pub mapping_file: Option<PathBuf>,
    /// How subtitles and sidecar files get their episode numbers.
    pub companions: CompanionPolicy,
    /// What to do when a fresh title differs from the mapped one.
    pub title_policy: TitlePolicy,
    /// Classification service configuration.
    pub classifier: ClassifierConfig,
}

/// Companion file policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanionPolicy {
    /// Companions sharing a video's stem inherit the video's episode.
    #[default]
    Inherit,
    /// Every file is classified on its own.
    Independent,
}

/// Title stability policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitlePolicy {
    /// Reuse the title and year already mapped for a show folder.
    #[default]
    KeepMapped,
    /// Always use the freshly classified title.
    FollowClassifier,
}

/// Classification service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Whether to call the service at all. When false every file uses the heuristic.
    pub enabled: bool,
    /// Service base URL (OpenAI-compatible chat completions).
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// API key.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries on transport errors, timeouts and rate limits.
    pub max_retries: u32,
    /// Maximum concurrent requests across show folders.
    pub concurrency: usize,
    /// Guesses below this confidence go through the heuristic.
    pub acceptance_threshold: f32,
    /// Abort the run on a malformed response instead of falling back.
    pub strict_protocol: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("tv_unordered"),
            target_root: PathBuf::from("tv"),
            mapping_file: None,
            companions: CompanionPolicy::default(),
            title_policy: TitlePolicy::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: None,
            timeout_secs: 60,
            max_retries: 2,
            concurrency: 3,
            acceptance_threshold: 0.5,
            strict_protocol: false,
        }
    }
}

impl Config {
    /// Create a configuration for the given roots with defaults elsewhere.
    pub fn new(source_root: impl Into<PathBuf>, target_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            target_root: target_root.into(),
            ..Default::default()
        }
    }

    /// Resolved mapping store path.
    pub fn mapping_path(&self) -> PathBuf {
        self.mapping_file.clone().unwrap_or_else(|| {
            self.target_root
                .join(".series-linker")
                .join("mapping.json")
        })
    }

    /// Make the roots and the mapping file absolute against the working
    /// directory. Link sources are written verbatim, so a relative root would
    /// produce links that resolve against the link's own directory.
    pub fn absolutize(&mut self) -> crate::Result<()> {
        self.source_root = std::path::absolute(&self.source_root)?;
        self.target_root = std::path::absolute(&self.target_root)?;
        if let Some(mapping) = &self.mapping_file {
            self.mapping_file = Some(std::path::absolute(mapping)?);
        }
        Ok(())
    }

    /// Validate value ranges.
    pub fn validate(&self) -> crate::Result<()> {
        let c = &self.classifier;
        if !(0.0..=1.0).contains(&c.acceptance_threshold) {
            return Err(crate::Error::InvalidConfig(format!(
                "classifier.acceptance_threshold must be within 0.0..=1.0, got {}",
                c.acceptance_threshold
            )));
        }
        if c.concurrency == 0 {
            return Err(crate::Error::InvalidConfig(
                "classifier.concurrency must be at least 1".to_string(),
            ));
        }
        if c.timeout_secs == 0 {
            return Err(crate::Error::InvalidConfig(
                "classifier.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.source_root == self.target_root {
            return Err(crate::Error::InvalidConfig(
                "source_root and target_root must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("series_linker")
}

/// Load configuration from an explicit file, or from the default location.
///
/// A missing default file yields defaults; a missing explicit file is an error.
/// The API key falls back to `DEEPSEEK_API_KEY`.
pub fn load_config(path: Option<&Path>) -> crate::Result<Config> {
    let mut config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(crate::Error::PathNotFound(path.display().to_string()));
            }
            parse_config(&std::fs::read_to_string(path)?)?
        }
        None => {
            let default_path = config_dir().join("config.toml");
            if default_path.exists() {
                parse_config(&std::fs::read_to_string(&default_path)?)?
            } else {
                Config::default()
            }
        }
    };

    if config.classifier.api_key.is_none() {
        config.classifier.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
    }

    Ok(config)
}

/// Parse configuration from TOML text.
pub fn parse_config(content: &str) -> crate::Result<Config> {
    let config: Config = toml::from_str(content)?;
    Ok(config)
}
