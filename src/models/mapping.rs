//! Mapping store data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Current mapping file format version.
pub const MAPPING_VERSION: &str = "1.0";

/// One link created by this system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Original file the link points at.
    pub source: PathBuf,
    /// Link path in the target tree.
    pub destination: PathBuf,
    /// Show title used for the destination.
    pub title: String,
    /// Show year used for the destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    /// Season number.
    pub season: u16,
    /// Episode number.
    pub episode: u16,
    /// Source show folder name.
    #[serde(default)]
    pub show_folder: String,
    /// When the link was created.
    pub created_at: DateTime<Utc>,
}

/// Persisted mapping file, keyed by destination path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingFile {
    /// Format version.
    pub version: String,
    /// Last rewrite timestamp.
    pub updated_at: DateTime<Utc>,
    /// Entries keyed by destination path.
    pub entries: BTreeMap<PathBuf, MappingEntry>,
}

impl Default for MappingFile {
    fn default() -> Self {
        Self {
            version: MAPPING_VERSION.to_string(),
            updated_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }
}
