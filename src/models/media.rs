//! Media-related data models.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Supported video file extensions.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "m4v", "ts", "m2ts", "flv", "webm", "mpg", "mpeg", "vob",
    "ogv", "ogm", "divx", "3gp", "mts", "rmvb", "asf",
];

/// Subtitle file extensions.
pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "sub", "idx", "vtt", "sup", "smi"];

/// Sidecar metadata extensions (descriptions, artwork, chapter files).
pub const SIDECAR_EXTENSIONS: &[&str] = &["nfo", "txt", "xml", "jpg", "jpeg", "png"];

/// Kind of a source file, decided from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Video,
    Subtitle,
    Sidecar,
}

impl FileKind {
    /// Classify a path by its extension. Returns `None` for files we never link.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(FileKind::Video)
        } else if SUBTITLE_EXTENSIONS.contains(&ext.as_str()) {
            Some(FileKind::Subtitle)
        } else if SIDECAR_EXTENSIONS.contains(&ext.as_str()) {
            Some(FileKind::Sidecar)
        } else {
            None
        }
    }

    /// Whether this file accompanies a video rather than being one.
    pub fn is_companion(self) -> bool {
        !matches!(self, FileKind::Video)
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::Video => write!(f, "video"),
            FileKind::Subtitle => write!(f, "subtitle"),
            FileKind::Sidecar => write!(f, "sidecar"),
        }
    }
}

/// Snapshot of a source file taken at scan time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Absolute path to the file.
    pub path: PathBuf,
    /// File name without path.
    pub filename: String,
    /// Name of the show folder the file was discovered under.
    pub show_folder: String,
    /// File kind.
    pub kind: FileKind,
    /// File size in bytes.
    pub size: u64,
    /// Last modified time.
    pub modified: chrono::DateTime<chrono::Utc>,
}

impl SourceFile {
    /// File name without its final extension.
    pub fn stem(&self) -> &str {
        match self.filename.rfind('.') {
            Some(idx) if idx > 0 => &self.filename[..idx],
            _ => &self.filename,
        }
    }

    /// Final extension including the dot (`.mkv`), or empty.
    pub fn extension(&self) -> String {
        match self.filename.rfind('.') {
            Some(idx) if idx > 0 => self.filename[idx..].to_string(),
            _ => String::new(),
        }
    }
}

/// Where an episode guess came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuessSource {
    /// The external classification service.
    Classifier,
    /// Deterministic pattern matching.
    Heuristic,
    /// Copied from the video this companion file is paired with.
    Inherited,
}

impl std::fmt::Display for GuessSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuessSource::Classifier => write!(f, "classifier"),
            GuessSource::Heuristic => write!(f, "heuristic"),
            GuessSource::Inherited => write!(f, "inherited"),
        }
    }
}

/// Structured episode metadata for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeGuess {
    /// Normalized show title.
    pub title: String,
    /// Release year of the show, if known.
    pub year: Option<u16>,
    /// Season number (0 only for specials).
    pub season: u16,
    /// Episode number, always positive.
    pub episode: u16,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
    /// Origin of the guess.
    pub source: GuessSource,
}

impl EpisodeGuess {
    /// `S01E02` style code.
    pub fn episode_code(&self) -> String {
        format!("S{:02}E{:02}", self.season, self.episode)
    }

    /// Show folder name: `Title (Year)` or `Title`.
    pub fn show_dir_name(&self) -> String {
        match self.year {
            Some(year) => format!("{} ({})", self.title, year),
            None => self.title.clone(),
        }
    }
}

/// Normalize a show title for use as a path component.
///
/// Trims, drops characters that are illegal on common filesystems and
/// collapses whitespace. Returns `None` when nothing usable is left.
pub fn normalize_title(raw: &str) -> Option<String> {
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_from_path() {
        assert_eq!(FileKind::from_path(Path::new("a.MKV")), Some(FileKind::Video));
        assert_eq!(FileKind::from_path(Path::new("a.en.srt")), Some(FileKind::Subtitle));
        assert_eq!(FileKind::from_path(Path::new("a.nfo")), Some(FileKind::Sidecar));
        assert_eq!(FileKind::from_path(Path::new("a.exe")), None);
        assert_eq!(FileKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Re:Zero  ").as_deref(), Some("ReZero"));
        assert_eq!(normalize_title("What If...?").as_deref(), Some("What If"));
        assert_eq!(normalize_title("Foo   Bar").as_deref(), Some("Foo Bar"));
        assert_eq!(normalize_title(" / : "), None);
    }

    #[test]
    fn test_show_dir_name() {
        let guess = EpisodeGuess {
            title: "Sousou no Frieren".to_string(),
            year: Some(2023),
            season: 1,
            episode: 1,
            confidence: 0.9,
            source: GuessSource::Classifier,
        };
        assert_eq!(guess.show_dir_name(), "Sousou no Frieren (2023)");
        assert_eq!(guess.episode_code(), "S01E01");

        let no_year = EpisodeGuess { year: None, ..guess };
        assert_eq!(no_year.show_dir_name(), "Sousou no Frieren");
    }
}
