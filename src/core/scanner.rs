//! Source tree scanner.
//!
//! Walks the source root one show folder at a time and snapshots every video,
//! subtitle and sidecar file, skipping extras, samples and hidden files.

use crate::models::media::{FileKind, SourceFile};
use crate::models::report::Issue;
use crate::utils::fs::ensure_directory;
use crate::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One show folder directly under the source root.
#[derive(Debug, Clone)]
pub struct ShowFolder {
    /// Folder name, used as classification context.
    pub name: String,
    /// Absolute folder path.
    pub path: PathBuf,
    /// Files found under the folder, sorted by path.
    pub files: Vec<SourceFile>,
}

/// Result of scanning the source root.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Show folders, sorted by name.
    pub folders: Vec<ShowFolder>,
    /// Files that could not be read.
    pub issues: Vec<Issue>,
    /// Total files looked at, including skipped ones.
    pub total_files_scanned: usize,
}

impl ScanResult {
    /// Number of files kept across all folders.
    pub fn file_count(&self) -> usize {
        self.folders.iter().map(|f| f.files.len()).sum()
    }

    /// Paths of the scanned show folders.
    pub fn scope(&self) -> Vec<PathBuf> {
        self.folders.iter().map(|f| f.path.clone()).collect()
    }
}

/// Check if a file is inside an extras or sample directory.
fn is_in_extras_directory(relative: &Path) -> bool {
    let extras_names = [
        "extras",
        "extra",
        "featurettes",
        "featurette",
        "behind the scenes",
        "deleted scenes",
        "making of",
        "bonus",
        "sample",
        "samples",
        "trailers",
    ];

    relative
        .parent()
        .into_iter()
        .flat_map(|p| p.components())
        .any(|component| match component {
            std::path::Component::Normal(name) => {
                let name = name.to_string_lossy().to_lowercase();
                extras_names.contains(&name.as_str())
                    || name.ends_with(".extras")
                    || name.ends_with("-extras")
                    || name.ends_with("_extras")
            }
            _ => false,
        })
}

/// Check if a filename indicates a sample file.
fn is_sample_filename(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    lower.contains("sample") && !lower.contains("sampler")
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Create a SourceFile snapshot from a path.
fn create_source_file(path: &Path, show_folder: &str, kind: FileKind) -> Result<SourceFile> {
    let metadata = std::fs::metadata(path)?;
    let modified = metadata
        .modified()
        .map(chrono::DateTime::<chrono::Utc>::from)
        .unwrap_or_else(|_| chrono::Utc::now());

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(SourceFile {
        path: path.to_path_buf(),
        filename,
        show_folder: show_folder.to_string(),
        kind,
        size: metadata.len(),
        modified,
    })
}

/// Scan one show folder recursively.
pub fn scan_show_folder(path: &Path, issues: &mut Vec<Issue>) -> (ShowFolder, usize) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut files = Vec::new();
    let mut scanned = 0;

    for entry in WalkDir::new(path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let source = e.path().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf());
                tracing::warn!("Cannot read {}: {}", source.display(), e);
                issues.push(Issue::Unreadable {
                    source,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        scanned += 1;

        let entry_path = entry.path();
        let filename = entry.file_name().to_string_lossy();
        let relative = entry_path.strip_prefix(path).unwrap_or(entry_path);

        if is_hidden(&filename) {
            continue;
        }
        if is_in_extras_directory(relative) {
            tracing::debug!("Skipping extras file: {}", entry_path.display());
            continue;
        }

        let Some(kind) = FileKind::from_path(entry_path) else {
            continue;
        };

        if kind == FileKind::Video && is_sample_filename(&filename) {
            tracing::debug!("Skipping sample file: {}", entry_path.display());
            continue;
        }

        match create_source_file(entry_path, &name, kind) {
            Ok(file) => files.push(file),
            Err(e) => {
                tracing::warn!("Failed to read file {}: {}", entry_path.display(), e);
                issues.push(Issue::Unreadable {
                    source: entry_path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));

    (
        ShowFolder {
            name,
            path: path.to_path_buf(),
            files,
        },
        scanned,
    )
}

/// Scan the source root.
///
/// Each direct, non-hidden sub-directory is one show folder. When `only` is
/// given, just those folders are scanned and each must exist.
pub fn scan_source(root: &Path, only: Option<&[String]>) -> Result<ScanResult> {
    ensure_directory(root)?;

    let folder_paths: Vec<PathBuf> = match only {
        Some(names) => {
            let mut paths = Vec::with_capacity(names.len());
            for name in names {
                let path = root.join(name);
                if !path.is_dir() {
                    return Err(crate::Error::ShowFolderNotFound(name.clone()));
                }
                paths.push(path);
            }
            paths.sort();
            paths.dedup();
            paths
        }
        None => list_show_folders(root)?,
    };

    let mut result = ScanResult::default();
    for path in folder_paths {
        let (folder, scanned) = scan_show_folder(&path, &mut result.issues);
        result.total_files_scanned += scanned;
        tracing::debug!("{}: {} files", folder.name, folder.files.len());
        result.folders.push(folder);
    }

    tracing::info!(
        "Scanned {} files in {} show folders: {} kept",
        result.total_files_scanned,
        result.folders.len(),
        result.file_count()
    );

    Ok(result)
}

/// List show folder paths directly under the source root, sorted.
pub fn list_show_folders(root: &Path) -> Result<Vec<PathBuf>> {
    let mut folders = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if is_hidden(&name) {
            continue;
        }
        if entry.file_type()?.is_dir() {
            folders.push(entry.path());
        }
    }
    folders.sort();
    Ok(folders)
}
