//! File system utilities.

use crate::Result;
use std::path::{Path, PathBuf};

/// Check if a path exists and is a directory.
pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(crate::Error::PathNotFound(path.display().to_string()));
    }
    if !path.is_dir() {
        return Err(crate::Error::NotADirectory(path.display().to_string()));
    }
    Ok(())
}

/// What occupies a path, without following symbolic links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathState {
    Missing,
    /// A symbolic link and the path it points at.
    Symlink(PathBuf),
    File,
    Directory,
}

impl PathState {
    /// Short description for reports.
    pub fn describe(&self) -> &'static str {
        match self {
            PathState::Missing => "nothing",
            PathState::Symlink(_) => "a symbolic link",
            PathState::File => "a regular file",
            PathState::Directory => "a directory",
        }
    }
}

/// Inspect a path with `lstat`.
pub fn path_state(path: &Path) -> Result<PathState> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            Ok(PathState::Symlink(std::fs::read_link(path)?))
        }
        Ok(meta) if meta.is_dir() => Ok(PathState::Directory),
        Ok(_) => Ok(PathState::File),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PathState::Missing),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn make_symlink(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

#[cfg(windows)]
fn make_symlink(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(source, link)
}

/// Point `link` at `source`, replacing an existing link atomically.
///
/// The new link is created at a hidden sibling name and renamed over the
/// destination, so readers never see a missing link. The caller must have
/// checked that `link` is not a regular file or directory. `source` must be
/// absolute.
pub fn replace_symlink(source: &Path, link: &Path) -> Result<()> {
    if !source.is_absolute() {
        return Err(crate::Error::other(format!(
            "link source must be absolute: {}",
            source.display()
        )));
    }
    let parent = link
        .parent()
        .ok_or_else(|| crate::Error::other(format!("{} has no parent", link.display())))?;
    std::fs::create_dir_all(parent)?;

    let name = link
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.linktmp-{}", name, uuid::Uuid::new_v4().simple()));

    make_symlink(source, &tmp)?;
    if let Err(e) = std::fs::rename(&tmp, link) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Write `contents` to `path` through a temporary sibling and a rename.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    std::fs::write(&tmp, contents)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Remove empty directories from `start` upwards, stopping at `root`.
///
/// `root` itself and anything outside it are never removed. Returns the
/// directories that were removed.
pub fn prune_empty_dirs(start: &Path, root: &Path) -> Vec<PathBuf> {
    let mut pruned = Vec::new();
    let mut current = Some(start);

    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        let is_empty = std::fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty || std::fs::remove_dir(dir).is_err() {
            break;
        }
        tracing::debug!("Removed empty directory: {}", dir.display());
        pruned.push(dir.to_path_buf());
        current = dir.parent();
    }

    pruned
}
