//! Source and target root preflight checks.

use super::CheckResult;
use std::path::Path;

/// Check that the source root exists.
pub fn check_source(root: &Path) -> CheckResult {
    if root.is_dir() {
        CheckResult::ok("Source", &root.display().to_string())
    } else {
        CheckResult::warn(
            "Source",
            &format!("{} is not a directory", root.display()),
            "Pass --source or set source_root in the config file",
        )
    }
}

/// Check that the target root exists (or can be created) and is writable.
pub fn check_target(root: &Path) -> CheckResult {
    let check_dir = if root.exists() {
        root
    } else {
        match root.ancestors().find(|p| p.exists()) {
            Some(parent) => parent,
            None => {
                return CheckResult::warn(
                    "Target",
                    &format!("{} has no existing parent", root.display()),
                    "Pass --target or set target_root in the config file",
                )
            }
        }
    };

    let scratch = check_dir.join(format!(".series-linker-write-check-{}", uuid::Uuid::new_v4().simple()));
    match std::fs::write(&scratch, b"") {
        Ok(()) => {
            let _ = std::fs::remove_file(&scratch);
            CheckResult::ok("Target", &format!("{} is writable", root.display()))
        }
        Err(e) => CheckResult::warn(
            "Target",
            &format!("{} is not writable: {}", check_dir.display(), e),
            "Fix permissions on the target root",
        ),
    }
}
