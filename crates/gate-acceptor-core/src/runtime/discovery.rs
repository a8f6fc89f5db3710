// crates/gate-acceptor-core/src/runtime/discovery.rs
// ============================================================================
// Module: Gate Acceptor Package Discovery
// Description: Finds test packages under the test directory.
// Purpose: Supply gateless mode with packages when none are listed.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! A package is any directory holding at least one `*_test.go` file. The
//! walk is depth-first in file-name order so repeated scans yield the same
//! unit order. Directories the Go tool ignores for `./...` patterns (names
//! starting with `.` or `_`, and `testdata`) are skipped, as are symlinks.
//!
//! Packages are reported relative to the test root (`.` for the root itself,
//! `./a/b` below it), which is where the test command runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use crate::core::ConfigError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File-name suffix marking a directory as a test package.
pub const TEST_FILE_SUFFIX: &str = "_test.go";

/// Trailing pattern accepted on the test directory.
const RECURSIVE_SUFFIX: &str = "/...";

// ============================================================================
// SECTION: Discovery
// ============================================================================

/// Returns the test directory with a trailing `/...` removed.
#[must_use]
pub fn test_root(testdir: &Path) -> PathBuf {
    let raw = testdir.to_string_lossy();
    match raw.strip_suffix(RECURSIVE_SUFFIX) {
        Some("") => PathBuf::from("/"),
        Some(stripped) => PathBuf::from(stripped),
        None => testdir.to_path_buf(),
    }
}

/// Lists the test packages under `testdir`, relative to its root.
///
/// # Errors
///
/// Returns [`ConfigError::Discovery`] when the root is not a directory or
/// a directory cannot be read.
pub fn discover_test_packages(testdir: &Path) -> Result<Vec<String>, ConfigError> {
    let root = test_root(testdir);
    if !root.is_dir() {
        return Err(ConfigError::Discovery(format!("test directory does not exist: {}", root.display())));
    }
    let mut packages = Vec::new();
    let mut pending = vec![PathBuf::new()];
    while let Some(relative) = pending.pop() {
        let dir = root.join(&relative);
        let mut entries = fs::read_dir(&dir)
            .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
            .map_err(|err| ConfigError::Discovery(format!("{}: {err}", dir.display())))?;
        entries.sort_by_key(fs::DirEntry::file_name);

        let mut has_tests = false;
        let mut children = Vec::new();
        for entry in entries {
            let file_type = entry
                .file_type()
                .map_err(|err| ConfigError::Discovery(format!("{}: {err}", entry.path().display())))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if file_type.is_dir() {
                if !ignored_dir(&name) {
                    children.push(relative.join(&*name));
                }
            } else if file_type.is_file() && name.ends_with(TEST_FILE_SUFFIX) {
                has_tests = true;
            }
        }
        if has_tests {
            packages.push(package_path(&relative));
        }
        // Reversed so the stack pops children in name order.
        pending.extend(children.into_iter().rev());
    }
    Ok(packages)
}

/// Returns true for directories excluded from `./...` walks.
fn ignored_dir(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_') || name == "testdata"
}

/// Formats a root-relative directory as a package pattern.
fn package_path(relative: &Path) -> String {
    let parts: Vec<String> =
        relative.components().map(|part| part.as_os_str().to_string_lossy().into_owned()).collect();
    if parts.is_empty() { ".".to_string() } else { format!("./{}", parts.join("/")) }
}
