//! Filesystem helpers for publishing artifacts all-or-nothing
//!
//! Every artifact is written to a sibling temp file first and then renamed
//! over its target, so readers see either the previous artifact or the new
//! one, never a partial write.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Sibling temp path for `target`: same directory, `.tmp` appended
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use portfoliograph::fs_utils::temp_path_for;
///
/// let tmp = temp_path_for(Path::new("/data/wow_portfolios.db"));
/// assert_eq!(tmp, Path::new("/data/wow_portfolios.db.tmp"));
/// ```
pub fn temp_path_for(target: &Path) -> PathBuf {
    sibling_with_suffix(target, ".tmp")
}

/// Sibling path holding the previous artifact while a publish is in flight
pub fn backup_path_for(target: &Path) -> PathBuf {
    sibling_with_suffix(target, ".bak")
}

fn sibling_with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("artifact"));
    name.push(suffix);
    target.with_file_name(name)
}

/// Cross-platform atomic rename that replaces an existing target.
///
/// On Unix, `fs::rename` atomically replaces the target if it exists.
/// On Windows, `fs::rename` fails if the target exists, so the target is
/// deleted first.
pub fn atomic_rename(src: &Path, dst: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        if dst.exists() {
            std::fs::remove_file(dst)?;
        }
    }
    std::fs::rename(src, dst)
}

/// Rename `staged` over `target`, keeping the previous target at
/// [`backup_path_for`] until [`restore_backup`] or [`remove_sidecars`]
///
/// The backup is a hard link, so `target` never goes missing in between.
pub fn swap_in_with_backup(staged: &Path, target: &Path) -> io::Result<()> {
    let backup = backup_path_for(target);
    remove_if_exists(&backup)?;
    if target.exists() {
        std::fs::hard_link(target, &backup)?;
    }
    if let Err(e) = atomic_rename(staged, target) {
        remove_if_exists(&backup)?;
        return Err(e);
    }
    Ok(())
}

/// Undo the last [`swap_in_with_backup`] of `target`
///
/// With no backup, `target` did not exist before the swap and is removed.
pub fn restore_backup(target: &Path) -> io::Result<()> {
    let backup = backup_path_for(target);
    if backup.exists() {
        atomic_rename(&backup, target)
    } else {
        remove_if_exists(target)
    }
}

/// Remove the temp and backup files left beside `target`
pub fn remove_sidecars(target: &Path) -> io::Result<()> {
    remove_if_exists(&temp_path_for(target))?;
    remove_if_exists(&backup_path_for(target))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Create the parent directory of `path` if it has one
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
