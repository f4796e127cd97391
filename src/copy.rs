//! File, symlink, and directory-tree copying.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{DeployError, IoContext, Result};

/// Set the executable bits (`u+x,g+x,o+x`).
pub fn make_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path).at(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms).at(path)
}

/// Clear all executable bits, leaving the rest of the mode alone.
pub fn clear_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path).at(path)?.permissions();
    perms.set_mode(perms.mode() & !0o111);
    fs::set_permissions(path, perms).at(path)
}

/// Copy `src` to `dst`. A symlink is re-created pointing at the same target
/// string, not resolved. An existing `dst` is replaced.
pub fn copy_preserving_symlink(src: &Path, dst: &Path) -> Result<()> {
    remove_if_present(dst)?;
    let meta = fs::symlink_metadata(src).at(src)?;
    if meta.file_type().is_symlink() {
        let target = fs::read_link(src).at(src)?;
        std::os::unix::fs::symlink(&target, dst).at(dst)?;
    } else {
        fs::copy(src, dst).at(dst)?;
    }
    Ok(())
}

/// Copy the bytes behind `src` (following symlinks) to `dst`, replacing it.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    remove_if_present(dst)?;
    fs::copy(src, dst).map_err(|e| {
        // Report the side that is actually missing
        let path = if src.exists() { dst } else { src };
        DeployError::fs(path, e)
    })
}

/// Copy a directory recursively, handling symlinks.
///
/// Returns the total size in bytes of all regular files copied.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<u64> {
    let mut total_size: u64 = 0;

    fs::create_dir_all(dst).at(dst)?;

    for entry in fs::read_dir(src).at(src)? {
        let entry = entry.at(src)?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());
        let file_type = entry.file_type().at(&path)?;

        if file_type.is_symlink() {
            // Keep the link text verbatim; relative targets stay relative
            let target = fs::read_link(&path).at(&path)?;
            std::os::unix::fs::symlink(&target, &dest_path).at(&dest_path)?;
        } else if file_type.is_dir() {
            total_size += copy_dir_recursive(&path, &dest_path)?;
        } else {
            total_size += fs::copy(&path, &dest_path).at(&dest_path)?;
        }
    }

    Ok(total_size)
}

/// Replace `dst` with a copy of the tree at `src` (remove, then copy; never merge).
pub fn replace_dir_tree(src: &Path, dst: &Path) -> Result<u64> {
    if !src.is_dir() {
        return Err(DeployError::fs(
            src,
            io::Error::new(io::ErrorKind::NotFound, "source directory does not exist"),
        ));
    }
    if dst.exists() {
        fs::remove_dir_all(dst).at(dst)?;
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }
    copy_dir_recursive(src, dst)
}

/// Delete every regular file called `file_name` anywhere under `root`.
///
/// Returns the number of files removed.
pub fn remove_files_named(root: &Path, file_name: &str) -> Result<usize> {
    if !root.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            DeployError::fs(path, e.into())
        })?;
        if entry.file_type().is_file() && entry.file_name() == file_name {
            fs::remove_file(entry.path()).at(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Remove a file or symlink if one exists at `path`.
pub(crate) fn remove_if_present(path: &Path) -> Result<()> {
    // Not checking exists() first: a dangling symlink reports false
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DeployError::fs(path, e)),
    }
}
