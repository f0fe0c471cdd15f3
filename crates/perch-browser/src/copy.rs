//! Directory copying for profile duplication. Symlinks are never followed.

use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Copy everything under `src` into `dst`, creating `dst`.
///
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    let mut copied = 0;
    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to)?;
        for entry in fs::read_dir(&from)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let target = to.join(entry.file_name());

            if file_type.is_symlink() {
                tracing::debug!("Skipping symlink {}", entry.path().display());
            } else if file_type.is_dir() {
                pending.push((entry.path(), target));
            } else if file_type.is_file() {
                fs::copy(entry.path(), &target)?;
                copied += 1;
            }
        }
    }

    Ok(copied)
}

/// Copy only the named top-level entries of `src` into `dst`.
///
/// Names that do not exist in `src` are skipped. Returns how many entries
/// were copied.
pub fn copy_named_entries(src: &Path, dst: &Path, names: &[&str]) -> Result<usize> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;

    for name in names {
        let from = src.join(name);
        let Ok(metadata) = fs::symlink_metadata(&from) else {
            continue;
        };
        let to = dst.join(name);

        if metadata.is_dir() {
            copy_tree(&from, &to)?;
        } else if metadata.is_file() {
            fs::copy(&from, &to)?;
        } else {
            continue;
        }
        copied += 1;
    }

    Ok(copied)
}
