//! Lexical path helpers shared by discovery and lifecycle code.
//!
//! Nothing here touches the filesystem: paths are compared exactly as written
//! after `.`/`..` components are folded away.

use std::path::{Component, Path, PathBuf};

/// Fold `.` and `..` components without consulting the filesystem.
///
/// `..` never climbs above a root or prefix, so `/data/../../etc` becomes `/etc`.
/// Leading `..` components of a relative path are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }

    out
}

/// Returns true only when `target` lies strictly inside `root`.
///
/// Equal paths, ancestors, siblings and anything escaping through `..` are
/// rejected. Empty inputs are never contained.
pub fn is_sub_path(root: &Path, target: &Path) -> bool {
    if root.as_os_str().is_empty() || target.as_os_str().is_empty() {
        return false;
    }

    let root = fold_case(&normalize(root));
    let target = fold_case(&normalize(target));

    match target.strip_prefix(&root) {
        Ok(rest) => {
            let mut components = rest.components().peekable();
            components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
        }
        Err(_) => false,
    }
}

/// Case-insensitive key used to merge records that point at the same directory.
pub fn path_key(path: &Path) -> String {
    normalize(path).to_string_lossy().to_lowercase()
}

/// Render a relative path with forward slashes, the form INI files store.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(windows)]
fn fold_case(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

#[cfg(not(windows))]
fn fold_case(path: &Path) -> PathBuf {
    path.to_path_buf()
}
