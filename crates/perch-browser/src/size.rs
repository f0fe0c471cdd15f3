//! Bounded directory size walk.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Caps on a single walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    pub max_files: u64,
    pub max_depth: usize,
}

impl SizeLimits {
    /// Limits used for whole-profile measurements.
    pub const PROFILE: SizeLimits = SizeLimits {
        max_files: 2_500_000,
        max_depth: 64,
    };
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_files: 400_000,
            max_depth: 64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeStats {
    pub ok: bool,
    pub bytes: u64,
    pub files: u64,
    pub dirs: u64,
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SizeStats {
    pub fn failed(code: &str) -> Self {
        Self {
            ok: false,
            error: Some(code.to_string()),
            ..Default::default()
        }
    }
}

/// Sum regular file sizes under `dir` without following symlinks.
///
/// `dirs` counts directories that could be read. Unreadable directories and
/// files whose metadata fails are skipped.
pub fn measure_dir(dir: &Path, limits: SizeLimits) -> SizeStats {
    if !dir.is_dir() {
        return SizeStats::failed("missing-dir");
    }

    let mut stats = SizeStats {
        ok: true,
        ..Default::default()
    };
    let mut stack: Vec<(PathBuf, usize)> = vec![(dir.to_path_buf(), 0)];

    while let Some((current, depth)) = stack.pop() {
        if depth > limits.max_depth {
            continue;
        }
        let Ok(entries) = fs::read_dir(&current) else {
            continue;
        };
        stats.dirs += 1;

        for entry in entries.flatten() {
            if stats.files >= limits.max_files {
                stats.partial = true;
                return stats;
            }
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                stack.push((entry.path(), depth + 1));
            } else if file_type.is_file() {
                if let Ok(metadata) = entry.metadata() {
                    stats.bytes += metadata.len();
                    stats.files += 1;
                }
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measures_nested_tree() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("a").join("b")).unwrap();
        fs::write(root.join("one"), vec![0u8; 10]).unwrap();
        fs::write(root.join("a").join("two"), vec![0u8; 20]).unwrap();
        fs::write(root.join("a").join("b").join("three"), vec![0u8; 30]).unwrap();

        let stats = measure_dir(root, SizeLimits::default());
        assert!(stats.ok);
        assert_eq!(stats.bytes, 60);
        assert_eq!(stats.files, 3);
        assert_eq!(stats.dirs, 3);
        assert!(!stats.partial);
    }

    #[test]
    fn test_missing_dir() {
        let stats = measure_dir(Path::new("/nonexistent/perch/size"), SizeLimits::default());
        assert!(!stats.ok);
        assert_eq!(stats.error.as_deref(), Some("missing-dir"));
    }

    #[test]
    fn test_file_limit_marks_partial() {
        let temp = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(temp.path().join(format!("f{}", i)), "x").unwrap();
        }

        let limits = SizeLimits {
            max_files: 3,
            max_depth: 64,
        };
        let stats = measure_dir(temp.path(), limits);
        assert!(stats.ok);
        assert!(stats.partial);
        assert_eq!(stats.files, 3);

        let exact = SizeLimits {
            max_files: 5,
            max_depth: 64,
        };
        assert!(!measure_dir(temp.path(), exact).partial);
    }

    #[test]
    fn test_depth_limit_skips_deep_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let deep = temp.path().join("1").join("2");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("hidden"), "xxxx").unwrap();
        fs::write(temp.path().join("1").join("seen"), "x").unwrap();

        let limits = SizeLimits {
            max_files: 100,
            max_depth: 1,
        };
        let stats = measure_dir(temp.path(), limits);
        assert_eq!(stats.files, 1);
        assert_eq!(stats.dirs, 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let temp = tempfile::tempdir().unwrap();
        let outside = temp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("big"), vec![0u8; 100]).unwrap();

        let root = temp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();
        std::os::unix::fs::symlink(outside.join("big"), root.join("file-link")).unwrap();

        let stats = measure_dir(&root, SizeLimits::default());
        assert_eq!(stats.bytes, 0);
        assert_eq!(stats.files, 0);
    }
}
