//! Profile discovery for Firefox, driven by `profiles.ini`, `installs.ini`
//! and the `Profiles/` folder.

use crate::ini::IniDocument;
use perch_core::paths::{is_sub_path, normalize, path_key};
use perch_core::profile::Profile;
use perch_core::resolver::EnvRoots;
use perch_core::rules::Platform;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// How far `find_base_dir` climbs looking for `profiles.ini`.
const MAX_BASE_DIR_DEPTH: usize = 6;

/// A profile as found in one source, before merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirefoxRecord {
    pub path: PathBuf,
    pub name: String,
    pub is_default: bool,
}

impl FirefoxRecord {
    fn folder_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// A name that is more than the folder's own name.
    fn has_real_name(&self) -> bool {
        !self.name.is_empty() && self.name != self.folder_name()
    }
}

pub struct FirefoxReader {
    base_dirs: Vec<PathBuf>,
}

impl FirefoxReader {
    /// Base directories are deduplicated case-insensitively, first wins.
    pub fn new(base_dirs: Vec<PathBuf>) -> Self {
        let mut seen = HashSet::new();
        let base_dirs = base_dirs
            .into_iter()
            .map(|dir| normalize(&dir))
            .filter(|dir| !dir.as_os_str().is_empty())
            .filter(|dir| seen.insert(path_key(dir)))
            .collect();
        Self { base_dirs }
    }

    pub fn base_dirs(&self) -> &[PathBuf] {
        &self.base_dirs
    }

    /// The `<base>/Profiles` folder that strictly contains `profile_dir`.
    ///
    /// Only these folders are valid roots for trashing or restoring; the
    /// base itself and anything else inside it are not.
    pub fn profiles_root(&self, profile_dir: &Path) -> Option<PathBuf> {
        self.base_dirs
            .iter()
            .map(|base| base.join("Profiles"))
            .find(|root| is_sub_path(root, profile_dir))
    }

    /// True if discovery reports `profile_dir` as a profile.
    pub fn is_known_profile(&self, profile_dir: &Path) -> bool {
        let key = path_key(profile_dir);
        self.discover()
            .iter()
            .any(|profile| path_key(Path::new(&profile.id)) == key)
    }

    pub fn discover(&self) -> Vec<Profile> {
        let mut records = Vec::new();
        let mut default_keys = HashSet::new();

        for base in &self.base_dirs {
            if !base.is_dir() {
                continue;
            }
            let ini_path = base.join("profiles.ini");
            let profiles_ini = fs::read_to_string(&ini_path)
                .ok()
                .map(|raw| IniDocument::parse(&raw));

            if let Some(doc) = &profiles_ini {
                records.extend(parse_profiles_ini(doc, base));
                default_keys.extend(default_paths(doc, base).iter().map(|p| path_key(p)));
            }
            if let Ok(raw) = fs::read_to_string(base.join("installs.ini")) {
                let doc = IniDocument::parse(&raw);
                default_keys.extend(default_paths(&doc, base).iter().map(|p| path_key(p)));
            }
            records.extend(scan_profiles_dir(base));
        }

        let profiles: Vec<Profile> = merge_records(records, &default_keys)
            .into_iter()
            .map(|record| Profile {
                id: record.path.display().to_string(),
                name: record.name,
                is_default: record.is_default,
                ..Default::default()
            })
            .collect();

        tracing::debug!("Found {} Firefox profiles", profiles.len());
        profiles
    }
}

/// Conventional Firefox data directories for this machine.
pub fn default_base_dirs(roots: &EnvRoots) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let home = roots.lookup("USERPROFILE").map(PathBuf::from);

    match Platform::current() {
        Platform::Linux | Platform::Other => {
            if let Some(home) = &home {
                dirs.push(home.join(".mozilla").join("firefox"));
            }
        }
        Platform::MacOs => {
            if let Some(home) = &home {
                dirs.push(
                    home.join("Library")
                        .join("Application Support")
                        .join("Firefox"),
                );
            }
        }
        Platform::Windows => {
            if let Some(roaming) = roots.lookup("APPDATA") {
                dirs.push(PathBuf::from(roaming).join("Mozilla").join("Firefox"));
            }
        }
    }

    if let Some(local) = roots.lookup("LOCALAPPDATA") {
        dirs.extend(store_package_dirs(Path::new(local)));
    }
    dirs
}

/// Firefox installed from the Microsoft Store keeps its data under
/// `Packages/Mozilla.Firefox*`.
fn store_package_dirs(local_app_data: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(local_app_data.join("Packages")) else {
        return Vec::new();
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .to_lowercase()
                .starts_with("mozilla.firefox")
        })
        .map(|entry| {
            entry
                .path()
                .join("LocalCache")
                .join("Roaming")
                .join("Mozilla")
                .join("Firefox")
        })
        .filter(|dir| dir.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// Resolve an INI `Path` value against the base directory.
fn resolve_entry_path(base: &Path, raw: &str, is_relative: bool) -> PathBuf {
    let raw = raw.trim();
    let candidate = Path::new(raw);
    if is_relative || !candidate.is_absolute() {
        normalize(&base.join(raw))
    } else {
        normalize(candidate)
    }
}

/// `[Profile*]` sections of a `profiles.ini`.
pub fn parse_profiles_ini(doc: &IniDocument, base: &Path) -> Vec<FirefoxRecord> {
    doc.sections()
        .into_iter()
        .filter(|section| section.name.to_lowercase().starts_with("profile"))
        .filter_map(|section| {
            let raw_path = section.get("Path").filter(|p| !p.trim().is_empty())?;
            let is_relative = section.get("IsRelative").unwrap_or("1") == "1";
            let path = resolve_entry_path(base, raw_path, is_relative);
            let name = section
                .get("Name")
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                });
            Some(FirefoxRecord {
                path,
                name,
                is_default: section.get("Default") == Some("1"),
            })
        })
        .collect()
}

/// `Default=` values of every section that carries one, except `[Profile*]`
/// where `Default=1` is a flag rather than a path.
fn default_paths(doc: &IniDocument, base: &Path) -> Vec<PathBuf> {
    doc.sections()
        .into_iter()
        .filter(|section| !section.name.to_lowercase().starts_with("profile"))
        .filter_map(|section| {
            let raw = section.get("Default")?.trim().to_string();
            if raw.is_empty() {
                return None;
            }
            Some(resolve_entry_path(base, &raw, !Path::new(&raw).is_absolute()))
        })
        .collect()
}

/// Profile folders under `<base>/Profiles` that look real.
fn scan_profiles_dir(base: &Path) -> Vec<FirefoxRecord> {
    let Ok(entries) = fs::read_dir(base.join("Profiles")) else {
        return Vec::new();
    };

    let mut records: Vec<FirefoxRecord> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|dir| dir.join("prefs.js").is_file() || dir.join("compatibility.ini").is_file())
        .map(|dir| {
            let path = normalize(&dir);
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            FirefoxRecord {
                path,
                name,
                is_default: false,
            }
        })
        .collect();
    records.sort_by(|a, b| a.path.cmp(&b.path));
    records
}

/// Collapse records pointing at the same folder and order them for display.
pub fn merge_records(records: Vec<FirefoxRecord>, default_keys: &HashSet<String>) -> Vec<FirefoxRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut unique: HashMap<String, FirefoxRecord> = HashMap::new();

    for record in records {
        let key = path_key(&record.path);
        match unique.get_mut(&key) {
            None => {
                order.push(key.clone());
                unique.insert(key, record);
            }
            Some(existing) => {
                if !existing.is_default && record.is_default {
                    *existing = record;
                } else if !existing.has_real_name() && record.has_real_name() {
                    existing.name = record.name;
                    existing.is_default |= record.is_default;
                }
            }
        }
    }

    let mut merged: Vec<FirefoxRecord> = order
        .into_iter()
        .filter_map(|key| {
            let mut record = unique.remove(&key)?;
            record.is_default |= default_keys.contains(&key);
            Some(record)
        })
        .collect();

    merged.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });
    merged
}

/// Walk up from a profile folder to the directory holding `profiles.ini`.
pub fn find_base_dir(profile_dir: &Path) -> Option<PathBuf> {
    let start = normalize(profile_dir);
    start
        .ancestors()
        .take(MAX_BASE_DIR_DEPTH + 1)
        .find(|dir| !dir.as_os_str().is_empty() && dir.join("profiles.ini").is_file())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, name: &str, is_default: bool) -> FirefoxRecord {
        FirefoxRecord {
            path: PathBuf::from(path),
            name: name.to_string(),
            is_default,
        }
    }

    #[test]
    fn test_merge_prefers_default_and_real_name() {
        let merged = merge_records(
            vec![
                record("/ff/Profiles/abc.default", "abc.default", false),
                record("/FF/profiles/ABC.default", "Work", true),
            ],
            &HashSet::new(),
        );

        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_default);
        assert_eq!(merged[0].name, "Work");
    }

    #[test]
    fn test_merge_real_name_overlays_folder_name() {
        let merged = merge_records(
            vec![
                record("/ff/Profiles/x.dev", "x.dev", true),
                record("/ff/Profiles/x.dev", "Dev", false),
            ],
            &HashSet::new(),
        );

        assert_eq!(merged[0].name, "Dev");
        assert!(merged[0].is_default);
    }

    #[test]
    fn test_merge_orders_defaults_then_names() {
        let defaults: HashSet<String> = [path_key(Path::new("/ff/p/zed"))].into_iter().collect();
        let merged = merge_records(
            vec![
                record("/ff/p/b", "beta", false),
                record("/ff/p/a", "Alpha", false),
                record("/ff/p/zed", "Zed", false),
            ],
            &defaults,
        );

        let names: Vec<_> = merged.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Zed", "Alpha", "beta"]);
        assert!(merged[0].is_default);
    }

    #[test]
    fn test_discover_merges_ini_installs_and_folders() {
        let temp = tempfile::tempdir().unwrap();
        let base = temp.path();
        let profiles = base.join("Profiles");
        for folder in ["abc.default-release", "old.default", "empty.folder"] {
            fs::create_dir_all(profiles.join(folder)).unwrap();
        }
        fs::write(profiles.join("abc.default-release").join("prefs.js"), "").unwrap();
        fs::write(profiles.join("old.default").join("compatibility.ini"), "").unwrap();

        fs::write(
            base.join("profiles.ini"),
            "[General]\nStartWithLastProfile=1\n\n[Profile0]\nName=Main\nIsRelative=1\nPath=Profiles/abc.default-release\n",
        )
        .unwrap();
        fs::write(
            base.join("installs.ini"),
            "[308046B0AF4A39CB]\nDefault=Profiles/abc.default-release\nLocked=1\n",
        )
        .unwrap();

        let reader = FirefoxReader::new(vec![base.to_path_buf(), base.to_path_buf()]);
        assert_eq!(reader.base_dirs().len(), 1);

        let found = reader.discover();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "Main");
        assert!(found[0].is_default);
        assert_eq!(
            PathBuf::from(&found[0].id),
            normalize(&profiles.join("abc.default-release"))
        );
        assert_eq!(found[1].name, "old.default");
        assert!(!found[1].is_default);
    }

    #[test]
    fn test_absolute_ini_path() {
        let doc = IniDocument::parse("[Profile3]\nName=Elsewhere\nIsRelative=0\nPath=/data/ff/else\nDefault=1\n");
        let records = parse_profiles_ini(&doc, Path::new("/home/u/.mozilla/firefox"));
        assert_eq!(records, vec![record("/data/ff/else", "Elsewhere", true)]);
    }

    #[test]
    fn test_find_base_dir_walks_up() {
        let temp = tempfile::tempdir().unwrap();
        let base = temp.path();
        fs::write(base.join("profiles.ini"), "").unwrap();
        let nested = base.join("Profiles").join("abc.default");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_base_dir(&nested), Some(normalize(base)));
    }

    #[test]
    fn test_profiles_root_only_contains_profile_folders() {
        let temp = tempfile::tempdir().unwrap();
        let base = temp.path().join("fox");
        fs::create_dir_all(base.join("Profiles").join("a.default")).unwrap();
        fs::create_dir_all(base.join("Crash Reports")).unwrap();
        let reader = FirefoxReader::new(vec![base.clone()]);
        let profiles = normalize(&base.join("Profiles"));

        assert_eq!(
            reader.profiles_root(&profiles.join("a.default")),
            Some(profiles.clone())
        );
        assert_eq!(reader.profiles_root(&profiles), None);
        assert_eq!(reader.profiles_root(&base.join("Crash Reports")), None);
        assert_eq!(reader.profiles_root(&base), None);
    }

    #[test]
    fn test_is_known_profile() {
        let temp = tempfile::tempdir().unwrap();
        let base = temp.path().join("fox");
        let profile = base.join("Profiles").join("a.default");
        fs::create_dir_all(&profile).unwrap();
        fs::write(profile.join("prefs.js"), "").unwrap();
        fs::create_dir_all(base.join("Profiles").join("stray")).unwrap();
        let reader = FirefoxReader::new(vec![base.clone()]);

        assert!(reader.is_known_profile(&profile));
        assert!(!reader.is_known_profile(&base.join("Profiles").join("stray")));
        assert!(!reader.is_known_profile(&base.join("Profiles")));
    }
}
