//! Profile discovery for Chromium-family browsers.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use perch_core::profile::{AvatarPreference, Profile};
use perch_core::rules::ProfileImageRule;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Names from `Local State` → `profile.info_cache.<dir>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CachedNames {
    name: Option<String>,
    user_name: Option<String>,
    gaia_name: Option<String>,
}

pub struct ChromiumReader<'a> {
    image_rule: &'a ProfileImageRule,
    preference: AvatarPreference,
}

impl<'a> ChromiumReader<'a> {
    pub fn new(image_rule: &'a ProfileImageRule, preference: AvatarPreference) -> Self {
        Self {
            image_rule,
            preference,
        }
    }

    /// List the profiles under a user data directory.
    pub fn discover(&self, user_data_dir: &Path) -> Vec<Profile> {
        let entries = match fs::read_dir(user_data_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(
                    "No user data directory at {}: {}",
                    user_data_dir.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut dir_names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| is_profile_dir_name(name))
            .filter(|name| user_data_dir.join(name).join("Preferences").is_file())
            .collect();
        dir_names.sort();

        let info_cache = read_info_cache(user_data_dir);
        let profiles: Vec<Profile> = dir_names
            .into_iter()
            .map(|dir_name| {
                let cached = info_cache.get(&dir_name);
                self.read_profile(user_data_dir, &dir_name, cached)
            })
            .collect();

        tracing::debug!(
            "Found {} profiles in {}",
            profiles.len(),
            user_data_dir.display()
        );
        profiles
    }

    fn read_profile(
        &self,
        user_data_dir: &Path,
        dir_name: &str,
        cached: Option<&CachedNames>,
    ) -> Profile {
        let prefs_path = user_data_dir.join(dir_name).join("Preferences");
        let prefs = match read_json(&prefs_path) {
            Some(prefs) => prefs,
            None => {
                tracing::warn!("Unreadable Preferences at {}", prefs_path.display());
                return Profile {
                    id: dir_name.to_string(),
                    name: dir_name.to_string(),
                    is_default: dir_name == "Default",
                    ..Default::default()
                };
            }
        };

        let profile_section = prefs.get("profile");
        let pref_name = profile_section
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty());
        let avatar_index = profile_section
            .and_then(|p| p.get("avatar_index"))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let name = cached
            .and_then(|c| c.name.as_deref())
            .or(pref_name)
            .unwrap_or(dir_name)
            .to_string();

        Profile {
            id: dir_name.to_string(),
            name,
            is_default: dir_name == "Default",
            avatar_data: self.find_avatar(user_data_dir, dir_name, avatar_index),
            user_name: cached.and_then(|c| c.user_name.clone()),
            gaia_name: cached.and_then(|c| c.gaia_name.clone()),
        }
    }

    /// Inline the first avatar image that exists, in preference order.
    fn find_avatar(&self, user_data_dir: &Path, dir_name: &str, avatar_index: i64) -> Option<String> {
        let profile_dir = user_data_dir.join(dir_name);
        let pictures = self
            .image_rule
            .picture_files
            .iter()
            .map(|f| profile_dir.join(f));
        let icons = self.image_rule.icon_files.iter().map(|f| profile_dir.join(f));

        let mut candidates: Vec<PathBuf> = match self.preference {
            AvatarPreference::Picture => pictures.chain(icons).collect(),
            AvatarPreference::Icon => icons.chain(pictures).collect(),
        };
        candidates.extend(self.indexed_avatar(user_data_dir, avatar_index));

        candidates
            .iter()
            .filter(|path| path.is_file())
            .find_map(|path| data_uri(path))
    }

    /// Pick `|avatar_index| mod count` from the shared avatars directory.
    fn indexed_avatar(&self, user_data_dir: &Path, avatar_index: i64) -> Option<PathBuf> {
        if self.image_rule.avatars_dir.trim().is_empty() {
            return None;
        }
        let avatars_dir = user_data_dir.join(&self.image_rule.avatars_dir);
        let extensions: Vec<String> = self
            .image_rule
            .avatars_extensions
            .iter()
            .map(|ext| ext.to_lowercase())
            .collect();

        let mut files: Vec<String> = fs::read_dir(&avatars_dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| {
                let lower = name.to_lowercase();
                extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
            })
            .collect();
        if files.is_empty() {
            return None;
        }
        files.sort();

        let index = (avatar_index.unsigned_abs() % files.len() as u64) as usize;
        Some(avatars_dir.join(&files[index]))
    }
}

fn is_profile_dir_name(name: &str) -> bool {
    name == "Default" || name.starts_with("Profile ")
}

fn read_json(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn read_info_cache(user_data_dir: &Path) -> HashMap<String, CachedNames> {
    let Some(local_state) = read_json(&user_data_dir.join("Local State")) else {
        return HashMap::new();
    };
    let Some(cache) = local_state
        .get("profile")
        .and_then(|p| p.get("info_cache"))
        .and_then(Value::as_object)
    else {
        return HashMap::new();
    };

    let text = |entry: &Value, key: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    cache
        .iter()
        .map(|(dir, entry)| {
            let user_name = text(entry, "user_name");
            let gaia_name = text(entry, "gaia_name");
            let name = text(entry, "name")
                .or_else(|| text(entry, "shortcut_name"))
                .or_else(|| user_name.clone())
                .or_else(|| gaia_name.clone());
            (
                dir.clone(),
                CachedNames {
                    name,
                    user_name,
                    gaia_name,
                },
            )
        })
        .collect()
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "ico" => "image/x-icon",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

fn data_uri(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    Some(format!(
        "data:{};base64,{}",
        mime_for(path),
        STANDARD.encode(bytes)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_profile(root: &Path, dir: &str, prefs: &str) {
        let profile = root.join(dir);
        fs::create_dir_all(&profile).unwrap();
        fs::write(profile.join("Preferences"), prefs).unwrap();
    }

    #[test]
    fn test_discovers_profile_dirs_with_preferences() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write_profile(root, "Default", r#"{"profile": {"name": "Personal"}}"#);
        write_profile(root, "Profile 2", r#"{"profile": {"name": "Side"}}"#);
        write_profile(root, "System Profile", r#"{}"#);
        fs::create_dir_all(root.join("Profile 3")).unwrap();

        let rule = ProfileImageRule::default();
        let profiles = ChromiumReader::new(&rule, AvatarPreference::Picture).discover(root);

        let ids: Vec<_> = profiles.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["Default", "Profile 2"]);
        assert!(profiles[0].is_default);
        assert_eq!(profiles[0].name, "Personal");
        assert!(!profiles[1].is_default);
    }

    #[test]
    fn test_info_cache_name_overrides_preferences() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write_profile(root, "Profile 1", r#"{"profile": {"name": "Person 1"}}"#);
        fs::write(
            root.join("Local State"),
            r#"{"profile": {"info_cache": {"Profile 1": {"name": "Work", "user_name": "me@example.com"}}}}"#,
        )
        .unwrap();

        let rule = ProfileImageRule::default();
        let profiles = ChromiumReader::new(&rule, AvatarPreference::Picture).discover(root);

        assert_eq!(profiles[0].name, "Work");
        assert_eq!(profiles[0].user_name.as_deref(), Some("me@example.com"));
        assert_eq!(profiles[0].gaia_name, None);
    }

    #[test]
    fn test_corrupt_preferences_degrade_to_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write_profile(root, "Default", "{broken");
        write_profile(root, "Profile 1", r#"{"profile": {"name": "Fine"}}"#);

        let rule = ProfileImageRule::default();
        let profiles = ChromiumReader::new(&rule, AvatarPreference::Picture).discover(root);

        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].name, "Default");
        assert_eq!(profiles[0].avatar_data, None);
        assert_eq!(profiles[1].name, "Fine");
    }

    #[test]
    fn test_missing_user_data_dir_is_empty() {
        let rule = ProfileImageRule::default();
        let reader = ChromiumReader::new(&rule, AvatarPreference::Picture);
        assert!(reader.discover(Path::new("/nonexistent/perch/udd")).is_empty());
    }

    #[test]
    fn test_avatar_preference_order() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write_profile(root, "Default", r#"{}"#);
        fs::write(root.join("Default").join("Profile Picture.png"), b"png").unwrap();
        fs::write(root.join("Default").join("Profile Picture.ico"), b"ico").unwrap();

        let rule = ProfileImageRule::default();
        let picture = ChromiumReader::new(&rule, AvatarPreference::Picture).discover(root);
        let icon = ChromiumReader::new(&rule, AvatarPreference::Icon).discover(root);

        assert_eq!(
            picture[0].avatar_data.as_deref(),
            Some("data:image/png;base64,cG5n")
        );
        assert_eq!(
            icon[0].avatar_data.as_deref(),
            Some("data:image/x-icon;base64,aWNv")
        );
    }

    #[test]
    fn test_avatar_index_wraps_over_sorted_avatars() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write_profile(root, "Default", r#"{"profile": {"avatar_index": -3}}"#);
        let avatars = root.join("Avatars");
        fs::create_dir_all(&avatars).unwrap();
        fs::write(avatars.join("b.PNG"), b"b").unwrap();
        fs::write(avatars.join("a.png"), b"a").unwrap();
        fs::write(avatars.join("c.txt"), b"c").unwrap();

        let rule = ProfileImageRule::default();
        let profiles = ChromiumReader::new(&rule, AvatarPreference::Picture).discover(root);

        // sorted: a.png, b.PNG; |-3| mod 2 = 1
        assert_eq!(
            profiles[0].avatar_data.as_deref(),
            Some("data:image/png;base64,Yg==")
        );
    }
}
