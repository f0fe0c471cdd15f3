//! The long-lived service object that ties rules, discovery, lifecycle and
//! sizing together. Construct one per process and pass it by reference.

use crate::bookmarks::{BookmarkList, read_chromium_bookmarks};
use crate::chromium::ChromiumReader;
use crate::firefox::{self, FirefoxReader};
use crate::launcher::BrowserLauncher;
use crate::lifecycle::{CopyOptions, ProfileLifecycle, TrashRecord};
use crate::locator::ExecutableLocator;
use crate::size_cache::{SizeReport, SizeService};
use crate::size_worker::{SizeBackend, SizeWorker};
use crate::undo::UndoItem;
use crate::{Error, Result};
use perch_core::config::{AppConfig, BrowserState};
use perch_core::paths::normalize;
use perch_core::profile::{AvatarPreference, Profile};
use perch_core::resolver::PathResolver;
use perch_core::rules::{BrowserKind, BrowserRule, EffectiveRules, RuleDefinition, RuleRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// How many profiles a rule dry run lists.
const RULE_PREVIEW_LIMIT: usize = 30;

/// A profile addressed by browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRef {
    pub browser_id: String,
    pub profile_id: String,
}

impl ProfileRef {
    pub fn new(browser_id: &str, profile_id: &str) -> Self {
        Self {
            browser_id: browser_id.to_string(),
            profile_id: profile_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedItem {
    pub browser_id: String,
    pub profile_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    /// True if any item succeeded.
    pub ok: bool,
    pub deleted: Vec<DeletedItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredItem {
    pub browser_id: String,
    pub profile_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Where the data still sits when the restore failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub ok: bool,
    pub restored: Vec<RestoredItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateOutcome {
    pub profile_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePreview {
    pub id: String,
    pub name: String,
    pub has_avatar: bool,
}

/// What a custom rule would find on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleValidation {
    pub can_launch: bool,
    pub executable_path: Option<PathBuf>,
    pub profile_count: usize,
    pub avatar_detected: bool,
    pub profiles: Vec<RulePreview>,
}

pub struct Engine {
    registry: RuleRegistry,
    resolver: PathResolver,
    lifecycle: ProfileLifecycle,
    sizes: SizeService,
}

impl Engine {
    /// An engine over the built-in rules with the default size worker.
    pub fn new(resolver: PathResolver, trash_root: PathBuf) -> Result<Self> {
        Ok(Self {
            registry: RuleRegistry::builtin()?,
            resolver,
            lifecycle: ProfileLifecycle::new(trash_root),
            sizes: SizeService::new(Arc::new(SizeWorker::new())),
        })
    }

    pub fn with_registry(mut self, registry: RuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_undo_ttl(mut self, ttl: Duration) -> Self {
        let trash_root = self.lifecycle.trash_root().to_path_buf();
        self.lifecycle = ProfileLifecycle::with_undo_ttl(trash_root, ttl);
        self
    }

    pub fn with_size_backend(mut self, backend: Arc<dyn SizeBackend>) -> Self {
        self.sizes = SizeService::new(backend);
        self
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn lifecycle(&self) -> &ProfileLifecycle {
        &self.lifecycle
    }

    /// Built-in rules with the config's custom rules layered on top.
    pub fn rules(&self, config: &AppConfig) -> EffectiveRules {
        self.registry.effective_rules(&config.custom_browsers)
    }

    pub fn locate_executable(
        &self,
        browser_id: &str,
        override_path: Option<&Path>,
        rules: &EffectiveRules,
    ) -> Option<PathBuf> {
        ExecutableLocator::new(&self.resolver).locate(rules.get(browser_id), override_path)
    }

    /// The first existing user data directory of a rule, else the first one
    /// that resolves.
    pub fn user_data_dir(&self, rule: &BrowserRule) -> Option<PathBuf> {
        let resolved: Vec<PathBuf> = rule
            .user_data_dir
            .current()
            .iter()
            .filter_map(|template| self.resolver.resolve(template))
            .collect();
        resolved
            .iter()
            .find(|dir| dir.is_dir())
            .or_else(|| resolved.first())
            .cloned()
    }

    /// Rule templates first, then the conventional Firefox locations.
    pub fn firefox_base_dirs(&self, rule: &BrowserRule) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = rule
            .user_data_dir
            .current()
            .iter()
            .filter_map(|template| self.resolver.resolve(template))
            .collect();
        dirs.extend(firefox::default_base_dirs(self.resolver.roots()));
        dirs
    }

    pub fn discover_profiles(
        &self,
        browser_id: &str,
        preference: AvatarPreference,
        rules: &EffectiveRules,
    ) -> Vec<Profile> {
        let Some(rule) = rules.get(browser_id) else {
            return Vec::new();
        };
        match rule.profile_image() {
            None => FirefoxReader::new(self.firefox_base_dirs(rule)).discover(),
            Some(image_rule) => match self.user_data_dir(rule) {
                Some(dir) => ChromiumReader::new(image_rule, preference).discover(&dir),
                None => Vec::new(),
            },
        }
    }

    /// The folder holding a profile's data. With an empty profile id this
    /// is the browser's user data directory (Chromium) or first Firefox base
    /// directory.
    pub fn resolve_profile_folder(
        &self,
        browser_id: &str,
        profile_id: &str,
        rules: &EffectiveRules,
    ) -> Option<PathBuf> {
        let rule = rules.get(browser_id)?;
        let profile_id = profile_id.trim();
        match rule.kind() {
            BrowserKind::Firefox => {
                if profile_id.is_empty() {
                    self.firefox_base_dirs(rule).into_iter().next()
                } else {
                    Some(normalize(Path::new(profile_id)))
                }
            }
            BrowserKind::Chromium => {
                let base = self.user_data_dir(rule)?;
                if profile_id.is_empty() {
                    Some(base)
                } else {
                    Some(normalize(&base.join(profile_id)))
                }
            }
        }
    }

    /// Recompute every browser's state from disk.
    pub fn scan(&self, current: &AppConfig) -> AppConfig {
        let mut next = current.clone();
        let rules = self.rules(&next);
        let preference = AvatarPreference::parse_lossy(&next.avatar_preference);
        next.avatar_preference = preference.as_str().to_string();

        for browser_id in rules.ids() {
            let Some(rule) = rules.get(&browser_id) else {
                continue;
            };
            let is_firefox = rule.kind() == BrowserKind::Firefox;
            let existing = next.browsers.get(&browser_id).cloned().unwrap_or_default();

            let system_path = self.locate_executable(&browser_id, None, &rules);
            let path = match &system_path {
                Some(path) => path.display().to_string(),
                None if !existing.path.is_empty() && Path::new(&existing.path).exists() => {
                    existing.path.clone()
                }
                None => String::new(),
            };

            let found = self.discover_profiles(&browser_id, preference, &rules);
            let excluded = &existing.excluded_profiles;
            let profiles: Vec<Profile> = found
                .iter()
                .filter(|p| {
                    !excluded.contains(&p.id) && !(is_firefox && excluded.contains(&p.name))
                })
                .cloned()
                .collect();

            let mut last_profile_id = existing.last_profile_id.clone();
            if is_firefox {
                last_profile_id = repair_firefox_id(&last_profile_id, &found);
            }
            if excluded.contains(&last_profile_id)
                || (is_firefox && excluded.contains(&existing.last_profile_id))
            {
                last_profile_id.clear();
            }

            let display_name = match rule.name.trim() {
                "" => existing.display_name.clone(),
                name => name.to_string(),
            };

            let state = BrowserState {
                enabled: next.system_enabled(&browser_id),
                detected: system_path.is_some(),
                path,
                profiles,
                excluded_profiles: existing.excluded_profiles.clone(),
                last_profile_id,
                display_name,
                extra: existing.extra.clone(),
            };
            tracing::debug!(
                "{}: detected={} profiles={}",
                browser_id,
                state.detected,
                state.profiles.len()
            );
            next.browsers.insert(browser_id, state);
        }

        let selection = next.last_selection.clone();
        if let Some(state) = next.browsers.get(&selection.browser_id) {
            let is_firefox = rules
                .get(&selection.browser_id)
                .map(|rule| rule.kind() == BrowserKind::Firefox)
                .unwrap_or(false);
            let mut profile_id = selection.profile_id.clone();
            if is_firefox {
                profile_id = repair_firefox_id(&profile_id, &state.profiles);
            }
            if state.is_excluded(&profile_id) {
                profile_id.clear();
            }
            next.last_selection.profile_id = profile_id;
        }

        tracing::info!("Scanned {} browsers", next.browsers.len());
        next
    }

    pub fn duplicate_profile(
        &self,
        config: &mut AppConfig,
        browser_id: &str,
        profile_id: &str,
        name: &str,
        options: &CopyOptions,
    ) -> Result<DuplicateOutcome> {
        let rules = self.rules(config);
        let rule = rules
            .get(browser_id)
            .ok_or_else(|| Error::UnknownBrowser(browser_id.to_string()))?;

        let outcome = match rule.kind() {
            BrowserKind::Firefox => {
                let copy = self.lifecycle.duplicate_firefox(Path::new(profile_id), name)?;
                DuplicateOutcome {
                    profile_id: copy.profile_dir.display().to_string(),
                    name: Some(copy.name),
                }
            }
            BrowserKind::Chromium => {
                let user_data_dir = self.user_data_dir(rule).ok_or(Error::MissingUserDataDir)?;
                let new_id =
                    self.lifecycle
                        .duplicate_chromium(&user_data_dir, profile_id, name, options)?;
                DuplicateOutcome {
                    profile_id: new_id,
                    name: Some(name.trim().to_string()).filter(|n| !n.is_empty()),
                }
            }
        };

        *config = self.scan(config);
        Ok(outcome)
    }

    pub fn rename_profile(
        &self,
        config: &mut AppConfig,
        browser_id: &str,
        profile_id: &str,
        name: &str,
    ) -> Result<()> {
        let rules = self.rules(config);
        let rule = rules
            .get(browser_id)
            .ok_or_else(|| Error::UnknownBrowser(browser_id.to_string()))?;

        match rule.kind() {
            BrowserKind::Firefox => self.lifecycle.rename_firefox(Path::new(profile_id), name)?,
            BrowserKind::Chromium => {
                let user_data_dir = self.user_data_dir(rule).ok_or(Error::MissingUserDataDir)?;
                self.lifecycle.rename_chromium(&user_data_dir, profile_id, name)?;
            }
        }

        *config = self.scan(config);
        Ok(())
    }

    /// Move profiles to the trash, hide them, and hold the batch for undo.
    pub fn delete_profiles(&self, config: &mut AppConfig, items: &[ProfileRef]) -> DeleteReport {
        let rules = self.rules(config);
        let mut deleted = Vec::new();

        for item in items {
            if item.browser_id.is_empty() || item.profile_id.is_empty() {
                continue;
            }
            let outcome = self.trash_one(&rules, item);
            let (ok, error, record) = match outcome {
                Ok(record) => (true, None, record),
                Err(e) => {
                    tracing::warn!("Delete of {}/{} failed: {}", item.browser_id, item.profile_id, e);
                    (false, Some(e.code().to_string()), None)
                }
            };
            deleted.push(DeletedItem {
                browser_id: item.browser_id.clone(),
                profile_id: item.profile_id.clone(),
                ok,
                error,
                original_path: record.as_ref().map(|r| r.original_path.clone()),
                trashed_path: record.map(|r| r.trashed_path),
            });
        }

        for row in deleted.iter().filter(|row| row.ok) {
            hide(config, &row.browser_id, &row.profile_id);
        }
        *config = self.scan(config);

        let undo_items: Vec<UndoItem> = deleted
            .iter()
            .filter(|row| row.ok)
            .filter_map(|row| {
                Some(UndoItem {
                    browser_id: row.browser_id.clone(),
                    profile_id: row.profile_id.clone(),
                    original_path: row.original_path.clone()?,
                    trashed_path: row.trashed_path.clone()?,
                })
            })
            .collect();
        let undo_token = self.lifecycle.register_undo(undo_items);

        DeleteReport {
            ok: deleted.iter().any(|row| row.ok),
            deleted,
            undo_token,
        }
    }

    fn trash_one(&self, rules: &EffectiveRules, item: &ProfileRef) -> Result<Option<TrashRecord>> {
        let rule = rules
            .get(&item.browser_id)
            .ok_or_else(|| Error::UnknownBrowser(item.browser_id.clone()))?;
        let (root, target) = match rule.kind() {
            BrowserKind::Firefox => {
                let target = normalize(Path::new(&item.profile_id));
                let reader = FirefoxReader::new(self.firefox_base_dirs(rule));
                let root = reader
                    .profiles_root(&target)
                    .ok_or_else(|| Error::InvalidTarget(target.clone()))?;
                // Anything still on disk must be a profile discovery knows about.
                if target.symlink_metadata().is_ok() && !reader.is_known_profile(&target) {
                    return Err(Error::InvalidTarget(target));
                }
                (root, target)
            }
            BrowserKind::Chromium => {
                let root = self.user_data_dir(rule).ok_or(Error::MissingUserDataDir)?;
                let target = root.join(&item.profile_id);
                (root, target)
            }
        };
        self.lifecycle.trash(&root, &target)
    }

    /// Put back a deleted batch. The token works once.
    pub fn undo_delete(&self, config: &mut AppConfig, token: &str) -> Result<RestoreReport> {
        let items = self
            .lifecycle
            .undo()
            .consume(token)
            .ok_or(Error::MissingUndo)?;
        let rules = self.rules(config);
        let mut restored = Vec::new();

        for item in items {
            let root = rules.get(&item.browser_id).and_then(|rule| match rule.kind() {
                BrowserKind::Firefox => FirefoxReader::new(self.firefox_base_dirs(rule))
                    .profiles_root(&item.original_path),
                BrowserKind::Chromium => self.user_data_dir(rule),
            });
            let outcome = match root {
                Some(root) => {
                    self.lifecycle
                        .restore(&root, &item.original_path, &item.trashed_path)
                }
                None => Err(Error::UnknownBrowser(item.browser_id.clone())),
            };
            let (ok, error) = match outcome {
                Ok(()) => (true, None),
                Err(e) => {
                    tracing::warn!("Restore of {} failed: {}", item.original_path.display(), e);
                    (false, Some(e.code().to_string()))
                }
            };
            restored.push(RestoredItem {
                browser_id: item.browser_id,
                profile_id: item.profile_id,
                ok,
                error,
                trashed_path: if ok { None } else { Some(item.trashed_path) },
            });
        }

        for row in restored.iter().filter(|row| row.ok) {
            if let Some(state) = config.browsers.get_mut(&row.browser_id) {
                state.include(&row.profile_id);
            }
        }
        *config = self.scan(config);

        Ok(RestoreReport {
            ok: restored.iter().any(|row| row.ok),
            restored,
        })
    }

    /// Give up on an undo batch and delete its trashed data now.
    pub fn discard_undo(&self, token: &str) -> bool {
        self.lifecycle.undo().purge(token)
    }

    /// Exclude profiles from listings without touching their data.
    pub fn hide_profiles(&self, config: &mut AppConfig, items: &[ProfileRef]) {
        for item in items {
            if item.browser_id.is_empty() || item.profile_id.is_empty() {
                continue;
            }
            hide(config, &item.browser_id, &item.profile_id);
        }
        *config = self.scan(config);
    }

    /// Profile size, from the cache when the folder is unchanged.
    pub async fn measure_size(
        &self,
        config: &mut AppConfig,
        browser_id: &str,
        profile_id: &str,
    ) -> SizeReport {
        if browser_id.trim().is_empty() || profile_id.trim().is_empty() {
            return SizeReport::failed("missing-input");
        }
        let rules = self.rules(config);
        let Some(dir) = self.resolve_profile_folder(browser_id, profile_id, &rules) else {
            return SizeReport::failed("missing-profile-dir");
        };
        self.sizes.measure(config, browser_id, profile_id, &dir).await
    }

    /// Try a custom rule against this machine without saving it.
    pub fn validate_rule(&self, config: &AppConfig, custom: RuleDefinition) -> Result<RuleValidation> {
        let custom = trimmed_definition(custom);
        let probe = BrowserRule::try_from(custom.clone())?;

        let mut candidate = config.clone();
        candidate.custom_browsers.retain(|def| def.id.trim() != probe.id);
        candidate.custom_browsers.push(custom);
        let rules = self.rules(&candidate);

        let preference = AvatarPreference::parse_lossy(&config.avatar_preference);
        let executable_path = self.locate_executable(&probe.id, None, &rules);
        let profiles = self.discover_profiles(&probe.id, preference, &rules);

        Ok(RuleValidation {
            can_launch: executable_path.is_some(),
            executable_path,
            profile_count: profiles.len(),
            avatar_detected: profiles.iter().any(|p| p.avatar_data.is_some()),
            profiles: profiles
                .into_iter()
                .take(RULE_PREVIEW_LIMIT)
                .map(|p| RulePreview {
                    has_avatar: p.avatar_data.is_some(),
                    id: p.id,
                    name: p.name,
                })
                .collect(),
        })
    }

    /// Work out the command line for opening `target` in a profile.
    pub fn prepare_launch(
        &self,
        config: &AppConfig,
        browser_id: &str,
        profile_id: Option<&str>,
        target: &str,
    ) -> Result<BrowserLauncher> {
        let rules = self.rules(config);
        let rule = rules
            .get(browser_id)
            .ok_or_else(|| Error::UnknownBrowser(browser_id.to_string()))?;
        let stored = config
            .browsers
            .get(browser_id)
            .map(|state| PathBuf::from(&state.path))
            .filter(|path| !path.as_os_str().is_empty());
        let executable = self
            .locate_executable(browser_id, stored.as_deref(), &rules)
            .ok_or_else(|| Error::Launch(format!("no executable found for {}", browser_id)))?;

        Ok(BrowserLauncher::new(executable, &rule.launch, profile_id, target))
    }

    /// Open `target` in a browser profile. Returns the child's process id.
    pub fn open_in_browser(
        &self,
        config: &AppConfig,
        browser_id: &str,
        profile_id: Option<&str>,
        target: &str,
    ) -> Result<u32> {
        let launcher = self.prepare_launch(config, browser_id, profile_id, target)?;
        let child = launcher.launch()?;
        Ok(child.id())
    }

    pub fn read_bookmarks(
        &self,
        config: &AppConfig,
        browser_id: &str,
        profile_id: &str,
        limit: usize,
    ) -> Result<BookmarkList> {
        let rules = self.rules(config);
        let rule = rules
            .get(browser_id)
            .ok_or_else(|| Error::UnknownBrowser(browser_id.to_string()))?;
        if rule.kind() == BrowserKind::Firefox {
            return Err(Error::Unsupported(rule.kind().as_str().to_string()));
        }
        let user_data_dir = self.user_data_dir(rule).ok_or(Error::MissingUserDataDir)?;
        read_chromium_bookmarks(&user_data_dir, profile_id, limit)
    }
}

/// Firefox selections may have been stored by name; map a name that is not
/// an existing path back to the matching profile's path.
fn repair_firefox_id(stored: &str, profiles: &[Profile]) -> String {
    if stored.is_empty() || Path::new(stored).exists() {
        return stored.to_string();
    }
    profiles
        .iter()
        .find(|p| p.name == stored)
        .map(|p| p.id.clone())
        .unwrap_or_else(|| stored.to_string())
}

fn hide(config: &mut AppConfig, browser_id: &str, profile_id: &str) {
    config
        .browsers
        .entry(browser_id.to_string())
        .or_default()
        .exclude(profile_id);
    if config.last_selection.browser_id == browser_id && config.last_selection.profile_id == profile_id {
        config.last_selection.profile_id.clear();
    }
}

fn trimmed_definition(mut def: RuleDefinition) -> RuleDefinition {
    def.id = def.id.trim().to_string();
    def.name = def.name.map(|n| n.trim().to_string());
    for paths in [def.exe_candidates.as_mut(), def.user_data_dir.as_mut()]
        .into_iter()
        .flatten()
    {
        for list in [&mut paths.win32, &mut paths.darwin, &mut paths.linux] {
            list.iter_mut().for_each(|p| *p = p.trim().to_string());
            list.retain(|p| !p.is_empty());
        }
    }
    def
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size::{SizeLimits, SizeStats};
    use async_trait::async_trait;
    use perch_core::resolver::EnvRoots;
    use perch_core::rules::PlatformPaths;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RULES: &str = r#"{"browsers": [
        {"id": "test", "type": "chromium", "name": "Test Browser",
         "userDataDir": {"win32": ["${USERPROFILE}/udd"], "darwin": ["${USERPROFILE}/udd"], "linux": ["${USERPROFILE}/udd"]},
         "launch": {"profileArg": "--profile-directory={profileId}"}},
        {"id": "fox", "type": "firefox", "name": "Fox",
         "userDataDir": {"win32": ["${USERPROFILE}/fox"], "darwin": ["${USERPROFILE}/fox"], "linux": ["${USERPROFILE}/fox"]},
         "launch": {"profileArgName": ["-P", "{profileId}"], "profileArgPath": ["-profile", "{profileId}"]}}
    ]}"#;

    fn engine(home: &Path) -> Engine {
        let resolver = PathResolver::new(EnvRoots {
            user_profile: Some(home.display().to_string()),
            ..Default::default()
        });
        Engine::new(resolver, home.join("TrashProfiles"))
            .unwrap()
            .with_registry(RuleRegistry::from_json(RULES).unwrap())
    }

    fn chromium_profile(home: &Path, dir: &str, name: &str) -> PathBuf {
        let profile = home.join("udd").join(dir);
        fs::create_dir_all(&profile).unwrap();
        fs::write(
            profile.join("Preferences"),
            format!(r#"{{"profile": {{"name": "{}"}}}}"#, name),
        )
        .unwrap();
        profile
    }

    fn firefox_profile(home: &Path) -> PathBuf {
        let base = home.join("fox");
        let profile = base.join("Profiles").join("abc.default");
        fs::create_dir_all(&profile).unwrap();
        fs::write(profile.join("prefs.js"), "").unwrap();
        fs::write(
            base.join("profiles.ini"),
            "[Profile0]\nName=Main\nIsRelative=1\nPath=Profiles/abc.default\nDefault=1\n",
        )
        .unwrap();
        normalize(&profile)
    }

    #[test]
    fn test_scan_discovers_and_filters_profiles() {
        let temp = tempfile::tempdir().unwrap();
        let home = temp.path();
        chromium_profile(home, "Default", "Personal");
        chromium_profile(home, "Profile 1", "Work");
        firefox_profile(home);

        let mut config = AppConfig::default();
        config.browsers.insert(
            "test".to_string(),
            BrowserState {
                excluded_profiles: vec!["Profile 1".to_string()],
                last_profile_id: "Profile 1".to_string(),
                ..Default::default()
            },
        );
        config.last_selection.browser_id = "fox".to_string();
        config.last_selection.profile_id = "Main".to_string();

        let scanned = engine(home).scan(&config);

        let test = &scanned.browsers["test"];
        assert_eq!(test.display_name, "Test Browser");
        assert!(!test.detected);
        assert_eq!(test.profiles.len(), 1);
        assert_eq!(test.profiles[0].name, "Personal");
        assert!(test.last_profile_id.is_empty());

        let fox = &scanned.browsers["fox"];
        assert_eq!(fox.profiles.len(), 1);
        assert_eq!(fox.profiles[0].name, "Main");
        assert_eq!(scanned.last_selection.profile_id, fox.profiles[0].id);
        assert_eq!(scanned.avatar_preference, "picture");
    }

    #[test]
    fn test_scan_excludes_firefox_by_name() {
        let temp = tempfile::tempdir().unwrap();
        let home = temp.path();
        firefox_profile(home);

        let mut config = AppConfig::default();
        config.browsers.insert(
            "fox".to_string(),
            BrowserState {
                excluded_profiles: vec!["Main".to_string()],
                ..Default::default()
            },
        );

        let scanned = engine(home).scan(&config);
        assert!(scanned.browsers["fox"].profiles.is_empty());
    }

    #[test]
    fn test_delete_then_undo_restores_bytes() {
        let temp = tempfile::tempdir().unwrap();
        let home = temp.path();
        let profile = chromium_profile(home, "Profile 1", "Work");
        fs::write(profile.join("History"), vec![7u8; 64]).unwrap();
        let before = fs::read(profile.join("History")).unwrap();

        let engine = engine(home);
        let mut config = engine.scan(&AppConfig::default());

        let report = engine.delete_profiles(&mut config, &[ProfileRef::new("test", "Profile 1")]);
        assert!(report.ok);
        assert!(!profile.exists());
        assert!(config.browsers["test"].is_excluded("Profile 1"));
        assert!(config.browsers["test"].profiles.is_empty());
        let token = report.undo_token.unwrap();

        let restored = engine.undo_delete(&mut config, &token).unwrap();
        assert!(restored.ok);
        assert_eq!(fs::read(profile.join("History")).unwrap(), before);
        assert!(!config.browsers["test"].is_excluded("Profile 1"));
        assert_eq!(config.browsers["test"].profiles.len(), 1);

        let err = engine.undo_delete(&mut config, &token).unwrap_err();
        assert_eq!(err.code(), "missing-undo");
    }

    #[test]
    fn test_delete_reports_each_item() {
        let temp = tempfile::tempdir().unwrap();
        let home = temp.path();
        chromium_profile(home, "Profile 1", "Work");

        let engine = engine(home);
        let mut config = engine.scan(&AppConfig::default());
        let report = engine.delete_profiles(
            &mut config,
            &[
                ProfileRef::new("test", "../../escape"),
                ProfileRef::new("test", "Profile 1"),
                ProfileRef::new("nope", "Default"),
            ],
        );

        assert!(report.ok);
        assert_eq!(report.deleted.len(), 3);
        assert_eq!(report.deleted[0].error.as_deref(), Some("invalid-target"));
        assert!(report.deleted[1].ok);
        assert_eq!(report.deleted[2].error.as_deref(), Some("unknown-browser"));
        assert!(report.undo_token.is_some());
    }

    #[test]
    fn test_firefox_delete_and_undo() {
        let temp = tempfile::tempdir().unwrap();
        let home = temp.path();
        let profile = firefox_profile(home);
        let engine = engine(home);
        let mut config = engine.scan(&AppConfig::default());
        let id = profile.display().to_string();

        let report = engine.delete_profiles(&mut config, &[ProfileRef::new("fox", &id)]);
        assert!(report.ok);
        assert!(!profile.exists());

        let restored = engine
            .undo_delete(&mut config, report.undo_token.as_deref().unwrap())
            .unwrap();
        assert!(restored.ok);
        assert!(profile.join("prefs.js").is_file());
        assert_eq!(config.browsers["fox"].profiles.len(), 1);
    }

    #[test]
    fn test_firefox_delete_refuses_non_profile_folders() {
        let temp = tempfile::tempdir().unwrap();
        let home = temp.path();
        let profile = firefox_profile(home);
        let base = normalize(&home.join("fox"));
        let work = base.join("Profiles").join("b.work");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("prefs.js"), "").unwrap();
        let crash_reports = base.join("Crash Reports");
        fs::create_dir_all(&crash_reports).unwrap();
        let stray = base.join("Profiles").join("stray");
        fs::create_dir_all(&stray).unwrap();
        let engine = engine(home);
        let mut config = engine.scan(&AppConfig::default());

        let targets = [base.join("Profiles"), crash_reports.clone(), stray.clone(), base.clone()];
        for target in &targets {
            let id = target.display().to_string();
            let report = engine.delete_profiles(&mut config, &[ProfileRef::new("fox", &id)]);
            assert!(!report.ok, "{} was trashed", id);
            assert_eq!(report.deleted[0].error.as_deref(), Some("invalid-target"));
            assert!(report.undo_token.is_none());
        }

        assert!(profile.join("prefs.js").is_file());
        assert!(work.join("prefs.js").is_file());
        assert!(crash_reports.is_dir());
        assert!(stray.is_dir());
        let trashed = fs::read_dir(home.join("TrashProfiles"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(trashed, 0);
    }

    #[test]
    fn test_duplicate_and_rename_rescan() {
        let temp = tempfile::tempdir().unwrap();
        let home = temp.path();
        chromium_profile(home, "Default", "Personal");
        let engine = engine(home);
        let mut config = AppConfig::default();

        let outcome = engine
            .duplicate_profile(&mut config, "test", "Default", "Copy", &CopyOptions::default())
            .unwrap();
        assert_eq!(outcome.profile_id, "Profile 1");
        assert_eq!(config.browsers["test"].profiles.len(), 2);

        engine
            .rename_profile(&mut config, "test", "Profile 1", "Renamed")
            .unwrap();
        let names: Vec<_> = config.browsers["test"]
            .profiles
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["Personal", "Renamed"]);

        let err = engine
            .rename_profile(&mut config, "missing", "Default", "x")
            .unwrap_err();
        assert_eq!(err.code(), "unknown-browser");
    }

    #[test]
    fn test_hide_clears_selection() {
        let temp = tempfile::tempdir().unwrap();
        let home = temp.path();
        chromium_profile(home, "Default", "Personal");
        let engine = engine(home);
        let mut config = engine.scan(&AppConfig::default());
        config.last_selection.browser_id = "test".to_string();
        config.last_selection.profile_id = "Default".to_string();

        engine.hide_profiles(&mut config, &[ProfileRef::new("test", "Default")]);
        assert!(config.browsers["test"].profiles.is_empty());
        assert!(config.last_selection.profile_id.is_empty());
        assert!(home.join("udd").join("Default").exists());
    }

    #[derive(Default)]
    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SizeBackend for CountingBackend {
        async fn measure(&self, dir: &Path, limits: SizeLimits) -> SizeStats {
            self.calls.fetch_add(1, Ordering::SeqCst);
            crate::size::measure_dir(dir, limits)
        }
    }

    #[tokio::test]
    async fn test_measure_size_uses_cache() {
        let temp = tempfile::tempdir().unwrap();
        let home = temp.path();
        let profile = chromium_profile(home, "Default", "Personal");
        fs::write(profile.join("blob"), vec![1u8; 100]).unwrap();

        let backend = Arc::new(CountingBackend::default());
        let engine = engine(home).with_size_backend(backend.clone());
        let mut config = AppConfig::default();

        let first = engine.measure_size(&mut config, "test", "Default").await;
        assert!(first.entry.ok);
        assert!(first.entry.bytes >= 100);
        let second = engine.measure_size(&mut config, "test", "Default").await;
        assert!(second.cached);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let missing = engine.measure_size(&mut config, "", "Default").await;
        assert_eq!(missing.entry.error.as_deref(), Some("missing-input"));
    }

    #[test]
    fn test_validate_rule_dry_run() {
        let temp = tempfile::tempdir().unwrap();
        let home = temp.path();
        let udd = home.join("custom");
        fs::create_dir_all(udd.join("Default")).unwrap();
        fs::write(udd.join("Default").join("Preferences"), "{}").unwrap();
        fs::write(udd.join("Default").join("Profile Picture.png"), b"png").unwrap();

        let engine = engine(home);
        let config = AppConfig::default();
        let udd_template = format!(" {} ", udd.display());
        let validation = engine
            .validate_rule(
                &config,
                RuleDefinition {
                    id: " thorium ".to_string(),
                    user_data_dir: Some(PlatformPaths {
                        win32: vec![udd_template.clone()],
                        darwin: vec![udd_template.clone()],
                        linux: vec![udd_template, "  ".to_string()],
                    }),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(!validation.can_launch);
        assert_eq!(validation.profile_count, 1);
        assert!(validation.avatar_detected);
        assert!(validation.profiles[0].has_avatar);
        assert!(config.custom_browsers.is_empty());

        let err = engine
            .validate_rule(&config, RuleDefinition::default())
            .unwrap_err();
        assert_eq!(err.code(), "invalid-rule");
    }

    #[test]
    fn test_bookmarks_unsupported_for_firefox() {
        let temp = tempfile::tempdir().unwrap();
        let engine = engine(temp.path());
        let err = engine
            .read_bookmarks(&AppConfig::default(), "fox", "/x", 10)
            .unwrap_err();
        assert_eq!(err.code(), "unsupported");
    }

    #[test]
    fn test_prepare_launch_uses_stored_path() {
        let temp = tempfile::tempdir().unwrap();
        let exe = temp.path().join("browser-bin");
        fs::write(&exe, "").unwrap();

        let engine = engine(temp.path());
        let mut config = AppConfig::default();
        config.browsers.insert(
            "test".to_string(),
            BrowserState {
                path: exe.display().to_string(),
                ..Default::default()
            },
        );

        let launcher = engine
            .prepare_launch(&config, "test", Some("Default"), "https://a.test")
            .unwrap();
        assert_eq!(launcher.executable(), exe.as_path());
        assert_eq!(
            launcher.args(),
            ["--profile-directory=Default", "https://a.test"]
        );

        let err = engine
            .prepare_launch(&AppConfig::default(), "test", None, "")
            .unwrap_err();
        assert_eq!(err.code(), "launch-failed");
    }
}
