//! The slice of the application configuration the engine reads and writes.
//!
//! Keys the engine does not know about are carried through untouched so the
//! rest of the application's settings survive a load/save cycle. A malformed
//! entry costs only itself: it is dropped with a warning while the rest of
//! the file loads.

use crate::profile::Profile;
use crate::rules::RuleDefinition;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

fn default_true() -> bool {
    true
}

/// Accepts integral or fractional milliseconds.
fn lenient_millis<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(value as i64)
}

/// Per-browser state computed by a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserState {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub detected: bool,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub excluded_profiles: Vec<String>,
    #[serde(default)]
    pub last_profile_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for BrowserState {
    fn default() -> Self {
        Self {
            enabled: true,
            detected: false,
            path: String::new(),
            profiles: Vec::new(),
            excluded_profiles: Vec::new(),
            last_profile_id: String::new(),
            display_name: String::new(),
            extra: Map::new(),
        }
    }
}

impl BrowserState {
    pub fn is_excluded(&self, profile_id: &str) -> bool {
        self.excluded_profiles.iter().any(|id| id == profile_id)
    }

    /// Hide a profile and drop it as the remembered choice.
    pub fn exclude(&mut self, profile_id: &str) {
        if !self.is_excluded(profile_id) {
            self.excluded_profiles.push(profile_id.to_string());
        }
        if self.last_profile_id == profile_id {
            self.last_profile_id.clear();
        }
    }

    pub fn include(&mut self, profile_id: &str) {
        self.excluded_profiles.retain(|id| id != profile_id);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemBrowserState {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LastSelection {
    pub browser_id: String,
    pub profile_id: String,
}

/// Last measured size of one profile directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeCacheEntry {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub files: u64,
    #[serde(default)]
    pub dirs: u64,
    #[serde(default)]
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub mtime_ms: i64,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub updated_at: i64,
}

impl SizeCacheEntry {
    /// Usable without re-measuring only if the last walk succeeded and the
    /// directory has not been modified since.
    pub fn is_valid_for(&self, mtime_ms: i64) -> bool {
        self.ok && self.mtime_ms == mtime_ms
    }
}

pub type SizeCache = BTreeMap<String, BTreeMap<String, SizeCacheEntry>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub avatar_preference: String,
    pub browsers: BTreeMap<String, BrowserState>,
    pub system_browsers: BTreeMap<String, SystemBrowserState>,
    pub custom_browsers: Vec<RuleDefinition>,
    pub profile_size_cache: SizeCache,
    pub last_selection: LastSelection,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<'de> Deserialize<'de> for AppConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(AppConfig::from_value)
    }
}

impl AppConfig {
    /// Build a config from loose JSON, keeping every entry that parses.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            tracing::warn!("Config root is not an object, using defaults");
            return Self::default();
        };

        let avatar_preference = take_field(&mut map, "avatarPreference");
        let browsers = lenient_entries("browsers", map.remove("browsers"));
        let system_browsers = lenient_entries("systemBrowsers", map.remove("systemBrowsers"));
        let custom_browsers = lenient_items("customBrowsers", map.remove("customBrowsers"));
        let profile_size_cache = lenient_entries::<Value>("profileSizeCache", map.remove("profileSizeCache"))
            .into_iter()
            .map(|(browser_id, entries)| {
                let key = format!("profileSizeCache.{}", browser_id);
                let entries = lenient_entries(&key, Some(entries));
                (browser_id, entries)
            })
            .collect();
        let last_selection = take_field(&mut map, "lastSelection");

        Self {
            avatar_preference,
            browsers,
            system_browsers,
            custom_browsers,
            profile_size_cache,
            last_selection,
            extra: map,
        }
    }

    pub fn cached_size(&self, browser_id: &str, profile_id: &str) -> Option<&SizeCacheEntry> {
        self.profile_size_cache.get(browser_id)?.get(profile_id)
    }

    pub fn store_size(&mut self, browser_id: &str, profile_id: &str, entry: SizeCacheEntry) {
        self.profile_size_cache
            .entry(browser_id.to_string())
            .or_default()
            .insert(profile_id.to_string(), entry);
    }

    /// Whether a browser is switched on in the system-level settings.
    pub fn system_enabled(&self, browser_id: &str) -> bool {
        self.system_browsers
            .get(browser_id)
            .map(|state| state.enabled)
            .unwrap_or(true)
    }
}

/// Remove `key` and parse it, or default when absent, null or malformed.
fn take_field<T: DeserializeOwned + Default>(map: &mut Map<String, Value>, key: &str) -> T {
    match map.remove(key) {
        None | Some(Value::Null) => T::default(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed config key {}: {}", key, e);
            T::default()
        }),
    }
}

fn lenient_entries<T: DeserializeOwned>(key: &str, value: Option<Value>) -> BTreeMap<String, T> {
    match value {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(entries)) => entries
            .into_iter()
            .filter_map(|(id, entry)| match serde_json::from_value(entry) {
                Ok(parsed) => Some((id, parsed)),
                Err(e) => {
                    tracing::warn!("Ignoring malformed config entry {}.{}: {}", key, id, e);
                    None
                }
            })
            .collect(),
        Some(_) => {
            tracing::warn!("Ignoring config key {}: expected an object", key);
            BTreeMap::new()
        }
    }
}

fn lenient_items<T: DeserializeOwned>(key: &str, value: Option<Value>) -> Vec<T> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value(item) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    tracing::warn!("Ignoring malformed config entry {}[{}]: {}", key, index, e);
                    None
                }
            })
            .collect(),
        Some(_) => {
            tracing::warn!("Ignoring config key {}: expected an array", key);
            Vec::new()
        }
    }
}

/// Reads and writes `AppConfig` as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `~/.perch/config.json`
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("config.json"))
    }

    /// `~/.perch`, which also holds the profile trash.
    pub fn app_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".perch"))
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unreadable config is kept before a save replaces it.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "config.json".into());
        name.push(".bak");
        self.path.with_file_name(name)
    }

    /// Load the config, or defaults when the file is missing or unreadable.
    pub fn load(&self) -> AppConfig {
        if !self.path.exists() {
            tracing::debug!("No config at {}, using defaults", self.path.display());
            return AppConfig::default();
        }

        match fs::read_to_string(&self.path)
            .map_err(Error::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(Error::from))
        {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable config {}: {}",
                    self.path.display(),
                    e
                );
                AppConfig::default()
            }
        }
    }

    /// Write the config. A file on disk that is not a JSON object is copied
    /// to `backup_path` first.
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.keep_unreadable()?;
        let json = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, json)?;
        tracing::debug!("Saved config to {}", self.path.display());
        Ok(())
    }

    fn keep_unreadable(&self) -> Result<()> {
        let Ok(raw) = fs::read(&self.path) else {
            return Ok(());
        };
        if matches!(serde_json::from_slice::<Value>(&raw), Ok(Value::Object(_))) {
            return Ok(());
        }
        let backup = self.backup_path();
        fs::copy(&self.path, &backup)?;
        tracing::warn!("Kept unreadable config as {}", backup.display());
        Ok(())
    }
}
