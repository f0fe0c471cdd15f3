//! Duplicate, rename, soft-delete and restore of profile folders.
//!
//! Every operation that moves or writes a folder first checks that the
//! folder lies strictly inside the directory it is supposed to belong to.

use crate::copy::{copy_named_entries, copy_tree};
use crate::firefox::find_base_dir;
use crate::ini::IniDocument;
use crate::undo::{UndoItem, UndoRegistry, base36};
use crate::{Error, Result};
use perch_core::paths::{is_sub_path, normalize, path_key, to_slash};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Entries always copied into a duplicated Chromium profile.
const BASE_ENTRIES: &[&str] = &["Preferences", "Secure Preferences"];
const BOOKMARK_ENTRIES: &[&str] = &["Bookmarks", "Bookmarks.bak"];
const EXTENSION_ENTRIES: &[&str] = &["Extensions"];
const HISTORY_ENTRIES: &[&str] = &["History", "History-journal", "Favicons", "Favicons-journal"];
const SITE_DATA_ENTRIES: &[&str] = &[
    "Cookies",
    "Cookies-journal",
    "Network",
    "Local Storage",
    "Session Storage",
    "Sessions",
    "Service Worker",
    "IndexedDB",
    "Code Cache",
    "GPUCache",
    "Cache",
];

const MAX_PROFILE_NUMBER: u32 = 2000;
const MAX_FIREFOX_SECTION: u32 = 5000;
const FOLDER_COLLISION_PROBES: u32 = 50;

/// Which optional data a Chromium duplicate carries over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CopyOptions {
    pub bookmarks: bool,
    pub extensions: bool,
    pub history: bool,
    pub site_data: bool,
}

impl CopyOptions {
    pub fn entries(&self) -> Vec<&'static str> {
        let mut entries = BASE_ENTRIES.to_vec();
        if self.bookmarks {
            entries.extend_from_slice(BOOKMARK_ENTRIES);
        }
        if self.extensions {
            entries.extend_from_slice(EXTENSION_ENTRIES);
        }
        if self.history {
            entries.extend_from_slice(HISTORY_ENTRIES);
        }
        if self.site_data {
            entries.extend_from_slice(SITE_DATA_ENTRIES);
        }
        entries
    }
}

/// Result of a Firefox duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirefoxCopy {
    pub profile_dir: PathBuf,
    pub name: String,
}

/// Where a trashed folder went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashRecord {
    pub original_path: PathBuf,
    pub trashed_path: PathBuf,
}

/// Owns the trash directory and the undo registry for deletes.
pub struct ProfileLifecycle {
    trash_root: PathBuf,
    undo: UndoRegistry,
}

impl ProfileLifecycle {
    pub fn new(trash_root: PathBuf) -> Self {
        Self::with_undo(trash_root, UndoRegistry::default())
    }

    pub fn with_undo_ttl(trash_root: PathBuf, ttl: Duration) -> Self {
        Self::with_undo(trash_root, UndoRegistry::new(ttl))
    }

    fn with_undo(trash_root: PathBuf, undo: UndoRegistry) -> Self {
        Self {
            trash_root: normalize(&trash_root),
            undo,
        }
    }

    pub fn trash_root(&self) -> &Path {
        &self.trash_root
    }

    pub fn undo(&self) -> &UndoRegistry {
        &self.undo
    }

    /// Copy a Chromium profile into the next free `Profile <n>` folder.
    ///
    /// Returns the new profile id.
    pub fn duplicate_chromium(
        &self,
        user_data_dir: &Path,
        from_profile_id: &str,
        to_name: &str,
        options: &CopyOptions,
    ) -> Result<String> {
        let base = normalize(user_data_dir);
        if base.as_os_str().is_empty() || !base.is_dir() {
            return Err(Error::MissingUserDataDir);
        }
        let from_profile_id = from_profile_id.trim();
        if from_profile_id.is_empty() {
            return Err(Error::MissingProfileId);
        }

        let source = normalize(&base.join(from_profile_id));
        if !is_sub_path(&base, &source) {
            return Err(Error::InvalidSourceProfileDir(source));
        }
        if !source.is_dir() {
            return Err(Error::MissingSourceProfileDir(source));
        }

        let new_id = next_chromium_profile_id(&base)?;
        let dest = base.join(&new_id);
        let copied = copy_named_entries(&source, &dest, &options.entries())?;
        tracing::info!(
            "Duplicated {} into {} ({} entries)",
            source.display(),
            dest.display(),
            copied
        );

        let to_name = to_name.trim();
        if !to_name.is_empty() {
            if let Err(e) = write_chromium_name(&dest, to_name) {
                tracing::warn!("Copied profile {} kept its old name: {}", new_id, e);
            }
        }

        Ok(new_id)
    }

    /// Set a Chromium profile's display name in its `Preferences`.
    pub fn rename_chromium(&self, user_data_dir: &Path, profile_id: &str, name: &str) -> Result<()> {
        let base = normalize(user_data_dir);
        let profile_dir = normalize(&base.join(profile_id.trim()));
        if base.as_os_str().is_empty() || profile_id.trim().is_empty() || !profile_dir.is_dir() {
            return Err(Error::MissingProfileDir(profile_dir));
        }
        if !is_sub_path(&base, &profile_dir) {
            return Err(Error::InvalidProfileDir(profile_dir));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::MissingName);
        }

        write_chromium_name(&profile_dir, name)?;
        tracing::info!("Renamed {} to {}", profile_dir.display(), name);
        Ok(())
    }

    /// Copy a Firefox profile folder next to itself and register it in
    /// `profiles.ini`.
    pub fn duplicate_firefox(&self, profile_dir: &Path, to_name: &str) -> Result<FirefoxCopy> {
        let source = normalize(profile_dir);
        if source.as_os_str().is_empty() || !source.is_dir() {
            return Err(Error::MissingSourceProfileDir(source));
        }
        let base = find_base_dir(&source).ok_or_else(|| Error::MissingFirefoxBaseDir(source.clone()))?;
        if !is_sub_path(&base, &source) {
            return Err(Error::InvalidSourceProfileDir(source));
        }

        let ini_path = base.join("profiles.ini");
        let mut doc = IniDocument::parse(&fs::read_to_string(&ini_path)?);

        let parent = source
            .parent()
            .ok_or_else(|| Error::InvalidSourceProfileDir(source.clone()))?;
        let folder = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest = sibling_folder(parent, &folder);
        let dest_folder = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        copy_tree(&source, &dest)?;

        let name = match to_name.trim() {
            "" => dest_folder,
            name => name.to_string(),
        };
        let relative = dest
            .strip_prefix(&base)
            .map(to_slash)
            .map_err(|_| Error::InvalidSourceProfileDir(dest.clone()))?;
        let section = format!("Profile{}", next_firefox_section(&doc));
        doc.append_section(
            &section,
            &[
                ("Name", name.as_str()),
                ("IsRelative", "1"),
                ("Path", relative.as_str()),
                ("Default", "0"),
            ],
        );
        fs::write(&ini_path, doc.render())?;

        tracing::info!("Duplicated {} into {} as [{}]", source.display(), dest.display(), section);
        Ok(FirefoxCopy {
            profile_dir: dest,
            name,
        })
    }

    /// Change the `Name` of the `profiles.ini` entry for a profile folder.
    pub fn rename_firefox(&self, profile_dir: &Path, name: &str) -> Result<()> {
        let dir = normalize(profile_dir);
        let name = name.trim();
        if dir.as_os_str().is_empty() || name.is_empty() {
            return Err(Error::MissingInput);
        }

        let base = find_base_dir(&dir).ok_or_else(|| Error::MissingFirefoxBaseDir(dir.clone()))?;
        let ini_path = base.join("profiles.ini");
        if !ini_path.is_file() {
            return Err(Error::MissingProfilesIni(base));
        }
        let mut doc = IniDocument::parse(&fs::read_to_string(&ini_path)?);

        let relative = if is_sub_path(&base, &dir) {
            dir.strip_prefix(&base).ok().map(to_slash)
        } else {
            None
        };
        let dir_key = path_key(&dir);

        let ordinal = doc.sections().iter().position(|section| {
            if !section.name.to_lowercase().starts_with("profile") {
                return false;
            }
            let Some(path) = section.get("Path") else {
                return false;
            };
            let is_relative = section.get("IsRelative").unwrap_or("1") == "1";
            if is_relative {
                let stored = path.trim().replace('\\', "/");
                relative.as_deref() == Some(stored.trim_matches('/'))
            } else {
                path_key(Path::new(path.trim())) == dir_key
            }
        });

        match ordinal {
            Some(ordinal) => {
                doc.set(ordinal, "Name", name);
                fs::write(&ini_path, doc.render())?;
                tracing::info!("Renamed Firefox profile {} to {}", dir.display(), name);
                Ok(())
            }
            None => Err(Error::ProfileNotFound(dir)),
        }
    }

    /// Move a folder inside `root` into the trash.
    ///
    /// A target that does not exist is a success with nothing trashed.
    pub fn trash(&self, root: &Path, target: &Path) -> Result<Option<TrashRecord>> {
        if root.as_os_str().is_empty() || target.as_os_str().is_empty() {
            return Err(Error::MissingPath);
        }
        let target = normalize(target);
        if !is_sub_path(root, &target) {
            return Err(Error::InvalidTarget(target));
        }
        if fs::symlink_metadata(&target).is_err() {
            tracing::debug!("Nothing to trash at {}", target.display());
            return Ok(None);
        }

        fs::create_dir_all(&self.trash_root)?;
        let folder = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "profile".to_string());
        let mut suffix = [0u8; 4];
        rand::rng().fill(&mut suffix[..]);
        let suffix: String = suffix.iter().map(|b| format!("{:02x}", b)).collect();
        let trashed = self.trash_root.join(format!(
            "{}-{}-{}",
            folder,
            chrono::Utc::now().timestamp_millis(),
            suffix
        ));

        move_path(&target, &trashed)?;
        tracing::info!("Trashed {} to {}", target.display(), trashed.display());
        Ok(Some(TrashRecord {
            original_path: target,
            trashed_path: trashed,
        }))
    }

    /// Move a trashed folder back to where it came from.
    pub fn restore(&self, root: &Path, original: &Path, trashed: &Path) -> Result<()> {
        let original = normalize(original);
        let trashed = normalize(trashed);
        if !is_sub_path(root, &original) {
            return Err(Error::InvalidTarget(original));
        }
        if !is_sub_path(&self.trash_root, &trashed) {
            return Err(Error::InvalidTarget(trashed));
        }
        if fs::symlink_metadata(&trashed).is_err() {
            return Err(Error::MissingTrash(trashed));
        }
        if fs::symlink_metadata(&original).is_ok() {
            return Err(Error::RestoreConflict(original));
        }

        if let Some(parent) = original.parent() {
            fs::create_dir_all(parent)?;
        }
        move_path(&trashed, &original)?;
        tracing::info!("Restored {}", original.display());
        Ok(())
    }

    /// Hold successfully trashed items for undo.
    pub fn register_undo(&self, items: Vec<UndoItem>) -> Option<String> {
        self.undo.register(items)
    }
}

/// Rename `src` to `dst`, falling back to copy and remove when the two sit on
/// different filesystems.
fn move_path(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!("{} is on another device, copying instead", dst.display());
            copy_then_remove(src, dst)
        }
        Err(e) => Err(e.into()),
    }
}

/// The source is only removed once the copy is complete. A failed copy
/// leaves the source intact and drops the partial destination.
fn copy_then_remove(src: &Path, dst: &Path) -> Result<()> {
    let is_dir = fs::symlink_metadata(src)?.is_dir();
    let copied = if is_dir {
        copy_tree(src, dst).map(|_| ())
    } else {
        fs::copy(src, dst).map(|_| ()).map_err(Error::from)
    };
    if let Err(e) = copied {
        if let Err(cleanup) = remove_path(dst) {
            tracing::warn!("Failed to clean up {}: {}", dst.display(), cleanup);
        }
        return Err(e);
    }
    remove_path(src)
}

fn remove_path(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Write `profile.name` and `profile.shortcut_name` into `Preferences`.
fn write_chromium_name(profile_dir: &Path, name: &str) -> Result<()> {
    let prefs_path = profile_dir.join("Preferences");
    let invalid = || Error::InvalidPreferences(profile_dir.to_path_buf());

    let raw = fs::read_to_string(&prefs_path).map_err(|_| invalid())?;
    let mut prefs: Value = serde_json::from_str(&raw).map_err(|_| invalid())?;
    let root = prefs.as_object_mut().ok_or_else(invalid)?;

    let profile = root
        .entry("profile")
        .or_insert_with(|| Value::Object(Default::default()));
    if !profile.is_object() {
        *profile = Value::Object(Default::default());
    }
    if let Some(profile) = profile.as_object_mut() {
        profile.insert("name".to_string(), Value::String(name.to_string()));
        profile.insert("shortcut_name".to_string(), Value::String(name.to_string()));
    }

    fs::write(&prefs_path, serde_json::to_string_pretty(&prefs)?)?;
    Ok(())
}

fn next_chromium_profile_id(user_data_dir: &Path) -> Result<String> {
    let taken: HashSet<String> = fs::read_dir(user_data_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();

    let free = (1..=MAX_PROFILE_NUMBER)
        .map(|n| format!("Profile {}", n))
        .find(|candidate| !taken.contains(candidate));
    Ok(free.unwrap_or_else(|| format!("Profile {}", chrono::Utc::now().timestamp_millis())))
}

/// Lowest `n` not used by a `[Profile<n>]` section.
fn next_firefox_section(doc: &IniDocument) -> u32 {
    let used: HashSet<u32> = doc
        .sections()
        .iter()
        .filter_map(|section| {
            let lower = section.name.to_lowercase();
            lower.strip_prefix("profile")?.parse::<u32>().ok()
        })
        .collect();
    (0..MAX_FIREFOX_SECTION)
        .find(|n| !used.contains(n))
        .unwrap_or(MAX_FIREFOX_SECTION)
}

/// `<folder>-open-<base36 millis>`, probing `-0`..`-49` on collision.
fn sibling_folder(parent: &Path, folder: &str) -> PathBuf {
    let stem = format!(
        "{}-open-{}",
        folder,
        base36(chrono::Utc::now().timestamp_millis().unsigned_abs())
    );
    let first = parent.join(&stem);
    if !first.exists() {
        return first;
    }
    (0..FOLDER_COLLISION_PROBES)
        .map(|i| parent.join(format!("{}-{}", stem, i)))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| parent.join(format!("{}-{}", stem, FOLDER_COLLISION_PROBES)))
}
