use crate::{Error, Result};
use perch_core::paths::{is_sub_path, normalize};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BOOKMARK_LIMIT: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bookmark {
    pub title: String,
    pub url: String,
    /// Folder names from the root, joined with ` / `.
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkList {
    pub items: Vec<Bookmark>,
    pub file_path: PathBuf,
}

/// Read up to `limit` bookmarks from a Chromium profile's `Bookmarks` file.
///
/// A profile without the file has no bookmarks.
pub fn read_chromium_bookmarks(user_data_dir: &Path, profile_id: &str, limit: usize) -> Result<BookmarkList> {
    let base = normalize(user_data_dir);
    let profile_dir = normalize(&base.join(profile_id.trim()));
    if base.as_os_str().is_empty() || profile_id.trim().is_empty() || !profile_dir.is_dir() {
        return Err(Error::MissingProfileDir(profile_dir));
    }
    if !is_sub_path(&base, &profile_dir) {
        return Err(Error::InvalidProfileDir(profile_dir));
    }

    let file_path = profile_dir.join("Bookmarks");
    if !file_path.is_file() {
        return Ok(BookmarkList {
            items: Vec::new(),
            file_path,
        });
    }

    let data: Value = fs::read_to_string(&file_path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .ok_or_else(|| Error::InvalidBookmarks(file_path.clone()))?;

    let mut items = Vec::new();
    if let Some(roots) = data.get("roots").and_then(Value::as_object) {
        for root in roots.values() {
            if items.len() >= limit {
                break;
            }
            walk(root, &mut Vec::new(), &mut items, limit);
        }
    }

    tracing::debug!("Read {} bookmarks from {}", items.len(), file_path.display());
    Ok(BookmarkList { items, file_path })
}

fn walk(node: &Value, trail: &mut Vec<String>, items: &mut Vec<Bookmark>, limit: usize) {
    if items.len() >= limit || !node.is_object() {
        return;
    }

    let text = |key: &str| node.get(key).and_then(Value::as_str).unwrap_or("");
    if text("type") == "url" && !text("url").is_empty() {
        items.push(Bookmark {
            title: text("name").to_string(),
            url: text("url").to_string(),
            folder: trail.join(" / "),
        });
        return;
    }

    let Some(children) = node.get("children").and_then(Value::as_array) else {
        return;
    };
    let name = text("name");
    if !name.is_empty() {
        trail.push(name.to_string());
    }
    for child in children {
        if items.len() >= limit {
            break;
        }
        walk(child, trail, items, limit);
    }
    if !name.is_empty() {
        trail.pop();
    }
}
