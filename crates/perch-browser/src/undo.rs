//! Time-boxed undo for profile deletes.
//!
//! Each delete batch is held under a single-use token. A timer thread per
//! batch purges the trashed folders when the TTL runs out; consuming the
//! token first cancels the timer.

use crossbeam_channel::{Sender, after, bounded, select};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_UNDO_TTL: Duration = Duration::from_secs(5 * 60);

/// One trashed profile that can be moved back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoItem {
    pub browser_id: String,
    pub profile_id: String,
    pub original_path: PathBuf,
    pub trashed_path: PathBuf,
}

struct PendingBatch {
    items: Vec<UndoItem>,
    expires_at: Instant,
    // Dropping the sender wakes the timer thread.
    _cancel: Sender<()>,
}

type Batches = Arc<Mutex<HashMap<String, PendingBatch>>>;

#[derive(Clone)]
pub struct UndoRegistry {
    batches: Batches,
    ttl: Duration,
}

impl Default for UndoRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_TTL)
    }
}

impl UndoRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            batches: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Hold a batch for later undo. Returns `None` for an empty batch.
    pub fn register(&self, items: Vec<UndoItem>) -> Option<String> {
        if items.is_empty() {
            return None;
        }

        let token = new_token();
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        lock(&self.batches).insert(
            token.clone(),
            PendingBatch {
                items,
                expires_at: Instant::now() + self.ttl,
                _cancel: cancel_tx,
            },
        );

        let batches = Arc::clone(&self.batches);
        let key = token.clone();
        let ttl = self.ttl;
        let spawned = thread::Builder::new()
            .name("perch-undo-expiry".to_string())
            .spawn(move || {
                select! {
                    recv(cancel_rx) -> _ => {},
                    recv(after(ttl)) -> _ => {
                        let expired = lock(&batches).remove(&key);
                        if let Some(batch) = expired {
                            tracing::info!("Undo window closed for {}, purging trash", key);
                            purge_items(&batch.items);
                        }
                    },
                }
            });
        if let Err(e) = spawned {
            tracing::warn!("Could not start undo expiry timer: {}", e);
        }

        tracing::debug!("Registered undo batch {}", token);
        Some(token)
    }

    /// Take a batch for restoring. A token works once; an expired batch is
    /// purged and reported as missing.
    pub fn consume(&self, token: &str) -> Option<Vec<UndoItem>> {
        let batch = lock(&self.batches).remove(token.trim())?;
        if Instant::now() >= batch.expires_at {
            purge_items(&batch.items);
            return None;
        }
        Some(batch.items)
    }

    /// Give up on a batch now and delete its trashed folders.
    pub fn purge(&self, token: &str) -> bool {
        match lock(&self.batches).remove(token.trim()) {
            Some(batch) => {
                purge_items(&batch.items);
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        lock(&self.batches).len()
    }
}

fn lock(batches: &Batches) -> MutexGuard<'_, HashMap<String, PendingBatch>> {
    batches.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn purge_items(items: &[UndoItem]) {
    for item in items {
        let path = &item.trashed_path;
        let removed = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) => Err(e),
        };
        if let Err(e) = removed {
            tracing::warn!(
                "Failed to purge {}: {}",
                item.trashed_path.display(),
                e
            );
        }
    }
}

/// `<base36 millis>-<12 hex chars>`
fn new_token() -> String {
    let mut bytes = [0u8; 6];
    rand::rng().fill(&mut bytes[..]);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", base36(chrono::Utc::now().timestamp_millis().unsigned_abs()), hex)
}

pub(crate) fn base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trashed_item(dir: &std::path::Path, name: &str) -> UndoItem {
        let trashed = dir.join(name);
        fs::create_dir_all(&trashed).unwrap();
        UndoItem {
            browser_id: "chrome".to_string(),
            profile_id: name.to_string(),
            original_path: dir.join("orig").join(name),
            trashed_path: trashed,
        }
    }

    #[test]
    fn test_token_is_single_use() {
        let temp = tempfile::tempdir().unwrap();
        let registry = UndoRegistry::default();
        let token = registry
            .register(vec![trashed_item(temp.path(), "Profile 1")])
            .unwrap();

        assert_eq!(registry.consume(&token).unwrap().len(), 1);
        assert!(registry.consume(&token).is_none());
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn test_empty_batch_gets_no_token() {
        assert!(UndoRegistry::default().register(Vec::new()).is_none());
    }

    #[test]
    fn test_expiry_purges_trash() {
        let temp = tempfile::tempdir().unwrap();
        let registry = UndoRegistry::new(Duration::from_millis(50));
        let item = trashed_item(temp.path(), "Profile 2");
        let trashed = item.trashed_path.clone();
        let token = registry.register(vec![item]).unwrap();

        thread::sleep(Duration::from_millis(500));
        assert!(!trashed.exists());
        assert!(registry.consume(&token).is_none());
    }

    #[test]
    fn test_consume_cancels_timer() {
        let temp = tempfile::tempdir().unwrap();
        let registry = UndoRegistry::new(Duration::from_millis(100));
        let item = trashed_item(temp.path(), "Profile 3");
        let trashed = item.trashed_path.clone();
        let token = registry.register(vec![item]).unwrap();

        assert!(registry.consume(&token).is_some());
        thread::sleep(Duration::from_millis(400));
        assert!(trashed.exists());
    }

    #[test]
    fn test_purge_removes_now() {
        let temp = tempfile::tempdir().unwrap();
        let registry = UndoRegistry::default();
        let item = trashed_item(temp.path(), "Profile 4");
        let trashed = item.trashed_path.clone();
        let token = registry.register(vec![item]).unwrap();

        assert!(registry.purge(&token));
        assert!(!trashed.exists());
        assert!(!registry.purge(&token));
    }

    #[test]
    fn test_purge_removes_trashed_file() {
        let temp = tempfile::tempdir().unwrap();
        let registry = UndoRegistry::default();
        let trashed = temp.path().join("Local State");
        fs::write(&trashed, "{}").unwrap();
        let item = UndoItem {
            browser_id: "chrome".to_string(),
            profile_id: "Local State".to_string(),
            original_path: temp.path().join("orig").join("Local State"),
            trashed_path: trashed.clone(),
        };
        let token = registry.register(vec![item]).unwrap();

        assert!(registry.purge(&token));
        assert!(!trashed.exists());
    }

    #[test]
    fn test_token_format() {
        let token = new_token();
        let (time, random) = token.split_once('-').unwrap();
        assert!(time.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(random.len(), 12);
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
    }
}
