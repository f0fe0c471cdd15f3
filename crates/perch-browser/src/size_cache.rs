use crate::size::{SizeLimits, SizeStats};
use crate::size_worker::SizeBackend;
use perch_core::config::{AppConfig, SizeCacheEntry};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// A size answer and whether it came from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeReport {
    #[serde(flatten)]
    pub entry: SizeCacheEntry,
    pub cached: bool,
}

impl SizeReport {
    /// A failure that was never measured or cached.
    pub fn failed(code: &str) -> Self {
        Self {
            entry: SizeCacheEntry {
                ok: false,
                error: Some(code.to_string()),
                ..Default::default()
            },
            cached: false,
        }
    }
}

/// Profile sizes backed by the config's `profileSizeCache`.
pub struct SizeService {
    backend: Arc<dyn SizeBackend>,
    limits: SizeLimits,
}

impl SizeService {
    pub fn new(backend: Arc<dyn SizeBackend>) -> Self {
        Self {
            backend,
            limits: SizeLimits::PROFILE,
        }
    }

    /// Reuse a cached entry when the directory's mtime is unchanged,
    /// otherwise measure and store the result.
    pub async fn measure(
        &self,
        config: &mut AppConfig,
        browser_id: &str,
        profile_id: &str,
        dir: &Path,
    ) -> SizeReport {
        let mtime_ms = modified_ms(dir);
        if let Some(entry) = config.cached_size(browser_id, profile_id) {
            if entry.is_valid_for(mtime_ms) {
                tracing::debug!("Size cache hit for {}/{}", browser_id, profile_id);
                return SizeReport {
                    entry: entry.clone(),
                    cached: true,
                };
            }
        }

        let stats: SizeStats = self.backend.measure(dir, self.limits).await;
        let entry = SizeCacheEntry {
            ok: stats.ok,
            bytes: stats.bytes,
            files: stats.files,
            dirs: stats.dirs,
            partial: stats.partial,
            error: stats.error,
            mtime_ms,
            updated_at: chrono::Utc::now().timestamp_millis(),
        };
        config.store_size(browser_id, profile_id, entry.clone());

        SizeReport {
            entry,
            cached: false,
        }
    }
}

/// Modification time in epoch milliseconds, or 0 when unavailable.
pub fn modified_ms(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
