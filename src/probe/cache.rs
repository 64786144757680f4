// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::persist::{read_json, write_json};

pub const MEDIA_META_VERSION: u32 = 1;

pub const MEDIA_META_FILENAME: &str = "media-meta.json";

/// Entries older than this are probed again
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 3600);

/// Known facts about one media URL. Values are positive when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaMeta {
    pub bytes: Option<u64>,
    pub duration_sec: Option<u64>,
}

impl MediaMeta {
    pub fn new(bytes: Option<u64>, duration_sec: Option<u64>) -> Self {
        Self {
            bytes: bytes.filter(|b| *b > 0),
            duration_sec: duration_sec.filter(|d| *d > 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetaEntry {
    #[serde(default)]
    pub checked_at_unix: i64,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub duration_sec: Option<u64>,
}

/// URL-keyed probe results, persisted as `media-meta.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetaCache {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub updated_at_unix: i64,
    #[serde(default)]
    pub by_url: BTreeMap<String, MediaMetaEntry>,
    #[serde(skip, default = "default_max_age")]
    max_age: Duration,
}

fn default_version() -> u32 {
    MEDIA_META_VERSION
}

fn default_max_age() -> Duration {
    DEFAULT_MAX_AGE
}

impl Default for MediaMetaCache {
    fn default() -> Self {
        Self {
            version: MEDIA_META_VERSION,
            updated_at_unix: 0,
            by_url: BTreeMap::new(),
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl MediaMetaCache {
    /// Load the cache, treating a missing or unreadable document as empty
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match read_json(path) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable media cache");
                Self::default()
            }
        }
    }

    pub fn save(&mut self, path: &Path, now: i64) -> Result<(), PersistError> {
        self.version = MEDIA_META_VERSION;
        self.updated_at_unix = now;
        write_json(path, self)
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Fresh cached facts for `url`; stale or undated entries count as absent
    pub fn get(&self, url: &str, now: i64) -> Option<MediaMeta> {
        let entry = self.by_url.get(url)?;
        let age = now - entry.checked_at_unix;
        if entry.checked_at_unix <= 0 || age > self.max_age.as_secs() as i64 {
            return None;
        }
        Some(MediaMeta::new(entry.bytes, entry.duration_sec))
    }

    pub fn put(&mut self, url: &str, meta: MediaMeta, now: i64) {
        let meta = MediaMeta::new(meta.bytes, meta.duration_sec);
        self.by_url.insert(
            url.to_string(),
            MediaMetaEntry {
                checked_at_unix: now,
                bytes: meta.bytes,
                duration_sec: meta.duration_sec,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const NOW: i64 = 1_700_000_000;
    const DAY: i64 = 24 * 3600;

    #[test]
    fn put_then_get() {
        let mut cache = MediaMetaCache::default();
        cache.put("https://x/a.mp4", MediaMeta::new(Some(1000), Some(60)), NOW);

        assert_eq!(
            cache.get("https://x/a.mp4", NOW + DAY),
            Some(MediaMeta::new(Some(1000), Some(60)))
        );
        assert_eq!(cache.get("https://x/other.mp4", NOW), None);
    }

    #[test]
    fn stale_entries_are_absent() {
        let mut cache = MediaMetaCache::default();
        cache.put("u", MediaMeta::new(Some(1), None), NOW);

        assert!(cache.get("u", NOW + 30 * DAY).is_some());
        assert!(cache.get("u", NOW + 31 * DAY).is_none());
    }

    #[test]
    fn max_age_is_configurable() {
        let mut cache = MediaMetaCache::default().with_max_age(Duration::from_secs(60));
        cache.put("u", MediaMeta::new(Some(1), None), NOW);

        assert!(cache.get("u", NOW + 61).is_none());
    }

    #[test]
    fn non_positive_values_are_dropped() {
        let mut cache = MediaMetaCache::default();
        cache.put("u", MediaMeta::new(Some(0), Some(0)), NOW);

        assert_eq!(cache.get("u", NOW), Some(MediaMeta::default()));
    }

    #[test]
    fn save_and_load_use_snake_case_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MEDIA_META_FILENAME);
        let mut cache = MediaMetaCache::default();
        cache.put("https://x/a.mp4", MediaMeta::new(Some(5), None), NOW);

        cache.save(&path, NOW + 1).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["updated_at_unix"], NOW + 1);
        assert_eq!(raw["by_url"]["https://x/a.mp4"]["checked_at_unix"], NOW);
        assert!(raw["by_url"]["https://x/a.mp4"]["duration_sec"].is_null());

        let loaded = MediaMetaCache::load(&path);
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn corrupt_document_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MEDIA_META_FILENAME);
        std::fs::write(&path, "[1, 2").unwrap();

        assert!(MediaMetaCache::load(&path).is_empty());
    }
}
