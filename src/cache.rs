// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::PersistError;
use crate::persist::{ensure_dir, write_bytes_atomic};
use crate::state::LEDGER_FILENAME;

const FEEDS_DIR: &str = "feeds";
const FEED_EXTENSION: &str = "xml";

/// On-disk layout of the feed cache:
///
/// ```text
/// <dir>/state.json        fetch-state ledger
/// <dir>/feeds/<id>.xml    raw feed bodies
/// <dir>/media-meta.json   media probe results
/// ```
#[derive(Debug, Clone)]
pub struct FeedCache {
    dir: PathBuf,
}

impl FeedCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn feeds_dir(&self) -> PathBuf {
        self.dir.join(FEEDS_DIR)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILENAME)
    }

    /// Cache file for a source id
    pub fn path_for(&self, source_id: &str) -> PathBuf {
        self.feeds_dir().join(feed_file_name(source_id))
    }

    pub fn exists(&self, source_id: &str) -> bool {
        self.path_for(source_id).is_file()
    }

    /// Cached body as text, `None` when absent or unreadable
    pub fn read(&self, source_id: &str) -> Option<String> {
        let path = self.path_for(source_id);
        let bytes = std::fs::read(&path).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Replace the cached body; readers see either the old or the new file
    pub fn store(&self, source_id: &str, body: &[u8]) -> Result<PathBuf, PersistError> {
        let path = self.path_for(source_id);
        write_bytes_atomic(&path, body)?;
        Ok(path)
    }

    /// Ids (file stems) of every cached feed
    pub fn cached_ids(&self) -> BTreeSet<String> {
        let Ok(entries) = std::fs::read_dir(self.feeds_dir()) else {
            return BTreeSet::new();
        };

        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == FEED_EXTENSION))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect()
    }

    pub fn ensure(&self) -> Result<(), PersistError> {
        ensure_dir(&self.feeds_dir())
    }
}

/// File stem a source id is stored under. The id is sanitized so a
/// hand-edited config cannot escape the cache directory.
pub fn cache_stem(source_id: &str) -> String {
    sanitize_filename::sanitize(source_id)
}

/// `<stem>.xml`, shared by the cache and the published feed copies
pub fn feed_file_name(source_id: &str) -> String {
    format!("{}.{FEED_EXTENSION}", cache_stem(source_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_and_read_roundtrip() {
        let dir = tempdir().unwrap();
        let cache = FeedCache::new(dir.path());

        assert!(!cache.exists("show"));
        let path = cache.store("show", b"<rss/>").unwrap();

        assert_eq!(path, dir.path().join("feeds").join("show.xml"));
        assert!(cache.exists("show"));
        assert_eq!(cache.read("show").as_deref(), Some("<rss/>"));
    }

    #[test]
    fn path_for_sanitizes_ids() {
        let cache = FeedCache::new("/cache");
        let path = cache.path_for("../../etc/passwd");

        assert_eq!(path.parent(), Some(Path::new("/cache/feeds")));
    }

    #[test]
    fn distinct_ids_can_share_a_stem() {
        assert_eq!(cache_stem("a/b"), cache_stem("ab"));
        assert_eq!(feed_file_name("show"), "show.xml");
    }

    #[test]
    fn cached_ids_lists_only_feed_files() {
        let dir = tempdir().unwrap();
        let cache = FeedCache::new(dir.path());
        cache.store("a", b"x").unwrap();
        cache.store("b", b"y").unwrap();
        std::fs::write(cache.feeds_dir().join("notes.txt"), "z").unwrap();

        let ids: Vec<String> = cache.cached_ids().into_iter().collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn cached_ids_of_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let cache = FeedCache::new(dir.path().join("nope"));
        assert!(cache.cached_ids().is_empty());
        assert!(cache.read("x").is_none());
    }

    #[test]
    fn ledger_lives_next_to_feeds() {
        let cache = FeedCache::new("/cache");
        assert_eq!(cache.ledger_path(), PathBuf::from("/cache/state.json"));
    }
}
