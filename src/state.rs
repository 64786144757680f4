use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::persist::{read_json, write_json};

/// Current format version of the ledger document
pub const LEDGER_VERSION: u32 = 1;

/// Filename of the ledger inside the cache directory
pub const LEDGER_FILENAME: &str = "state.json";

/// Current time as Unix seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Ok,
    NotModified,
    Error,
    Skip,
}

/// Outcome of the most recent fetch attempt for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchState {
    pub status: FetchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_unix: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ok_unix: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FetchState {
    /// An empty state with the given status
    pub fn new(status: FetchStatus) -> Self {
        Self {
            status,
            url: None,
            fetched_url: None,
            last_checked_unix: None,
            last_ok_unix: None,
            etag: None,
            last_modified: None,
            bytes: None,
            error: None,
            reason: None,
        }
    }

    pub fn skip(reason: &str) -> Self {
        Self {
            reason: Some(reason.to_string()),
            ..Self::new(FetchStatus::Skip)
        }
    }

    /// Validators to send with the next conditional request
    pub fn validators(&self) -> (Option<String>, Option<String>) {
        (self.etag.clone(), self.last_modified.clone())
    }
}

/// The consolidated per-run fetch-state document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateLedger {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub updated_at_unix: i64,
    #[serde(default)]
    pub site: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub feeds: BTreeMap<String, FetchState>,
}

fn default_version() -> u32 {
    LEDGER_VERSION
}

impl Default for StateLedger {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            updated_at_unix: 0,
            site: serde_json::Map::new(),
            feeds: BTreeMap::new(),
        }
    }
}

impl StateLedger {
    /// Load the ledger, treating a missing or unreadable document as empty
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match read_json(path) {
            Ok(ledger) => ledger,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable fetch-state ledger");
                Self::default()
            }
        }
    }

    /// Write the ledger as one document
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        write_json(path, self)
    }

    pub fn get(&self, source_id: &str) -> Option<&FetchState> {
        self.feeds.get(source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ok_state() -> FetchState {
        FetchState {
            url: Some("https://example.com/feed.xml".to_string()),
            fetched_url: Some("https://cdn.example.com/feed.xml".to_string()),
            last_checked_unix: Some(1_700_000_000),
            last_ok_unix: Some(1_700_000_000),
            etag: Some("\"abc\"".to_string()),
            last_modified: Some("Mon, 01 Jan 2024 00:00:00 GMT".to_string()),
            bytes: Some(4096),
            ..FetchState::new(FetchStatus::Ok)
        }
    }

    #[test]
    fn load_missing_ledger_returns_empty() {
        let dir = tempdir().unwrap();
        let ledger = StateLedger::load(&dir.path().join(LEDGER_FILENAME));

        assert_eq!(ledger.version, LEDGER_VERSION);
        assert!(ledger.feeds.is_empty());
    }

    #[test]
    fn load_corrupt_ledger_returns_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILENAME);
        std::fs::write(&path, "{ definitely not json").unwrap();

        let ledger = StateLedger::load(&path);
        assert!(ledger.feeds.is_empty());
    }

    #[test]
    fn save_and_load_preserves_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILENAME);

        let mut ledger = StateLedger {
            updated_at_unix: 1_700_000_100,
            ..Default::default()
        };
        ledger.feeds.insert("alpha".to_string(), ok_state());
        ledger.feeds.insert("beta".to_string(), FetchState::skip("missing url"));
        ledger.save(&path).unwrap();

        let loaded = StateLedger::load(&path);
        assert_eq!(loaded, ledger);
        assert_eq!(loaded.get("alpha").unwrap().bytes, Some(4096));
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_value(FetchState::new(FetchStatus::NotModified)).unwrap();
        assert_eq!(json["status"], "not_modified");
        assert!(json.get("etag").is_none());
    }

    #[test]
    fn validators_come_from_state() {
        let (etag, last_modified) = ok_state().validators();
        assert_eq!(etag.as_deref(), Some("\"abc\""));
        assert!(last_modified.is_some());
    }
}
