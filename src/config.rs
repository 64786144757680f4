// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::cache_stem;
use crate::error::ConfigError;

/// Default minimum number of hours between two checks of the same feed
pub const DEFAULT_COOLDOWN_HOURS: f64 = 2.0;

/// Longest accepted cooldown (ten years)
pub const MAX_COOLDOWN_HOURS: f64 = 24.0 * 365.0 * 10.0;

/// Default wall-clock timeout for a single request
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 25;

/// A configured feed. Immutable once loaded; `id` doubles as cache key and
/// output filename stem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, alias = "slug")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "url", alias = "xml_url", alias = "feedUrl")]
    pub feed_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Source {
    /// The configured title, or the id when none was given
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.id
        } else {
            &self.title
        }
    }

    pub fn has_feed_url(&self) -> bool {
        !self.feed_url.trim().is_empty()
    }
}

/// Network and scheduling defaults shared by all sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_cooldown_hours")]
    pub min_hours_between_checks: f64,
    #[serde(default = "default_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Defaults {
    /// Negative values mean no cooldown; out-of-range values are clamped
    pub fn cooldown(&self) -> Duration {
        let hours = self.min_hours_between_checks;
        let hours = if hours.is_finite() {
            hours.clamp(0.0, MAX_COOLDOWN_HOURS)
        } else {
            0.0
        };
        Duration::from_secs_f64(hours * 3600.0)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            min_hours_between_checks: default_cooldown_hours(),
            request_timeout_seconds: default_timeout_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_cooldown_hours() -> f64 {
    DEFAULT_COOLDOWN_HOURS
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// User agent sent with every request unless the config overrides it
pub fn default_user_agent() -> String {
    format!("vodfeeds/{}", env!("CARGO_PKG_VERSION"))
}

/// The typed feeds configuration.
///
/// `site` stays an open map: it is echoed verbatim into the fetch-state
/// ledger and never interpreted here. Unknown keys anywhere are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedsConfig {
    #[serde(default)]
    pub site: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default, alias = "sources")]
    pub feeds: Vec<Source>,
}

impl FeedsConfig {
    /// Parse and validate a JSON feeds config
    pub fn from_json_str(json: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: FeedsConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::JsonParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self) {
        for source in &mut self.feeds {
            source.id = source.id.trim().to_string();
            source.feed_url = source.feed_url.trim().to_string();
            source.title = source.title.trim().to_string();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let hours = self.defaults.min_hours_between_checks;
        if !hours.is_finite() || hours > MAX_COOLDOWN_HOURS {
            return Err(ConfigError::InvalidCooldown {
                hours,
                max: MAX_COOLDOWN_HOURS,
            });
        }

        let mut seen = HashSet::new();
        let mut stems: HashMap<String, &str> = HashMap::new();
        for (index, source) in self.feeds.iter().enumerate() {
            if source.id.is_empty() {
                return Err(ConfigError::MissingSourceId { index: index + 1 });
            }
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateSourceId {
                    id: source.id.clone(),
                });
            }

            let stem = cache_stem(&source.id);
            if stem.is_empty() {
                return Err(ConfigError::InvalidSourceId {
                    id: source.id.clone(),
                });
            }
            if let Some(other) = stems.insert(stem, &source.id) {
                return Err(ConfigError::CacheKeyCollision {
                    id: source.id.clone(),
                    other: other.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Load the feeds config from disk. Any failure here is fatal for the run.
pub fn load_feeds_config(path: &Path) -> Result<FeedsConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    FeedsConfig::from_json_str(&content, path)
}
