// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};

use super::chunk::{DEFAULT_CHUNK_BUDGET, partition};
use super::record::{
    ChunkFeed, ChunkRef, INDEX_FILENAME, IndexFeed, MANIFEST_VERSION, ManifestEpisode,
    ManifestIndex, normalize_base_path,
};
use crate::cache::{FeedCache, cache_stem, feed_file_name};
use crate::config::{FeedsConfig, Source};
use crate::error::ManifestError;
use crate::feed::{FeedFeatures, parse_feed};
use crate::http::HttpClient;
use crate::persist::{ensure_dir, write_bytes_atomic, write_json};
use crate::probe::{MEDIA_META_FILENAME, MediaMetaCache, MediaProber, ProbeSettings};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::scheduler::{FeedRequest, refresh_feed, report_state};
use crate::state::unix_now;

/// Most recent episodes kept per feed
pub const DEFAULT_MAX_EPISODES_PER_FEED: usize = 200;

/// Most recent episodes per feed whose media gets probed
pub const DEFAULT_ENRICH_ITEMS_PER_FEED: usize = 25;

/// Where the same-origin feed copies go, relative to the output directory
const FEED_COPY_DIR: &str = "data/feeds";

const CHUNK_PREFIX: &str = "feed-manifest-";

/// Options for a manifest build
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub out_dir: PathBuf,
    pub base_path: String,
    /// Fetch configured feeds that have no cached body yet
    pub fetch_missing: bool,
    /// Probe media size and duration where the feed omits them
    pub enrich_media: bool,
    pub enrich_items_per_feed: usize,
    pub max_episodes_per_feed: usize,
    pub chunk_budget: usize,
    /// Network settings for probes and missing-feed fetches
    pub probe: ProbeSettings,
}

impl BuildOptions {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            base_path: "/".to_string(),
            fetch_missing: true,
            enrich_media: false,
            enrich_items_per_feed: DEFAULT_ENRICH_ITEMS_PER_FEED,
            max_episodes_per_feed: DEFAULT_MAX_EPISODES_PER_FEED,
            chunk_budget: DEFAULT_CHUNK_BUDGET,
            probe: ProbeSettings::default(),
        }
    }
}

/// Result of a manifest build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub feed_count: usize,
    pub episode_count: usize,
    /// Chunk filenames, in index order
    pub chunks: Vec<String>,
    /// Configured sources without a cached feed before the build
    pub missing: Vec<String>,
    /// Cached feeds that are no longer configured
    pub extra: Vec<String>,
    /// Sources fetched because they were missing
    pub fetched: usize,
    /// Episodes whose media metadata was filled by a probe
    pub probed: usize,
}

/// Turn the cached feeds into a chunked manifest under `options.out_dir`.
///
/// Per-source problems (missing or unparsable feeds, failed probes) only
/// reduce what ends up in the manifest. Errors writing the output are
/// returned.
pub async fn build_manifest<C: HttpClient + ?Sized>(
    client: &C,
    config: &FeedsConfig,
    cache: &FeedCache,
    options: &BuildOptions,
    reporter: SharedProgressReporter,
) -> Result<BuildSummary, ManifestError> {
    let now = unix_now();
    let base_path = normalize_base_path(&options.base_path);
    let mut summary = BuildSummary::default();

    reporter.report(ProgressEvent::BuildStarted {
        total_sources: config.feeds.len(),
    });

    let (missing, extra) = coverage(config, cache);
    reporter.report(ProgressEvent::CacheCoverage {
        missing: missing.clone(),
        extra: extra.clone(),
    });

    if options.fetch_missing {
        summary.fetched = fetch_missing(client, config, cache, &missing, options, &reporter, now).await;
    }
    summary.missing = missing;
    summary.extra = extra;

    let copied = copy_cached_feeds(config, cache, &options.out_dir)?;

    let media_cache_path = cache.dir().join(MEDIA_META_FILENAME);
    let mut media_cache = if options.enrich_media {
        MediaMetaCache::load(&media_cache_path)
    } else {
        MediaMetaCache::default()
    };
    let prober = MediaProber::new(client, options.probe.clone());

    let mut index_feeds = Vec::with_capacity(config.feeds.len());
    let mut chunk_feeds = Vec::with_capacity(config.feeds.len());

    for source in &config.feeds {
        let mut parsed = match cache.read(&source.id) {
            Some(xml) => parse_feed(&xml, source.display_title()),
            None => Default::default(),
        };

        // Newest first; undated episodes sort last
        parsed.episodes.sort_by(|a, b| b.date_text.cmp(&a.date_text));
        parsed.episodes.truncate(options.max_episodes_per_feed);

        if options.enrich_media {
            for episode in parsed.episodes.iter_mut().take(options.enrich_items_per_feed) {
                if prober.enrich(episode, &mut media_cache, now).await {
                    summary.probed += 1;
                    reporter.report(ProgressEvent::MediaProbed {
                        url: episode.media.as_ref().map(|m| m.url.clone()).unwrap_or_default(),
                        bytes: episode.media.as_ref().and_then(|m| m.bytes),
                        duration_sec: episode.duration_sec,
                    });
                }
            }
        }

        reporter.report(ProgressEvent::FeedParsed {
            source_id: source.id.clone(),
            channel_title: parsed.channel_title.clone(),
            episode_count: parsed.episodes.len(),
        });

        summary.episode_count += parsed.episodes.len();
        index_feeds.push(index_feed(source, &parsed.channel_title, parsed.features, &copied, &base_path));
        chunk_feeds.push(ChunkFeed {
            id: source.id.clone(),
            episodes: parsed.episodes.iter().map(ManifestEpisode::from).collect(),
        });
    }
    summary.feed_count = index_feeds.len();

    let chunks = partition(&chunk_feeds, options.chunk_budget, Utc::now().year())?;
    for chunk in &chunks {
        write_bytes_atomic(&options.out_dir.join(&chunk.filename), &chunk.bytes)?;
        reporter.report(ProgressEvent::ChunkWritten {
            filename: chunk.filename.clone(),
            bytes: chunk.bytes.len(),
        });
    }
    summary.chunks = chunks.iter().map(|c| c.filename.clone()).collect();
    remove_stale_chunks(&options.out_dir, &summary.chunks);

    let index = ManifestIndex {
        version: MANIFEST_VERSION,
        chunks: summary
            .chunks
            .iter()
            .map(|filename| ChunkRef {
                url: format!("{base_path}{filename}"),
            })
            .collect(),
        base_path,
        feeds: index_feeds,
    };
    write_json(&options.out_dir.join(INDEX_FILENAME), &index)?;

    if options.enrich_media {
        if let Err(e) = media_cache.save(&media_cache_path, now) {
            tracing::warn!(error = %e, "failed to save media cache");
        }
    }

    reporter.report(ProgressEvent::BuildCompleted {
        feed_count: summary.feed_count,
        episode_count: summary.episode_count,
        chunk_count: summary.chunks.len(),
    });

    Ok(summary)
}

/// Configured ids without a cached body, and cached ids nobody configures
fn coverage(config: &FeedsConfig, cache: &FeedCache) -> (Vec<String>, Vec<String>) {
    let cached = cache.cached_ids();
    let configured: BTreeSet<String> = config
        .feeds
        .iter()
        .map(|s| cache_stem(&s.id))
        .collect();

    let missing = config
        .feeds
        .iter()
        .filter(|s| !cache.exists(&s.id))
        .map(|s| s.id.clone())
        .collect();
    let extra = cached.difference(&configured).cloned().collect();
    (missing, extra)
}

/// One validated attempt per missing source. The ledger is left alone.
async fn fetch_missing<C: HttpClient + ?Sized>(
    client: &C,
    config: &FeedsConfig,
    cache: &FeedCache,
    missing: &[String],
    options: &BuildOptions,
    reporter: &SharedProgressReporter,
    now: i64,
) -> usize {
    let mut fetched = 0;
    let sources = config
        .feeds
        .iter()
        .filter(|s| s.has_feed_url() && missing.contains(&s.id));

    for source in sources {
        let request = FeedRequest {
            source_id: &source.id,
            url: &source.feed_url,
            timeout: options.probe.timeout,
            user_agent: &options.probe.user_agent,
            if_none_match: None,
            if_modified_since: None,
        };
        let state = refresh_feed(client, cache, request, None, now).await;
        report_state(reporter, &source.id, &state);
        if cache.exists(&source.id) {
            fetched += 1;
        }
    }
    fetched
}

/// Copy the cached body of every configured feed to `<out>/data/feeds`
/// and drop copies of feeds that are no longer configured. Returns the
/// copied file names.
fn copy_cached_feeds(
    config: &FeedsConfig,
    cache: &FeedCache,
    out_dir: &Path,
) -> Result<BTreeSet<String>, ManifestError> {
    let target_dir = out_dir.join(FEED_COPY_DIR);
    let mut copied = BTreeSet::new();

    for source in config.feeds.iter().filter(|s| cache.exists(&s.id)) {
        let path = cache.path_for(&source.id);
        let bytes = std::fs::read(&path).map_err(|e| ManifestError::CopyFailed {
            path: path.clone(),
            source: e,
        })?;
        let name = feed_file_name(&source.id);
        ensure_dir(&target_dir)?;
        write_bytes_atomic(&target_dir.join(&name), &bytes)?;
        copied.insert(name);
    }

    remove_stale_copies(&target_dir, &copied);
    Ok(copied)
}

fn remove_stale_copies(target_dir: &Path, keep: &BTreeSet<String>) {
    let Ok(entries) = std::fs::read_dir(target_dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".xml") && !keep.contains(&name) {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::warn!(file = %name, error = %e, "failed to remove stale feed copy");
            }
        }
    }
}

fn index_feed(
    source: &Source,
    channel_title: &str,
    features: FeedFeatures,
    copied: &BTreeSet<String>,
    base_path: &str,
) -> IndexFeed {
    let title = [source.title.as_str(), channel_title, source.id.as_str()]
        .into_iter()
        .find(|t| !t.trim().is_empty())
        .unwrap_or_default()
        .to_string();

    let copy_name = feed_file_name(&source.id);
    let url = if copied.contains(&copy_name) {
        format!("{base_path}{FEED_COPY_DIR}/{copy_name}")
    } else {
        source.feed_url.clone()
    };

    IndexFeed {
        id: source.id.clone(),
        title,
        url,
        features,
    }
}

/// Drop chunk files left over from earlier builds
fn remove_stale_chunks(out_dir: &Path, current: &[String]) {
    let Ok(entries) = std::fs::read_dir(out_dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_chunk = name.starts_with(CHUNK_PREFIX) && name.ends_with(".json");
        if is_chunk && !current.contains(&name) {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::warn!(file = %name, error = %e, "failed to remove stale chunk");
            }
        }
    }
}
