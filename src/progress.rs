use std::sync::Arc;

use crate::state::FetchStatus;

/// Events emitted while updating the feed cache or building the manifest
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A scheduler run is starting
    UpdateStarted { total_sources: usize },

    /// A source was fetched (`Ok` or `NotModified`)
    FeedFetched {
        source_id: String,
        status: FetchStatus,
        /// Bytes written to the cache, if a new body was stored
        bytes: Option<u64>,
    },

    /// A source was not fetched this run
    FeedSkipped { source_id: String, reason: String },

    /// A source failed to fetch or validate
    FeedFailed { source_id: String, error: String },

    /// The scheduler run finished and the ledger was written
    UpdateCompleted {
        ok_count: usize,
        not_modified_count: usize,
        skipped_count: usize,
        error_count: usize,
    },

    /// A manifest build is starting
    BuildStarted { total_sources: usize },

    /// Configured sources without a cached feed, and cached feeds no longer configured
    CacheCoverage {
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// A cached feed was parsed for the manifest
    FeedParsed {
        source_id: String,
        channel_title: String,
        episode_count: usize,
    },

    /// Media metadata was probed for one episode
    MediaProbed {
        url: String,
        bytes: Option<u64>,
        duration_sec: Option<u64>,
    },

    /// A manifest chunk was written
    ChunkWritten { filename: String, bytes: usize },

    /// The manifest build finished
    BuildCompleted {
        feed_count: usize,
        episode_count: usize,
        chunk_count: usize,
    },
}

/// Trait for reporting progress events.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
