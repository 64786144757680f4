pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod http;
pub mod manifest;
pub mod persist;
pub mod probe;
pub mod progress;
pub mod scheduler;
pub mod state;

// Re-export main types for convenience
pub use cache::FeedCache;
pub use config::{Defaults, FeedsConfig, Source, load_feeds_config};
pub use error::{ConfigError, FeedError, FetchError, ManifestError, PersistError, ProbeError, XmlError};
pub use feed::{Episode, FeedFeatures, Media, ParsedFeed, parse_feed};
pub use http::{FetchRequest, FetchResponse, HttpClient, ReqwestClient};
pub use manifest::{BuildOptions, BuildSummary, build_manifest};
pub use probe::{MediaMeta, MediaMetaCache, MediaProber, ProbeSettings};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use scheduler::{UpdateOptions, UpdateSummary, update_feeds};
pub use state::{FetchState, FetchStatus, StateLedger};
