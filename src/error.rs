use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run before any fetch or parse work happens
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read feeds config {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse feeds config {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Feed entry #{index} has no id")]
    MissingSourceId { index: usize },

    #[error("Duplicate feed id '{id}'")]
    DuplicateSourceId { id: String },

    #[error("Feed ids '{id}' and '{other}' map to the same cache file")]
    CacheKeyCollision { id: String, other: String },

    #[error("Feed id '{id}' has no usable file name")]
    InvalidSourceId { id: String },

    #[error("min_hours_between_checks must be a finite number of at most {max} hours, got {hours}")]
    InvalidCooldown { hours: f64, max: f64 },
}

/// Transport-level failures of a single HTTP request
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("Response from {url} exceeded {limit} bytes")]
    BodyTooLarge { url: String, limit: u64 },

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Per-source failures recorded in the fetch-state ledger
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("not-a-feed-xml (refusing to overwrite cache)")]
    NotAFeed,

    #[error("http {status}")]
    HttpStatus { status: u16 },

    #[error("empty response (status {status})")]
    EmptyBody { status: u16 },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to write feed cache: {0}")]
    CacheWrite(#[from] PersistError),
}

/// Failures while turning feed text into an element tree
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Malformed XML: {0}")]
    Malformed(#[from] quick_xml::Error),

    #[error("Malformed XML attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Document has no root element")]
    NoRoot,

    #[error("Element <{0}> is never closed")]
    Unclosed(String),
}

/// Reasons a media probe produced no value
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Server does not honor byte ranges for {url}")]
    NoRangeSupport { url: String },

    #[error("Unexpected HTTP status {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("URL is not a candidate for this probe")]
    NotApplicable,

    #[error("No usable duration information found")]
    NotFound,

    #[error("Implausible duration of {seconds:.1}s")]
    Implausible { seconds: f64 },
}

/// Errors reading or writing the JSON documents and cache files on disk
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize JSON: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),
}

/// Top-level errors for the manifest build
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Failed to copy cached feed {path}: {source}")]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
