//! Date-partitioned, size-bounded episode manifest.

mod build;
mod chunk;
mod record;

pub use build::{
    BuildOptions, BuildSummary, DEFAULT_ENRICH_ITEMS_PER_FEED, DEFAULT_MAX_EPISODES_PER_FEED,
    build_manifest,
};
pub use chunk::{Chunk, DEFAULT_CHUNK_BUDGET, DateKey, DateWindow, partition};
pub use record::{
    ChunkFeed, ChunkRef, INDEX_FILENAME, IndexFeed, MANIFEST_VERSION, ManifestChunk,
    ManifestEpisode, ManifestIndex, SHORT_DESCRIPTION_CHARS, normalize_base_path,
    short_description,
};
