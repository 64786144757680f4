mod enclosure;
mod episode;
mod parse;
mod slug;
mod time;
mod validate;
mod xml;

pub use enclosure::{Candidate, is_video_enclosure, pick_best};
pub use episode::{
    Chapter, Episode, ExternalChapters, FeedFeatures, Media, ParsedFeed, Transcript,
};
pub use parse::{ITUNES_NS, MEDIA_NS, PODCAST_NS, PSC_NS, parse_feed, try_parse_feed};
pub use slug::{base36, episode_slug, fnv1a32, slugify};
pub use time::{parse_date_text, parse_time_to_seconds};
pub use validate::looks_like_feed_xml;
