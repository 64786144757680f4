// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

use crate::feed::{Episode, ExternalChapters, FeedFeatures, Media, Transcript};

pub const MANIFEST_VERSION: u32 = 3;

pub const INDEX_FILENAME: &str = "feed-manifest.json";

/// Default length of `descriptionShort`, in characters
pub const SHORT_DESCRIPTION_CHARS: usize = 150;

const ELLIPSIS: char = '…';

/// The slice of an episode a client needs to list it. Full descriptions
/// and inline chapters stay in the raw feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEpisode {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub link: String,
    pub date_text: String,
    pub channel_title: String,
    pub duration_sec: Option<u64>,
    pub media: Option<Media>,
    pub chapters_external: Option<ExternalChapters>,
    pub transcripts: Vec<Transcript>,
    pub transcripts_all: Vec<Transcript>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_short: Option<String>,
}

impl From<&Episode> for ManifestEpisode {
    fn from(episode: &Episode) -> Self {
        let description_short = Some(short_description(
            &episode.description_html,
            SHORT_DESCRIPTION_CHARS,
        ))
        .filter(|s| !s.is_empty());

        Self {
            id: episode.id.clone(),
            slug: episode.slug.clone(),
            title: episode.title.clone(),
            link: episode.link.clone(),
            date_text: episode.date_text.clone(),
            channel_title: episode.channel_title.clone(),
            duration_sec: episode.duration_sec,
            media: episode.media.clone(),
            chapters_external: episode.chapters_external.clone(),
            transcripts: episode.transcripts.clone(),
            transcripts_all: episode.transcripts_all.clone(),
            description_short,
        }
    }
}

/// One feed's episodes within a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFeed {
    pub id: String,
    pub episodes: Vec<ManifestEpisode>,
}

/// Contents of one `feed-manifest-<window>.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestChunk {
    pub feeds: Vec<ChunkFeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFeed {
    pub id: String,
    pub title: String,
    /// Same-origin copy when the feed was cached, else the remote URL
    pub url: String,
    pub features: FeedFeatures,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub url: String,
}

/// The entry point a client fetches first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestIndex {
    pub version: u32,
    pub base_path: String,
    pub feeds: Vec<IndexFeed>,
    pub chunks: Vec<ChunkRef>,
}

/// `/`-delimited base path: `vod` and `/vod` both become `/vod/`
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// Plain-text teaser of an HTML description: tags dropped, entities
/// decoded, whitespace collapsed, cut on a word boundary.
pub fn short_description(html: &str, max_chars: usize) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = html_escape::decode_html_entities(&text);
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let cut: String = collapsed.chars().take(max_chars).collect();
    let cut = match cut.rfind(' ') {
        Some(space) if space > 0 => &cut[..space],
        _ => cut.as_str(),
    };
    let mut short = cut.trim_end_matches([' ', ',', ';', ':', '.']).to_string();
    short.push(ELLIPSIS);
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_path_is_slash_delimited() {
        assert_eq!(normalize_base_path(""), "/");
        assert_eq!(normalize_base_path("/"), "/");
        assert_eq!(normalize_base_path("vod"), "/vod/");
        assert_eq!(normalize_base_path("/vod"), "/vod/");
        assert_eq!(normalize_base_path(" vod/ "), "/vod/");
        assert_eq!(normalize_base_path("/a/b/"), "/a/b/");
    }

    #[test]
    fn short_description_strips_markup() {
        let html = "<p>Hello&nbsp;<b>world</b> &amp;\n\n friends</p>";
        assert_eq!(short_description(html, 150), "Hello world & friends");
    }

    #[test]
    fn short_description_cuts_on_word_boundary() {
        let html = "one two three four five";
        assert_eq!(short_description(html, 12), "one two…");
        assert!(short_description(&"word ".repeat(100), 150).chars().count() <= 151);
    }

    #[test]
    fn short_description_of_single_long_word() {
        let short = short_description(&"x".repeat(20), 10);
        assert_eq!(short, format!("{}…", "x".repeat(10)));
    }

    #[test]
    fn manifest_episode_keeps_client_fields() {
        let episode = Episode {
            id: "g".to_string(),
            slug: "s".to_string(),
            title: "T".to_string(),
            date_text: "2024-01-02".to_string(),
            description_html: "<p>Notes</p>".to_string(),
            duration_sec: Some(330),
            ..Default::default()
        };

        let json = serde_json::to_value(ManifestEpisode::from(&episode)).unwrap();

        assert_eq!(json["dateText"], "2024-01-02");
        assert_eq!(json["durationSec"], 330);
        assert_eq!(json["descriptionShort"], "Notes");
        assert!(json["media"].is_null());
        assert!(json.get("descriptionHtml").is_none());
        assert!(json.get("chaptersInline").is_none());
    }

    #[test]
    fn empty_description_is_omitted() {
        let json = serde_json::to_value(ManifestEpisode::from(&Episode::default())).unwrap();
        assert!(json.get("descriptionShort").is_none());
    }

    #[test]
    fn index_uses_camel_case_base_path() {
        let index = ManifestIndex {
            version: MANIFEST_VERSION,
            base_path: "/".to_string(),
            feeds: Vec::new(),
            chunks: vec![ChunkRef {
                url: "/feed-manifest-2024.json".to_string(),
            }],
        };
        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json["version"], 3);
        assert_eq!(json["basePath"], "/");
        assert_eq!(json["chunks"][0]["url"], "/feed-manifest-2024.json");
    }
}
