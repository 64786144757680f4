// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

/// Feed-level capabilities, derived from a full parse and never stored on
/// their own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedFeatures {
    pub has_transcript: bool,
    pub has_playable_transcript: bool,
    pub has_chapters: bool,
    pub has_video: bool,
}

/// Result of parsing one feed document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub features: FeedFeatures,
    pub channel_title: String,
    pub episodes: Vec<Episode>,
}

/// A normalized episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub link: String,
    /// `YYYY-MM-DD`, or empty when the feed gives no usable date
    pub date_text: String,
    /// Raw markup, sanitized by the consumer
    pub description_html: String,
    pub channel_title: String,
    pub duration_sec: Option<u64>,
    pub media: Option<Media>,
    pub chapters_inline: Option<Vec<Chapter>>,
    pub chapters_external: Option<ExternalChapters>,
    /// Playable transcripts only
    pub transcripts: Vec<Transcript>,
    pub transcripts_all: Vec<Transcript>,
}

/// The enclosure picked for an episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub url: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub bytes: Option<u64>,
    /// Any candidate of the item was video-like
    pub has_video_in_feed: bool,
    /// The picked candidate is video-like
    pub picked_is_video: bool,
}

/// An inline (Podlove simple chapters) chapter mark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Start offset in seconds
    pub t: u64,
    pub name: String,
}

/// A podcast-namespace chapters document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalChapters {
    pub url: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub url: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub lang: String,
    pub is_captions: bool,
    pub is_playable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_serializes_with_client_field_names() {
        let episode = Episode {
            id: "guid-1".to_string(),
            slug: "2024-01-15-hello-abc123".to_string(),
            title: "Hello".to_string(),
            date_text: "2024-01-15".to_string(),
            duration_sec: Some(330),
            media: Some(Media {
                url: "https://example.com/a.mp4".to_string(),
                mime_type: "video/mp4".to_string(),
                bytes: None,
                has_video_in_feed: true,
                picked_is_video: true,
            }),
            ..Default::default()
        };

        let json = serde_json::to_value(&episode).unwrap();
        assert_eq!(json["dateText"], "2024-01-15");
        assert_eq!(json["durationSec"], 330);
        assert_eq!(json["media"]["type"], "video/mp4");
        assert_eq!(json["media"]["pickedIsVideo"], true);
        assert!(json["chaptersInline"].is_null());
        assert!(json["transcriptsAll"].as_array().unwrap().is_empty());
    }

    #[test]
    fn features_default_to_false() {
        let json = serde_json::to_value(FeedFeatures::default()).unwrap();
        assert_eq!(json["hasPlayableTranscript"], false);
        assert_eq!(json["hasVideo"], false);
    }
}
