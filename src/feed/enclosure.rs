// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::episode::Media;

/// Extensions that mark a URL as progressive video
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "webm"];

/// A media reference declared by an item, before selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    /// Lowercased MIME type, possibly empty
    pub mime_type: String,
    pub length: Option<u64>,
}

impl Candidate {
    pub fn new(url: &str, mime_type: &str, length: &str) -> Self {
        Self {
            url: url.trim().to_string(),
            mime_type: mime_type.trim().to_lowercase(),
            length: length.trim().parse::<u64>().ok().filter(|n| *n > 0),
        }
    }

    /// Additive preference score; higher wins
    pub fn score(&self) -> u32 {
        let url = self.url.to_lowercase();
        let mut score = 0;
        if self.mime_type.starts_with("video/") {
            score += 50;
        }
        if url.contains(".m3u8") {
            score += 45;
        }
        if has_extension(&url, VIDEO_EXTENSIONS) {
            score += 40;
        }
        if self.mime_type.contains("mpegurl") {
            score += 35;
        }
        if self.mime_type.starts_with("audio/") {
            score += 5;
        }
        score
    }

    pub fn is_video(&self) -> bool {
        is_video_enclosure(&self.url, &self.mime_type)
    }
}

/// True when `url` ends with `.ext` or has `.ext` directly before a query.
///
/// Expects an already lowercased URL.
pub fn has_extension(url: &str, extensions: &[&str]) -> bool {
    extensions.iter().any(|ext| {
        let dotted = format!(".{ext}");
        url.ends_with(&dotted) || url.contains(&format!("{dotted}?"))
    })
}

/// Whether a URL/MIME pair points at video (progressive or HLS)
pub fn is_video_enclosure(url: &str, mime_type: &str) -> bool {
    let url = url.to_lowercase();
    let mime_type = mime_type.to_lowercase();

    mime_type.starts_with("video/")
        || mime_type.contains("mpegurl")
        || has_extension(&url, &["m3u8"])
        || has_extension(&url, VIDEO_EXTENSIONS)
}

/// Pick the best candidate. Ties keep feed order, so the first one wins.
pub fn pick_best(candidates: &[Candidate]) -> Option<Media> {
    let usable: Vec<&Candidate> = candidates.iter().filter(|c| !c.url.is_empty()).collect();

    let mut best: Option<&Candidate> = None;
    for &candidate in &usable {
        if best.is_none_or(|b| candidate.score() > b.score()) {
            best = Some(candidate);
        }
    }
    let best = best?;

    Some(Media {
        url: best.url.clone(),
        mime_type: best.mime_type.clone(),
        bytes: best.length,
        has_video_in_feed: usable.iter().any(|c| c.is_video()),
        picked_is_video: best.is_video(),
    })
}
