// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;

use serde::Serialize;

use super::record::{ChunkFeed, ManifestEpisode};
use crate::error::PersistError;
use crate::persist::to_json_bytes;

/// Serialized size a chunk should stay within
pub const DEFAULT_CHUNK_BUDGET: usize = 400_000;

/// Date partition of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    Year(i32),
    Quarter(i32, u32),
    Month(i32, u32),
}

impl DateWindow {
    pub fn filename(&self) -> String {
        match self {
            DateWindow::Year(y) => format!("feed-manifest-{y}.json"),
            DateWindow::Quarter(y, q) => format!("feed-manifest-{y}-q{q}.json"),
            DateWindow::Month(y, m) => format!("feed-manifest-{y}-{m:02}.json"),
        }
    }

    fn contains(&self, key: DateKey) -> bool {
        match *self {
            DateWindow::Year(y) => key.year == y,
            DateWindow::Quarter(y, q) => key.year == y && key.quarter() == q,
            DateWindow::Month(y, m) => key.year == y && key.month == m,
        }
    }
}

/// Where an episode falls in the date hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateKey {
    pub year: i32,
    /// 1..=12
    pub month: u32,
}

impl DateKey {
    /// Key of a `YYYY-MM-DD` date; missing or malformed parts fall back to
    /// `current_year` and January.
    pub fn from_date_text(date_text: &str, current_year: i32) -> Self {
        let year = date_text.get(..4).and_then(|y| y.parse::<i32>().ok());
        let Some(year) = year else {
            return Self {
                year: current_year,
                month: 1,
            };
        };
        let month = date_text
            .get(5..7)
            .and_then(|m| m.parse::<u32>().ok())
            .unwrap_or(1)
            .clamp(1, 12);
        Self { year, month }
    }

    pub fn quarter(&self) -> u32 {
        (self.month - 1) / 3 + 1
    }
}

/// A serialized chunk ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub window: DateWindow,
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Serialize)]
struct ChunkView<'a> {
    feeds: Vec<ChunkFeedView<'a>>,
}

#[derive(Serialize)]
struct ChunkFeedView<'a> {
    id: &'a str,
    episodes: Vec<&'a ManifestEpisode>,
}

struct Keyed<'a> {
    id: &'a str,
    episodes: Vec<(&'a ManifestEpisode, DateKey)>,
}

/// Split feeds into date-windowed chunks.
///
/// Years are taken newest first. A year over `budget` is split into
/// quarters, a quarter over budget into months. Months are emitted even
/// when they exceed the budget. Empty windows produce no chunk, and every
/// episode lands in exactly one chunk.
pub fn partition(
    feeds: &[ChunkFeed],
    budget: usize,
    current_year: i32,
) -> Result<Vec<Chunk>, PersistError> {
    let keyed: Vec<Keyed<'_>> = feeds
        .iter()
        .map(|feed| Keyed {
            id: &feed.id,
            episodes: feed
                .episodes
                .iter()
                .map(|ep| (ep, DateKey::from_date_text(&ep.date_text, current_year)))
                .collect(),
        })
        .collect();

    let years: BTreeSet<i32> = keyed
        .iter()
        .flat_map(|feed| feed.episodes.iter().map(|(_, key)| key.year))
        .collect();

    let mut chunks = Vec::new();
    for &year in years.iter().rev() {
        let window = DateWindow::Year(year);
        let bytes = render(&keyed, window)?;
        if bytes.len() <= budget {
            push_chunk(&mut chunks, window, bytes);
            continue;
        }

        for quarter in 1..=4 {
            let window = DateWindow::Quarter(year, quarter);
            let Some(bytes) = render_non_empty(&keyed, window)? else {
                continue;
            };
            if bytes.len() <= budget {
                push_chunk(&mut chunks, window, bytes);
                continue;
            }

            for month in (quarter - 1) * 3 + 1..=quarter * 3 {
                let window = DateWindow::Month(year, month);
                if let Some(bytes) = render_non_empty(&keyed, window)? {
                    if bytes.len() > budget {
                        tracing::warn!(
                            file = %window.filename(),
                            bytes = bytes.len(),
                            budget,
                            "month chunk exceeds budget"
                        );
                    }
                    push_chunk(&mut chunks, window, bytes);
                }
            }
        }
    }

    Ok(chunks)
}

fn push_chunk(chunks: &mut Vec<Chunk>, window: DateWindow, bytes: Vec<u8>) {
    chunks.push(Chunk {
        window,
        filename: window.filename(),
        bytes,
    });
}

fn select<'a>(keyed: &'a [Keyed<'a>], window: DateWindow) -> ChunkView<'a> {
    let feeds = keyed
        .iter()
        .map(|feed| ChunkFeedView {
            id: feed.id,
            episodes: feed
                .episodes
                .iter()
                .filter(|(_, key)| window.contains(*key))
                .map(|(ep, _)| *ep)
                .collect(),
        })
        .filter(|feed| !feed.episodes.is_empty())
        .collect();
    ChunkView { feeds }
}

fn render(keyed: &[Keyed<'_>], window: DateWindow) -> Result<Vec<u8>, PersistError> {
    to_json_bytes(&select(keyed, window))
}

fn render_non_empty(keyed: &[Keyed<'_>], window: DateWindow) -> Result<Option<Vec<u8>>, PersistError> {
    let view = select(keyed, window);
    if view.feeds.is_empty() {
        return Ok(None);
    }
    to_json_bytes(&view).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::record::ManifestChunk;

    fn episode(id: &str, date_text: &str, padding: usize) -> ManifestEpisode {
        ManifestEpisode {
            id: id.to_string(),
            slug: id.to_string(),
            title: id.to_string(),
            link: String::new(),
            date_text: date_text.to_string(),
            channel_title: "Show".to_string(),
            duration_sec: None,
            media: None,
            chapters_external: None,
            transcripts: Vec::new(),
            transcripts_all: Vec::new(),
            description_short: Some("x".repeat(padding)),
        }
    }

    fn feed(id: &str, episodes: Vec<ManifestEpisode>) -> ChunkFeed {
        ChunkFeed {
            id: id.to_string(),
            episodes,
        }
    }

    fn ids(chunk: &Chunk) -> Vec<String> {
        let parsed: ManifestChunk = serde_json::from_slice(&chunk.bytes).unwrap();
        parsed
            .feeds
            .iter()
            .flat_map(|f| f.episodes.iter().map(|e| e.id.clone()))
            .collect()
    }

    #[test]
    fn date_keys() {
        assert_eq!(DateKey::from_date_text("2024-05-17", 2030), DateKey { year: 2024, month: 5 });
        assert_eq!(DateKey::from_date_text("2024", 2030), DateKey { year: 2024, month: 1 });
        assert_eq!(DateKey::from_date_text("", 2030), DateKey { year: 2030, month: 1 });
        assert_eq!(DateKey::from_date_text("2024-00-01", 2030).month, 1);
        assert_eq!(DateKey::from_date_text("2024-11-01", 2030).quarter(), 4);
    }

    #[test]
    fn window_filenames() {
        assert_eq!(DateWindow::Year(2024).filename(), "feed-manifest-2024.json");
        assert_eq!(DateWindow::Quarter(2024, 2).filename(), "feed-manifest-2024-q2.json");
        assert_eq!(DateWindow::Month(2024, 3).filename(), "feed-manifest-2024-03.json");
    }

    #[test]
    fn small_dataset_yields_one_chunk_per_year_newest_first() {
        let feeds = vec![
            feed("a", vec![episode("a1", "2024-03-01", 10), episode("a2", "2023-07-01", 10)]),
            feed("b", vec![episode("b1", "2024-12-01", 10)]),
        ];

        let chunks = partition(&feeds, DEFAULT_CHUNK_BUDGET, 2030).unwrap();

        let names: Vec<&str> = chunks.iter().map(|c| c.filename.as_str()).collect();
        assert_eq!(names, vec!["feed-manifest-2024.json", "feed-manifest-2023.json"]);
        assert_eq!(ids(&chunks[0]), vec!["a1", "b1"]);
        assert_eq!(ids(&chunks[1]), vec!["a2"]);
    }

    #[test]
    fn feeds_without_episodes_in_window_are_left_out() {
        let feeds = vec![
            feed("a", vec![episode("a1", "2024-03-01", 10)]),
            feed("b", vec![episode("b1", "2023-03-01", 10)]),
            feed("empty", Vec::new()),
        ];

        let chunks = partition(&feeds, DEFAULT_CHUNK_BUDGET, 2030).unwrap();
        let parsed: ManifestChunk = serde_json::from_slice(&chunks[0].bytes).unwrap();

        assert_eq!(parsed.feeds.len(), 1);
        assert_eq!(parsed.feeds[0].id, "a");
    }

    #[test]
    fn oversized_year_splits_into_quarters_then_months() {
        let feeds = vec![feed(
            "a",
            vec![
                episode("jan", "2024-01-10", 3000),
                episode("feb", "2024-02-10", 3000),
                episode("may", "2024-05-10", 100),
            ],
        )];

        let chunks = partition(&feeds, 5000, 2030).unwrap();

        let names: Vec<&str> = chunks.iter().map(|c| c.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "feed-manifest-2024-01.json",
                "feed-manifest-2024-02.json",
                "feed-manifest-2024-q2.json",
            ]
        );
    }

    #[test]
    fn chunks_respect_budget_except_months() {
        let episodes: Vec<ManifestEpisode> = (0..60)
            .map(|i| episode(&format!("e{i}"), &format!("20{:02}-{:02}-01", 20 + i % 5, i % 12 + 1), 400 + i * 37))
            .collect();
        let feeds = vec![feed("a", episodes[..30].to_vec()), feed("b", episodes[30..].to_vec())];
        let budget = 6000;

        let chunks = partition(&feeds, budget, 2030).unwrap();

        for chunk in &chunks {
            if !matches!(chunk.window, DateWindow::Month(..)) {
                assert!(chunk.bytes.len() <= budget, "{} too large", chunk.filename);
            }
        }

        let mut all: Vec<String> = chunks.iter().flat_map(ids).collect();
        all.sort();
        let mut expected: Vec<String> = (0..60).map(|i| format!("e{i}")).collect();
        expected.sort();
        assert_eq!(all, expected);
    }

    #[test]
    fn single_oversized_month_is_still_emitted() {
        let feeds = vec![feed("a", vec![episode("big", "2024-04-01", 10_000)])];
        let chunks = partition(&feeds, 1000, 2030).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].window, DateWindow::Month(2024, 4));
        assert!(chunks[0].bytes.len() > 1000);
    }

    #[test]
    fn undated_episodes_use_current_year() {
        let feeds = vec![feed("a", vec![episode("u", "", 1)])];
        let chunks = partition(&feeds, DEFAULT_CHUNK_BUDGET, 2031).unwrap();
        assert_eq!(chunks[0].filename, "feed-manifest-2031.json");
    }

    #[test]
    fn no_episodes_means_no_chunks() {
        assert!(partition(&[], DEFAULT_CHUNK_BUDGET, 2030).unwrap().is_empty());
    }

    #[test]
    fn chunk_bytes_are_pretty_json_with_newline() {
        let feeds = vec![feed("a", vec![episode("a1", "2024-01-01", 1)])];
        let chunks = partition(&feeds, DEFAULT_CHUNK_BUDGET, 2030).unwrap();
        let text = std::str::from_utf8(&chunks[0].bytes).unwrap();

        assert!(text.starts_with("{\n  \"feeds\""));
        assert!(text.ends_with("}\n"));
    }
}
