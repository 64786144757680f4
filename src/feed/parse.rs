// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use super::enclosure::{Candidate, pick_best};
use super::episode::{
    Chapter, Episode, ExternalChapters, FeedFeatures, ParsedFeed, Transcript,
};
use super::slug::episode_slug;
use super::time::{parse_date_text, parse_time_to_seconds};
use super::xml::{Element, parse_document};
use crate::error::XmlError;

pub const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
pub const PODCAST_NS: &str = "https://podcastindex.org/namespace/1.0";
pub const PSC_NS: &str = "http://podlove.org/simple-chapters";
pub const MEDIA_NS: &str = "http://search.yahoo.com/mrss/";

const UNTITLED: &str = "(untitled)";

/// Upper bound for episode identifiers, in characters
const MAX_ID_LENGTH: usize = 240;

const DEFAULT_CHAPTERS_TYPE: &str = "application/json";
const DEFAULT_TRANSCRIPT_LANG: &str = "en";

/// Transcript MIME types a player can render as a text track
const PLAYABLE_TRANSCRIPT_TYPES: &[&str] = &[
    "text/vtt",
    "application/x-subrip",
    "application/srt",
    "text/srt",
];

/// Parse feed XML into features, channel title and episodes.
///
/// Never fails: a document that cannot be read degrades to no episodes,
/// all features off and `fallback_title` as channel title.
pub fn parse_feed(xml: &str, fallback_title: &str) -> ParsedFeed {
    match try_parse_feed(xml, fallback_title) {
        Ok(feed) => feed,
        Err(e) => {
            tracing::debug!(error = %e, "feed XML unreadable, treating as empty");
            empty_feed(fallback_title)
        }
    }
}

/// Like [`parse_feed`], but reports malformed XML instead of degrading.
pub fn try_parse_feed(xml: &str, fallback_title: &str) -> Result<ParsedFeed, XmlError> {
    let xml = xml.trim_start_matches('\u{feff}').trim();
    if xml.is_empty() {
        return Ok(empty_feed(fallback_title));
    }

    let root = parse_document(xml)?;
    let channel = root.child("channel");
    let is_atom = root.is("feed") || channel.is_none();

    let channel_title = first_title(channel.unwrap_or(&root))
        .map(str::to_string)
        .unwrap_or_else(|| fallback_title.to_string());

    let items: Vec<&Element> = match channel {
        Some(channel) if !is_atom => {
            let items: Vec<&Element> = channel.children_named("item").collect();
            if items.is_empty() {
                // RSS 1.0 keeps items next to the channel
                root.children_named("item").collect()
            } else {
                items
            }
        }
        _ => root.children_named("entry").collect(),
    };

    let mut features = FeedFeatures::default();
    let mut seen_slugs = HashSet::new();
    let mut episodes = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let mut episode = parse_item(item, index + 1, is_atom, &channel_title);

        features.has_video |= episode.media.as_ref().is_some_and(|m| m.has_video_in_feed);
        features.has_chapters |=
            episode.chapters_inline.is_some() || episode.chapters_external.is_some();
        features.has_transcript |= !episode.transcripts_all.is_empty();
        features.has_playable_transcript |= !episode.transcripts.is_empty();

        episode.slug = dedupe_slug(&mut seen_slugs, episode.slug);
        episodes.push(episode);
    }

    Ok(ParsedFeed {
        features,
        channel_title,
        episodes,
    })
}

fn empty_feed(fallback_title: &str) -> ParsedFeed {
    ParsedFeed {
        channel_title: fallback_title.to_string(),
        ..Default::default()
    }
}

fn parse_item(item: &Element, index: usize, is_atom: bool, channel_title: &str) -> Episode {
    let title = first_title(item).unwrap_or(UNTITLED).to_string();
    let link = item_link(item, is_atom);
    let date_text = ["pubDate", "published", "updated", "date"]
        .iter()
        .map(|tag| item.child_text(tag))
        .find(|s| !s.is_empty())
        .map(parse_date_text)
        .unwrap_or_default();

    let media = pick_best(&enclosure_candidates(item, is_atom));
    let (transcripts_all, transcripts) = transcripts(item);

    let id = [
        item.child_text("id"),
        item.child_text("guid"),
        media.as_ref().map(|m| m.url.as_str()).unwrap_or(""),
        link.as_str(),
    ]
    .into_iter()
    .find(|s| !s.is_empty())
    .map(str::to_string)
    .unwrap_or_else(|| format!("{title}#{index}"));
    let id: String = id.chars().take(MAX_ID_LENGTH).collect();

    Episode {
        slug: episode_slug(&title, &date_text, &id),
        id,
        title,
        link,
        date_text,
        description_html: description(item),
        channel_title: channel_title.to_string(),
        duration_sec: duration(item),
        media,
        chapters_inline: inline_chapters(item),
        chapters_external: external_chapters(item),
        transcripts,
        transcripts_all,
    }
}

fn is_media_ns(el: &Element) -> bool {
    el.namespace_contains("mrss") || el.namespace.eq_ignore_ascii_case("media")
}

fn is_itunes_ns(el: &Element) -> bool {
    el.namespace == ITUNES_NS || el.namespace_contains("itunes")
}

fn is_podcast_ns(el: &Element) -> bool {
    el.namespace == PODCAST_NS
        || el.namespace_contains("podcastindex.org/namespace")
        || el.namespace.eq_ignore_ascii_case("podcast")
}

fn is_psc_ns(el: &Element) -> bool {
    el.namespace == PSC_NS
        || el.namespace_contains("podlove.org/simple-chapters")
        || el.namespace.eq_ignore_ascii_case("psc")
}

/// First non-empty `title` child outside the media namespace
fn first_title(el: &Element) -> Option<&str> {
    el.children_named("title")
        .filter(|t| !is_media_ns(t))
        .map(Element::text)
        .find(|s| !s.is_empty())
}

fn item_link(item: &Element, is_atom: bool) -> String {
    if is_atom {
        let links: Vec<&Element> = item.children_named("link").collect();
        let by_rel = |wanted: &str| {
            links
                .iter()
                .find(|l| l.attr("rel").eq_ignore_ascii_case(wanted) && !l.attr("href").is_empty())
                .map(|l| l.attr("href"))
        };
        if let Some(href) = by_rel("alternate").or_else(|| by_rel("")) {
            return href.to_string();
        }
    }

    item.children_named("link")
        .map(Element::text)
        .find(|s| !s.is_empty())
        .unwrap_or("")
        .to_string()
}

fn description(item: &Element) -> String {
    if let Some(encoded) = item
        .children_named("encoded")
        .map(Element::text)
        .find(|s| !s.is_empty())
    {
        return encoded.to_string();
    }

    let atom_content = item
        .children_named("content")
        .filter(|c| !is_media_ns(c))
        .map(Element::text)
        .find(|s| !s.is_empty());

    atom_content
        .or_else(|| Some(item.child_text("description")).filter(|s| !s.is_empty()))
        .or_else(|| Some(item.child_text("summary")).filter(|s| !s.is_empty()))
        .unwrap_or("")
        .to_string()
}

fn duration(item: &Element) -> Option<u64> {
    let el = item
        .children_named("duration")
        .find(|d| is_itunes_ns(d))?;
    let raw = Some(el.text()).filter(|s| !s.is_empty()).unwrap_or(el.attr("value"));
    parse_time_to_seconds(raw).filter(|s| *s > 0)
}

fn enclosure_candidates(item: &Element, is_atom: bool) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = item
        .children_named("enclosure")
        .map(|e| Candidate::new(e.attr("url"), e.attr("type"), e.attr("length")))
        .collect();

    if is_atom {
        for link in item.children_named("link") {
            let rel = link.attr("rel").to_ascii_lowercase();
            let mime = link.attr("type").to_ascii_lowercase();
            let is_enclosure = rel == "enclosure"
                || (rel.is_empty() && (mime.starts_with("audio/") || mime.starts_with("video/")));
            if is_enclosure && !link.attr("href").is_empty() {
                candidates.push(Candidate::new(
                    link.attr("href"),
                    link.attr("type"),
                    link.attr("length"),
                ));
            }
        }
    }

    let groups = item.children_named("group").filter(|g| is_media_ns(g));
    let media_contents = item
        .children_named("content")
        .chain(groups.flat_map(|g| g.children_named("content")))
        .filter(|c| is_media_ns(c));
    for content in media_contents {
        let length = Some(content.attr("fileSize"))
            .filter(|s| !s.is_empty())
            .unwrap_or(content.attr("length"));
        candidates.push(Candidate::new(content.attr("url"), content.attr("type"), length));
    }

    candidates
}

fn inline_chapters(item: &Element) -> Option<Vec<Chapter>> {
    let chapters: Vec<Chapter> = item
        .children_named("chapters")
        .filter(|c| is_psc_ns(c))
        .flat_map(|c| c.children_named("chapter"))
        .filter_map(|ch| {
            let t = parse_time_to_seconds(ch.attr("start"))?;
            let name = [ch.attr("title"), ch.text()]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or("Chapter");
            Some(Chapter {
                t,
                name: name.to_string(),
            })
        })
        .collect();

    if chapters.is_empty() { None } else { Some(chapters) }
}

fn external_chapters(item: &Element) -> Option<ExternalChapters> {
    let el = item
        .children_named("chapters")
        .find(|c| is_podcast_ns(c))?;
    let url = el.attr("url");
    if url.is_empty() {
        return None;
    }
    let mime_type = Some(el.attr("type"))
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CHAPTERS_TYPE);

    Some(ExternalChapters {
        url: url.to_string(),
        mime_type: mime_type.to_string(),
    })
}

/// Returns `(all, playable)`, both ordered playable-and-captioned first
fn transcripts(item: &Element) -> (Vec<Transcript>, Vec<Transcript>) {
    let mut all: Vec<Transcript> = item
        .children_named("transcript")
        .filter(|t| is_podcast_ns(t))
        .filter_map(|t| {
            let url = t.attr("url");
            let mime_type = t.attr("type").to_ascii_lowercase();
            if url.is_empty() || mime_type.is_empty() {
                return None;
            }
            let lang = Some(t.attr("language"))
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_TRANSCRIPT_LANG);
            Some(Transcript {
                url: url.to_string(),
                is_captions: t.attr("rel").eq_ignore_ascii_case("captions"),
                is_playable: PLAYABLE_TRANSCRIPT_TYPES.contains(&mime_type.as_str()),
                mime_type,
                lang: lang.to_string(),
            })
        })
        .collect();

    all.sort_by_key(|t| (!t.is_playable, !t.is_captions));
    let playable = all.iter().filter(|t| t.is_playable).cloned().collect();
    (all, playable)
}

fn dedupe_slug(seen: &mut HashSet<String>, slug: String) -> String {
    if seen.insert(slug.clone()) {
        return slug;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{slug}-{n}");
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
