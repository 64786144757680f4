// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Maximum length of the date+title part of a slug
const MAX_SLUG_BASE_LENGTH: usize = 72;

/// Length of the hash suffix
const HASH_LENGTH: usize = 6;

const FNV_OFFSET_BASIS: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Lowercase ASCII slug: diacritics stripped, everything outside `[a-z0-9]`
/// collapsed into single dashes, no leading or trailing dash.
pub fn slugify(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let mut slug = String::with_capacity(folded.len());
    let mut last_was_separator = true;
    for c in folded.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
            last_was_separator = false;
        } else if !last_was_separator {
            slug.push('-');
            last_was_separator = true;
        }
    }

    slug.trim_end_matches('-').to_string()
}

/// 32-bit FNV-1a over the string's code points
pub fn fnv1a32(s: &str) -> u32 {
    s.chars().fold(FNV_OFFSET_BASIS, |hash, c| {
        (hash ^ c as u32).wrapping_mul(FNV_PRIME)
    })
}

pub fn base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn short_hash(s: &str) -> String {
    base36(fnv1a32(s)).chars().take(HASH_LENGTH).collect()
}

/// Deterministic episode slug: `[date-]title`, truncated, plus a hash of the
/// episode id (or the title when the id is empty).
pub fn episode_slug(title: &str, date_text: &str, episode_id: &str) -> String {
    let title_slug = slugify(title);
    let mut base = if date_text.is_empty() {
        title_slug
    } else {
        format!("{date_text}-{title_slug}")
    };
    if base.is_empty() {
        base = "episode".to_string();
    }

    let hash_source = [episode_id, title, base.as_str()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or_default();
    let hash = short_hash(hash_source);

    let truncated: String = base.chars().take(MAX_SLUG_BASE_LENGTH).collect();
    format!("{truncated}-{hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_collapses() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  --a - - - b--  "), "a-b");
        assert_eq!(slugify("Episode 42"), "episode-42");
    }

    #[test]
    fn slugify_strips_diacritics() {
        assert_eq!(slugify("Café Crème"), "cafe-creme");
        assert_eq!(slugify("  Ünïcödé -- Test__42 "), "unicode-test-42");
    }

    #[test]
    fn slugify_drops_symbols_and_emoji() {
        assert_eq!(slugify("Hello 🎙️ World"), "hello-world");
        assert_eq!(slugify(":::///"), "");
    }

    #[test]
    fn fnv1a_matches_reference_values() {
        assert_eq!(fnv1a32(""), 0x811C_9DC5);
        assert_eq!(fnv1a32("a"), 3_826_002_220);
    }

    #[test]
    fn base36_encodes() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(u32::MAX), "1z141z3");
    }

    #[test]
    fn slug_combines_date_title_and_hash() {
        assert_eq!(
            episode_slug("Hello, World!", "2024-01-15", "guid-1"),
            "2024-01-15-hello-world-73wl0m"
        );
    }

    #[test]
    fn slug_hashes_title_when_id_missing() {
        assert_eq!(episode_slug("Café Crème", "", ""), "cafe-creme-1qdao0");
        assert_eq!(episode_slug("", "", ""), "episode-1uvl0b");
    }

    #[test]
    fn slug_is_deterministic() {
        let a = episode_slug("Weekly Update", "2024-02-01", "id-7");
        let b = episode_slug("Weekly Update", "2024-02-01", "id-7");
        assert_eq!(a, b);
    }

    #[test]
    fn same_title_different_ids_do_not_collide() {
        let a = episode_slug("Weekly Update", "2024-02-01", "guid-1");
        let b = episode_slug("Weekly Update", "2024-02-01", "guid-2");
        assert_ne!(a, b);
        assert!(a.ends_with("-73wl0m"));
        assert!(b.ends_with("-6twzbn"));
    }

    #[test]
    fn long_titles_are_truncated_before_the_hash() {
        let title = "word ".repeat(40);
        let slug = episode_slug(&title, "2024-01-01", "x");
        let (base, hash) = slug.rsplit_once('-').unwrap();

        assert_eq!(base.chars().count(), MAX_SLUG_BASE_LENGTH);
        assert_eq!(hash.len(), HASH_LENGTH);
    }
}
