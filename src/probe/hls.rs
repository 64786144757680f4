// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::plausible_seconds;
use crate::error::ProbeError;

const HEADER_TAG: &str = "#EXTM3U";
const ENDLIST_TAG: &str = "#EXT-X-ENDLIST";
const SEGMENT_TAG: &str = "#EXTINF:";

pub fn is_hls_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or("");
    path.to_ascii_lowercase().ends_with(".m3u8")
}

/// Total duration of a VOD media playlist.
///
/// Live and event playlists without `#EXT-X-ENDLIST` have no total and are
/// rejected, as are master playlists (no segments).
pub fn playlist_duration(text: &str) -> Result<u64, ProbeError> {
    if !text.contains(HEADER_TAG) || !text.contains(ENDLIST_TAG) {
        return Err(ProbeError::NotFound);
    }

    let total: f64 = text
        .lines()
        .filter_map(|line| line.trim().strip_prefix(SEGMENT_TAG))
        .filter_map(|rest| rest.split(',').next())
        .filter_map(|seconds| seconds.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .sum();

    plausible_seconds(total)
}
