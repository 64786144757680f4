// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Movie header (`mvhd`) extraction from partial MP4 reads.
//!
//! ```text
//! offset  size  field
//!  0      4     box size
//!  4      4     "mvhd"
//!  8      1     version
//!  9      3     flags
//!  v0: 12 creation(4) 16 modification(4) 20 timescale(4) 24 duration(4)
//!  v1: 12 creation(8) 20 modification(8) 28 timescale(4) 32 duration(8)
//! ```

use std::ops::RangeInclusive;

use super::plausible_seconds;
use crate::error::ProbeError;

const MVHD: &[u8; 4] = b"mvhd";

/// Smallest window read from either end of a file
pub const MIN_WINDOW_BYTES: u64 = 64 * 1024;

/// Bytes taken from each side when joining head and tail windows
const BOUNDARY_BYTES: usize = 64 * 1024;

/// Smallest `mvhd` box that can hold a version 0 header
const MIN_BOX_SIZE: u64 = 32;

/// URLs that look like progressive MP4/QuickTime files
pub fn is_mp4_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or("").to_ascii_lowercase();
    [".mp4", ".m4v", ".mov"].iter().any(|ext| path.ends_with(ext))
}

/// Inclusive byte ranges for the head and tail windows of a file of
/// `total` bytes. The window is at least [`MIN_WINDOW_BYTES`], at most
/// `max_probe_bytes`, and never ranges past the end of the file.
pub fn probe_windows(total: u64, max_probe_bytes: u64) -> (RangeInclusive<u64>, RangeInclusive<u64>) {
    let last = total.saturating_sub(1);
    let window = max_probe_bytes.min(total).max(MIN_WINDOW_BYTES);
    let head = 0..=last.min(window - 1);
    let tail = total.saturating_sub(window)..=last;
    (head, tail)
}

/// Tail of `head` joined with the start of `tail`, for a box that straddles
/// the two windows
pub fn boundary_blob(head: &[u8], tail: &[u8]) -> Vec<u8> {
    if head.is_empty() || tail.is_empty() {
        return Vec::new();
    }
    let head_part = &head[head.len().saturating_sub(BOUNDARY_BYTES)..];
    let tail_part = &tail[..tail.len().min(BOUNDARY_BYTES)];
    [head_part, tail_part].concat()
}

/// First plausible duration across head, tail and boundary blobs
pub fn duration_from_windows(head: &[u8], tail: &[u8]) -> Result<u64, ProbeError> {
    let boundary = boundary_blob(head, tail);
    let mut last_error = ProbeError::NotFound;

    for blob in [head, tail, boundary.as_slice()] {
        match duration_from_mvhd(blob) {
            Ok(seconds) => return Ok(seconds),
            Err(e @ ProbeError::Implausible { .. }) => last_error = e,
            Err(_) => {}
        }
    }
    Err(last_error)
}

/// Scan raw bytes for an `mvhd` box and return its duration in whole seconds.
///
/// Every occurrence of the tag is tried; the first one yielding a duration
/// in `(0, 86400)` wins.
pub fn duration_from_mvhd(blob: &[u8]) -> Result<u64, ProbeError> {
    let mut last_error = ProbeError::NotFound;

    for tag_offset in find_all(blob, MVHD) {
        let Some(seconds) = read_mvhd(blob, tag_offset) else {
            continue;
        };
        match plausible_seconds(seconds) {
            Ok(seconds) => return Ok(seconds),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

/// Raw `duration / timescale` of the box whose tag sits at `tag_offset`
fn read_mvhd(blob: &[u8], tag_offset: usize) -> Option<f64> {
    let box_start = tag_offset.checked_sub(4)?;
    let size = u64::from(be_u32(blob, box_start)?);
    if size < MIN_BOX_SIZE || box_start as u64 + size > blob.len() as u64 {
        return None;
    }

    let version_offset = tag_offset + 4;
    let (timescale, duration) = match *blob.get(version_offset)? {
        0 => (
            be_u32(blob, version_offset + 12)?,
            u64::from(be_u32(blob, version_offset + 16)?),
        ),
        1 => (
            be_u32(blob, version_offset + 20)?,
            be_u64(blob, version_offset + 24)?,
        ),
        _ => return None,
    };

    if timescale == 0 {
        return None;
    }
    Some(duration as f64 / f64::from(timescale))
}

fn be_u32(blob: &[u8], offset: usize) -> Option<u32> {
    let bytes = blob.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes(bytes.try_into().ok()?))
}

fn be_u64(blob: &[u8], offset: usize) -> Option<u64> {
    let bytes = blob.get(offset..offset.checked_add(8)?)?;
    Some(u64::from_be_bytes(bytes.try_into().ok()?))
}

fn find_all<'a>(haystack: &'a [u8], needle: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(move |(_, window)| *window == needle)
        .map(|(offset, _)| offset)
}
