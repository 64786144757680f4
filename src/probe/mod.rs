// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Size and duration probes that never download a whole media file.

mod cache;
mod hls;
mod mp4;

use std::ops::RangeInclusive;
use std::time::Duration;

use bytes::Bytes;

pub use cache::{
    DEFAULT_MAX_AGE, MEDIA_META_FILENAME, MediaMeta, MediaMetaCache, MediaMetaEntry,
};
pub use hls::{is_hls_url, playlist_duration};
pub use mp4::{duration_from_mvhd, duration_from_windows, is_mp4_url, probe_windows};

use crate::config::Defaults;
use crate::error::ProbeError;
use crate::feed::Episode;
use crate::http::{FetchRequest, HttpClient};

/// Durations at or above one day are treated as bogus metadata
pub const MAX_PLAUSIBLE_SECONDS: f64 = 86_400.0;

pub const DEFAULT_MAX_PROBE_BYTES: u64 = 1024 * 1024;

pub const DEFAULT_MAX_PLAYLIST_BYTES: u64 = 2 * 1024 * 1024;

/// Body cap for the one-byte range probe, in case the server ignores `Range`
const RANGE_PROBE_BODY_LIMIT: u64 = 64 * 1024;

/// Round to whole seconds, rejecting anything outside `(0, 86400)`
pub(crate) fn plausible_seconds(seconds: f64) -> Result<u64, ProbeError> {
    if seconds.is_finite() && seconds > 0.0 && seconds < MAX_PLAUSIBLE_SECONDS {
        let rounded = seconds.round() as u64;
        if rounded > 0 {
            return Ok(rounded);
        }
    }
    Err(ProbeError::Implausible { seconds })
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub timeout: Duration,
    pub user_agent: String,
    /// Upper bound for each MP4 head/tail window
    pub max_probe_bytes: u64,
    pub max_playlist_bytes: u64,
}

impl ProbeSettings {
    pub fn from_defaults(defaults: &Defaults) -> Self {
        Self {
            timeout: defaults.timeout(),
            user_agent: defaults.user_agent.clone(),
            max_probe_bytes: DEFAULT_MAX_PROBE_BYTES,
            max_playlist_bytes: DEFAULT_MAX_PLAYLIST_BYTES,
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::from_defaults(&Defaults::default())
    }
}

/// Best-effort media probes over an [`HttpClient`].
///
/// The `try_*` methods report why a probe failed; the plain methods log
/// the failure and return `None`.
pub struct MediaProber<'a, C: HttpClient + ?Sized> {
    client: &'a C,
    settings: ProbeSettings,
}

impl<'a, C: HttpClient + ?Sized> MediaProber<'a, C> {
    pub fn new(client: &'a C, settings: ProbeSettings) -> Self {
        Self { client, settings }
    }

    fn get(&self, url: &str) -> FetchRequest {
        FetchRequest::get(url, self.settings.timeout, &self.settings.user_agent)
    }

    /// Size from a `HEAD` request
    pub async fn try_content_length(&self, url: &str) -> Result<u64, ProbeError> {
        let request = FetchRequest::head(url, self.settings.timeout, &self.settings.user_agent);
        let response = self.client.fetch(&request).await?;
        if !response.is_success() {
            return Err(ProbeError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status,
            });
        }
        response
            .content_length
            .filter(|n| *n > 0)
            .ok_or(ProbeError::NotFound)
    }

    pub async fn content_length(&self, url: &str) -> Option<u64> {
        log_miss(url, "size", self.try_content_length(url).await)
    }

    /// Whether a one-byte range request is answered with `206`
    pub async fn supports_range(&self, url: &str) -> bool {
        let request = self
            .get(url)
            .with_range(0, 0)
            .with_max_body_bytes(RANGE_PROBE_BODY_LIMIT);
        match self.client.fetch(&request).await {
            Ok(response) => response.is_partial_content(),
            Err(e) => {
                tracing::debug!(url, error = %e, "range probe failed");
                false
            }
        }
    }

    async fn fetch_range(&self, url: &str, range: &RangeInclusive<u64>) -> Result<Bytes, ProbeError> {
        let (start, end) = (*range.start(), *range.end());
        let request = self
            .get(url)
            .with_range(start, end)
            .with_max_body_bytes(end - start + 1);
        let response = self.client.fetch(&request).await?;
        if !response.is_success() {
            return Err(ProbeError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status,
            });
        }
        response.body.ok_or(ProbeError::NotFound)
    }

    /// Duration from the `mvhd` box of a progressive MP4, using bounded
    /// range reads from the head and, if needed, the tail of the file.
    ///
    /// The file size always comes from the server; a feed's declared
    /// length is often wrong and would misplace the tail window.
    pub async fn try_mp4_duration(&self, url: &str) -> Result<u64, ProbeError> {
        if !is_mp4_url(url) {
            return Err(ProbeError::NotApplicable);
        }
        if !self.supports_range(url).await {
            return Err(ProbeError::NoRangeSupport {
                url: url.to_string(),
            });
        }

        let total = self.try_content_length(url).await?;
        let (head_range, tail_range) = probe_windows(total, self.settings.max_probe_bytes);

        let head = self.fetch_range(url, &head_range).await?;
        if let Ok(seconds) = duration_from_mvhd(&head) {
            return Ok(seconds);
        }

        let tail = if tail_range == head_range {
            head.clone()
        } else {
            self.fetch_range(url, &tail_range).await?
        };
        duration_from_windows(&head, &tail)
    }

    pub async fn mp4_duration(&self, url: &str) -> Option<u64> {
        log_miss(url, "mp4 duration", self.try_mp4_duration(url).await)
    }

    /// Duration of a VOD HLS playlist
    pub async fn try_hls_duration(&self, url: &str) -> Result<u64, ProbeError> {
        if !is_hls_url(url) {
            return Err(ProbeError::NotApplicable);
        }
        let request = self
            .get(url)
            .with_max_body_bytes(self.settings.max_playlist_bytes);
        let response = self.client.fetch(&request).await?;
        if !response.is_success() {
            return Err(ProbeError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status,
            });
        }
        let body = response.body.ok_or(ProbeError::NotFound)?;
        playlist_duration(&String::from_utf8_lossy(&body))
    }

    pub async fn hls_duration(&self, url: &str) -> Option<u64> {
        log_miss(url, "hls duration", self.try_hls_duration(url).await)
    }

    /// Fill in missing size and duration of an episode's media.
    ///
    /// Values already known from the feed or a fresh cache entry are never
    /// replaced. The cache is only updated when a probe found something
    /// new. Returns whether it did.
    pub async fn enrich(&self, episode: &mut Episode, cache: &mut MediaMetaCache, now: i64) -> bool {
        let Some(media) = episode.media.as_mut() else {
            return false;
        };
        let url = media.url.trim().to_string();
        if url.is_empty() {
            return false;
        }

        let cached = cache.get(&url, now).unwrap_or_default();
        let mut bytes = media.bytes.filter(|n| *n > 0).or(cached.bytes);
        let mut duration = episode.duration_sec.filter(|d| *d > 0).or(cached.duration_sec);
        let mut changed = false;

        let hls = is_hls_url(&url);
        // A playlist's length says nothing about the media size
        if bytes.is_none() && !hls {
            if let Some(n) = self.content_length(&url).await {
                bytes = Some(n);
                changed = true;
            }
        }

        if duration.is_none() {
            let probed = if hls {
                self.hls_duration(&url).await
            } else {
                self.mp4_duration(&url).await
            };
            if let Some(seconds) = probed {
                duration = Some(seconds);
                changed = true;
            }
        }

        if changed {
            cache.put(&url, MediaMeta::new(bytes, duration), now);
        }
        media.bytes = bytes;
        episode.duration_sec = duration;
        changed
    }
}

fn log_miss(url: &str, what: &str, result: Result<u64, ProbeError>) -> Option<u64> {
    match result {
        Ok(value) => Some(value),
        Err(ProbeError::NotApplicable) => None,
        Err(e) => {
            tracing::debug!(url, error = %e, "no {what}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::error::FetchError;
    use crate::feed::Media;
    use crate::http::{FetchResponse, Method};

    /// Serves one in-memory file, honoring HEAD and single ranges
    #[derive(Clone)]
    struct FileServer {
        body: Arc<Vec<u8>>,
        ranges: bool,
        requests: Arc<Mutex<Vec<FetchRequest>>>,
    }

    impl FileServer {
        fn new(body: Vec<u8>, ranges: bool) -> Self {
            Self {
                body: Arc::new(body),
                ranges,
                requests: Arc::default(),
            }
        }

        fn requests(&self) -> Vec<FetchRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for FileServer {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
            self.requests.lock().unwrap().push(request.clone());
            let len = self.body.len() as u64;

            if request.method == Method::Head {
                return Ok(FetchResponse {
                    status: 200,
                    effective_url: request.url.clone(),
                    content_length: Some(len),
                    ..Default::default()
                });
            }

            let (status, slice) = match request.range {
                Some((start, end)) if self.ranges => {
                    let end = end.min(len - 1);
                    (206, self.body[start as usize..=end as usize].to_vec())
                }
                _ => (200, self.body.to_vec()),
            };
            if let Some(limit) = request.max_body_bytes {
                if slice.len() as u64 > limit {
                    return Err(FetchError::BodyTooLarge {
                        url: request.url.clone(),
                        limit,
                    });
                }
            }
            Ok(FetchResponse {
                status,
                effective_url: request.url.clone(),
                content_length: Some(slice.len() as u64),
                body: Some(Bytes::from(slice)),
                ..Default::default()
            })
        }
    }

    fn video_file(size: usize, mvhd_at: usize) -> Vec<u8> {
        let mut body = vec![0u8; size];
        let mvhd = mp4::tests::mvhd_v0(1000, 125_000);
        body[mvhd_at..mvhd_at + mvhd.len()].copy_from_slice(&mvhd);
        body
    }

    fn settings() -> ProbeSettings {
        ProbeSettings {
            max_probe_bytes: 128 * 1024,
            ..ProbeSettings::default()
        }
    }

    fn episode(url: &str) -> Episode {
        Episode {
            media: Some(Media {
                url: url.to_string(),
                mime_type: "video/mp4".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn plausibility_bounds() {
        assert_eq!(plausible_seconds(125.0).unwrap(), 125);
        assert!(plausible_seconds(0.0).is_err());
        assert!(plausible_seconds(0.2).is_err());
        assert!(plausible_seconds(-5.0).is_err());
        assert!(plausible_seconds(86_400.0).is_err());
        assert!(plausible_seconds(f64::NAN).is_err());
    }

    #[tokio::test]
    async fn mp4_duration_from_head_window() {
        let server = FileServer::new(video_file(1024 * 1024, 100), true);
        let prober = MediaProber::new(&server, settings());

        assert_eq!(prober.mp4_duration("https://x/v.mp4").await, Some(125));

        // range probe, HEAD, head window; no tail read needed
        let requests = server.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].range, Some((0, 0)));
        assert_eq!(requests[1].method, Method::Head);
        assert_eq!(requests[2].range, Some((0, 128 * 1024 - 1)));
    }

    #[tokio::test]
    async fn mp4_duration_from_tail_window() {
        let size = 1024 * 1024;
        let server = FileServer::new(video_file(size, size - 500), true);
        let prober = MediaProber::new(&server, settings());

        assert_eq!(prober.mp4_duration("https://x/v.mp4").await, Some(125));

        let tail = server.requests().last().unwrap().range.unwrap();
        assert_eq!(tail, ((size - 128 * 1024) as u64, (size - 1) as u64));
    }

    #[tokio::test]
    async fn enrich_sizes_tail_window_from_server_not_feed_length() {
        let size = 1024 * 1024;
        let server = FileServer::new(video_file(size, size - 500), true);
        let prober = MediaProber::new(&server, settings());
        let mut cache = MediaMetaCache::default();

        let mut understated = episode("https://x/v.mp4");
        understated.media.as_mut().unwrap().bytes = Some(200_000);
        assert!(prober.enrich(&mut understated, &mut cache, 1_000).await);
        assert_eq!(understated.duration_sec, Some(125));
        // the feed's own length is still what gets published
        assert_eq!(understated.media.as_ref().unwrap().bytes, Some(200_000));

        let mut overstated = episode("https://x/w.mp4");
        overstated.media.as_mut().unwrap().bytes = Some(50 * 1024 * 1024);
        assert!(prober.enrich(&mut overstated, &mut cache, 1_000).await);
        assert_eq!(overstated.duration_sec, Some(125));

        let tail = server.requests().last().unwrap().range.unwrap();
        assert_eq!(tail, ((size - 128 * 1024) as u64, (size - 1) as u64));
    }

    #[tokio::test]
    async fn mp4_probe_never_reads_beyond_windows() {
        let size = 4 * 1024 * 1024;
        let server = FileServer::new(video_file(size, 2 * 1024 * 1024), true);
        let prober = MediaProber::new(&server, settings());

        assert_eq!(prober.mp4_duration("https://x/v.mp4").await, None);

        let read: u64 = server
            .requests()
            .iter()
            .filter_map(|r| r.range)
            .map(|(start, end)| end - start + 1)
            .sum();
        assert!(read <= 1 + 2 * 128 * 1024);
    }

    #[tokio::test]
    async fn mp4_probe_requires_range_support() {
        let server = FileServer::new(video_file(256 * 1024, 0), false);
        let prober = MediaProber::new(&server, settings());

        assert!(matches!(
            prober.try_mp4_duration("https://x/v.mp4").await,
            Err(ProbeError::NoRangeSupport { .. })
        ));
    }

    #[tokio::test]
    async fn mp4_probe_skips_other_urls() {
        let server = FileServer::new(Vec::new(), true);
        let prober = MediaProber::new(&server, settings());

        assert!(matches!(
            prober.try_mp4_duration("https://x/a.mp3").await,
            Err(ProbeError::NotApplicable)
        ));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn hls_duration_requires_endlist() {
        let vod = b"#EXTM3U\n#EXTINF:6.0,\na.ts\n#EXTINF:4.0,\nb.ts\n#EXT-X-ENDLIST\n".to_vec();
        let server = FileServer::new(vod, false);
        let prober = MediaProber::new(&server, settings());
        assert_eq!(prober.hls_duration("https://x/v.m3u8").await, Some(10));

        let live = b"#EXTM3U\n#EXTINF:6.0,\na.ts\n".to_vec();
        let server = FileServer::new(live, false);
        let prober = MediaProber::new(&server, settings());
        assert_eq!(prober.hls_duration("https://x/v.m3u8").await, None);
    }

    #[tokio::test]
    async fn content_length_comes_from_head() {
        let server = FileServer::new(vec![1u8; 4321], false);
        let prober = MediaProber::new(&server, settings());

        assert_eq!(prober.content_length("https://x/a.mp3").await, Some(4321));
        assert_eq!(server.requests()[0].method, Method::Head);
    }

    #[tokio::test]
    async fn enrich_fills_missing_values_and_caches_them() {
        let server = FileServer::new(video_file(300 * 1024, 64), true);
        let prober = MediaProber::new(&server, settings());
        let mut cache = MediaMetaCache::default();
        let mut ep = episode("https://x/v.mp4");

        assert!(prober.enrich(&mut ep, &mut cache, 1_000).await);

        assert_eq!(ep.duration_sec, Some(125));
        assert_eq!(ep.media.as_ref().unwrap().bytes, Some(300 * 1024));
        assert_eq!(
            cache.get("https://x/v.mp4", 1_000),
            Some(MediaMeta::new(Some(300 * 1024), Some(125)))
        );
    }

    #[tokio::test]
    async fn enrich_uses_fresh_cache_without_network() {
        let server = FileServer::new(Vec::new(), true);
        let prober = MediaProber::new(&server, settings());
        let mut cache = MediaMetaCache::default();
        cache.put("https://x/v.mp4", MediaMeta::new(Some(99), Some(42)), 1_000);
        let mut ep = episode("https://x/v.mp4");

        assert!(!prober.enrich(&mut ep, &mut cache, 2_000).await);

        assert_eq!(ep.duration_sec, Some(42));
        assert_eq!(ep.media.as_ref().unwrap().bytes, Some(99));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn enrich_keeps_feed_values() {
        let server = FileServer::new(Vec::new(), true);
        let prober = MediaProber::new(&server, settings());
        let mut cache = MediaMetaCache::default();
        let mut ep = episode("https://x/v.mp4");
        ep.duration_sec = Some(330);
        ep.media.as_mut().unwrap().bytes = Some(10);

        assert!(!prober.enrich(&mut ep, &mut cache, 1_000).await);

        assert_eq!(ep.duration_sec, Some(330));
        assert!(cache.is_empty());
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn enrich_without_media_is_a_no_op() {
        let server = FileServer::new(Vec::new(), true);
        let prober = MediaProber::new(&server, settings());
        let mut cache = MediaMetaCache::default();
        let mut ep = Episode::default();

        assert!(!prober.enrich(&mut ep, &mut cache, 1_000).await);
        assert!(server.requests().is_empty());
    }
}
