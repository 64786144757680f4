// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::cache::FeedCache;
use crate::config::{Defaults, FeedsConfig, Source};
use crate::error::{FeedError, PersistError};
use crate::feed::looks_like_feed_xml;
use crate::http::{HttpClient, fetch_feed};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::state::{FetchState, FetchStatus, StateLedger, unix_now};

pub const DEFAULT_CONCURRENCY: usize = 3;

const REASON_COOLDOWN: &str = "cooldown";
const REASON_MISSING_URL: &str = "missing url";

/// Options for a feed update run
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Ignore the cooldown and fetch every source
    pub force: bool,
    /// Maximum number of concurrent fetches
    pub concurrency: usize,
    pub cooldown: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl UpdateOptions {
    pub fn from_defaults(defaults: &Defaults) -> Self {
        Self {
            force: false,
            concurrency: DEFAULT_CONCURRENCY,
            cooldown: defaults.cooldown(),
            timeout: defaults.timeout(),
            user_agent: defaults.user_agent.clone(),
        }
    }
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self::from_defaults(&Defaults::default())
    }
}

/// Result of an update run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub ok: usize,
    pub not_modified: usize,
    pub skipped: usize,
    /// `(source id, error message)` for every failed source
    pub errors: Vec<(String, String)>,
}

impl UpdateSummary {
    fn record(&mut self, source_id: &str, state: &FetchState) {
        match state.status {
            FetchStatus::Ok => self.ok += 1,
            FetchStatus::NotModified => self.not_modified += 1,
            FetchStatus::Skip => self.skipped += 1,
            FetchStatus::Error => self.errors.push((
                source_id.to_string(),
                state.error.clone().unwrap_or_default(),
            )),
        }
    }
}

/// What to do with one source this run
#[derive(Debug, Clone, PartialEq)]
pub enum FetchPlan {
    /// Record this state without touching the network
    Skip(FetchState),
    /// Fetch, sending these validators
    Fetch {
        if_none_match: Option<String>,
        if_modified_since: Option<String>,
    },
}

/// Decide whether a source is fetched.
///
/// A source is only skipped for cooldown when it already has a cached body
/// and a recorded check younger than `cooldown`. Validators are only sent
/// when a cached body exists to fall back on after a `304`.
pub fn plan_fetch(
    source: &Source,
    previous: Option<&FetchState>,
    cached: bool,
    options: &UpdateOptions,
    now: i64,
) -> FetchPlan {
    if !source.has_feed_url() {
        return FetchPlan::Skip(FetchState::skip(REASON_MISSING_URL));
    }

    if let Some(prev) = previous {
        let cooldown = i64::try_from(options.cooldown.as_secs()).unwrap_or(i64::MAX);
        let in_cooldown = prev
            .last_checked_unix
            .is_some_and(|checked| checked > 0 && now.saturating_sub(checked) < cooldown);

        if !options.force && cached && in_cooldown {
            return FetchPlan::Skip(FetchState {
                status: FetchStatus::Skip,
                url: Some(source.feed_url.clone()),
                last_checked_unix: prev.last_checked_unix,
                last_ok_unix: prev.last_ok_unix,
                etag: prev.etag.clone(),
                last_modified: prev.last_modified.clone(),
                bytes: prev.bytes,
                reason: Some(REASON_COOLDOWN.to_string()),
                ..FetchState::new(FetchStatus::Skip)
            });
        }
    }

    let (if_none_match, if_modified_since) = match previous {
        Some(prev) if cached => prev.validators(),
        _ => (None, None),
    };
    FetchPlan::Fetch {
        if_none_match,
        if_modified_since,
    }
}

/// Fetch every configured source, refresh the cache and write the ledger.
///
/// Per-source failures are recorded in the ledger and summary. Only a
/// failure to write the ledger itself is returned as an error.
pub async fn update_feeds<C: HttpClient + Clone + 'static>(
    client: &C,
    config: &FeedsConfig,
    cache: &FeedCache,
    options: &UpdateOptions,
    reporter: SharedProgressReporter,
) -> Result<UpdateSummary, PersistError> {
    let now = unix_now();
    let previous = StateLedger::load(&cache.ledger_path());

    reporter.report(ProgressEvent::UpdateStarted {
        total_sources: config.feeds.len(),
    });

    let permits = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut handles = Vec::with_capacity(config.feeds.len());

    for source in &config.feeds {
        let prev = previous.get(&source.id).cloned();
        let plan = plan_fetch(source, prev.as_ref(), cache.exists(&source.id), options, now);

        let permits = permits.clone();
        let client = client.clone();
        let cache = cache.clone();
        let reporter = reporter.clone();
        let source = source.clone();
        let source_id = source.id.clone();
        let timeout = options.timeout;
        let user_agent = options.user_agent.clone();

        let handle = tokio::spawn(async move {
            let state = match plan {
                FetchPlan::Skip(state) => state,
                FetchPlan::Fetch {
                    if_none_match,
                    if_modified_since,
                } => {
                    // The semaphore is never closed
                    let _permit = permits.acquire_owned().await.ok();
                    let request = FeedRequest {
                        source_id: &source.id,
                        url: &source.feed_url,
                        timeout,
                        user_agent: &user_agent,
                        if_none_match,
                        if_modified_since,
                    };
                    refresh_feed(&client, &cache, request, prev.as_ref(), now).await
                }
            };
            report_state(&reporter, &source.id, &state);
            state
        });
        handles.push((source_id, handle));
    }

    let mut ledger = StateLedger {
        updated_at_unix: now,
        site: config.site.clone(),
        ..StateLedger::default()
    };
    let mut summary = UpdateSummary::default();

    for (source_id, handle) in handles {
        let state = handle.await.unwrap_or_else(|e| {
            tracing::error!(source = %source_id, error = %e, "fetch task failed");
            FetchState {
                last_checked_unix: Some(now),
                error: Some(format!("fetch task failed: {e}")),
                ..FetchState::new(FetchStatus::Error)
            }
        });
        summary.record(&source_id, &state);
        ledger.feeds.insert(source_id, state);
    }

    ledger.save(&cache.ledger_path())?;

    reporter.report(ProgressEvent::UpdateCompleted {
        ok_count: summary.ok,
        not_modified_count: summary.not_modified,
        skipped_count: summary.skipped,
        error_count: summary.errors.len(),
    });

    Ok(summary)
}

pub(crate) fn report_state(reporter: &SharedProgressReporter, source_id: &str, state: &FetchState) {
    let source_id = source_id.to_string();
    let event = match state.status {
        FetchStatus::Ok | FetchStatus::NotModified => ProgressEvent::FeedFetched {
            source_id,
            status: state.status,
            bytes: if state.status == FetchStatus::Ok { state.bytes } else { None },
        },
        FetchStatus::Skip => ProgressEvent::FeedSkipped {
            source_id,
            reason: state.reason.clone().unwrap_or_default(),
        },
        FetchStatus::Error => ProgressEvent::FeedFailed {
            source_id,
            error: state.error.clone().unwrap_or_default(),
        },
    };
    reporter.report(event);
}

/// One conditional feed fetch
pub(crate) struct FeedRequest<'a> {
    pub source_id: &'a str,
    pub url: &'a str,
    pub timeout: Duration,
    pub user_agent: &'a str,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
}

/// Fetch one feed, validate it and replace the cached body.
///
/// Always yields a ledger entry. The cache file is only written after the
/// body passed validation.
pub(crate) async fn refresh_feed<C: HttpClient + ?Sized>(
    client: &C,
    cache: &FeedCache,
    request: FeedRequest<'_>,
    previous: Option<&FetchState>,
    now: i64,
) -> FetchState {
    let url = request.url.to_string();
    let sent_etag = request.if_none_match.clone();
    let sent_last_modified = request.if_modified_since.clone();

    match try_refresh_feed(client, cache, request, previous, now).await {
        Ok(state) => state,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "feed refresh failed");
            FetchState {
                url: Some(url),
                last_checked_unix: Some(now),
                last_ok_unix: previous.and_then(|p| p.last_ok_unix),
                etag: sent_etag,
                last_modified: sent_last_modified,
                error: Some(e.to_string()),
                ..FetchState::new(FetchStatus::Error)
            }
        }
    }
}

async fn try_refresh_feed<C: HttpClient + ?Sized>(
    client: &C,
    cache: &FeedCache,
    request: FeedRequest<'_>,
    previous: Option<&FetchState>,
    now: i64,
) -> Result<FetchState, FeedError> {
    let FeedRequest {
        source_id,
        url,
        timeout,
        user_agent,
        if_none_match,
        if_modified_since,
    } = request;

    let response = fetch_feed(
        client,
        url,
        timeout,
        user_agent,
        if_none_match.clone(),
        if_modified_since.clone(),
    )
    .await?;

    if response.is_not_modified() {
        return Ok(FetchState {
            url: Some(url.to_string()),
            fetched_url: Some(response.effective_url),
            last_checked_unix: Some(now),
            last_ok_unix: previous.and_then(|p| p.last_ok_unix),
            etag: response.etag.or(if_none_match),
            last_modified: response.last_modified.or(if_modified_since),
            bytes: previous.and_then(|p| p.bytes),
            ..FetchState::new(FetchStatus::NotModified)
        });
    }

    let status = response.status;
    let body = match response.body {
        Some(body) if !body.is_empty() => body,
        _ => return Err(FeedError::EmptyBody { status }),
    };
    if !looks_like_feed_xml(&body) {
        return Err(FeedError::NotAFeed);
    }
    if !(200..300).contains(&status) {
        return Err(FeedError::HttpStatus { status });
    }

    cache.store(source_id, &body)?;

    Ok(FetchState {
        url: Some(url.to_string()),
        fetched_url: Some(response.effective_url),
        last_checked_unix: Some(now),
        last_ok_unix: Some(now),
        etag: response.etag.or(if_none_match),
        last_modified: response.last_modified.or(if_modified_since),
        bytes: Some(body.len() as u64),
        ..FetchState::new(FetchStatus::Ok)
    })
}
