//! Reachability checks for candidate stream URLs
//!
//! AGTV endpoints get a HEAD. Everything else gets a GET whose body is read
//! up to a small cap before the connection is dropped. Redirects are
//! followed by hand so relative `Location` headers resolve against the URL
//! that produced them, and the timeout covers the whole chain.

use async_trait::async_trait;
use reqwest::header::{LOCATION, RANGE};
use reqwest::{Client, Response};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use strum::Display;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::ProberConfig;
use crate::errors::ProviderResult;
use crate::models::{ProbeMethod, ProviderType};
use crate::utils::duration::format_duration;
use crate::utils::url::{obfuscate_credentials, resolve_location};

use super::health_tracker::BAD_GATEWAY;

/// Why a probe produced no usable status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProbeFailure {
    InvalidUrl,
    /// Connection refused, DNS failure, reset
    Network,
    Timeout,
    TooManyRedirects,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub is_valid: bool,
    pub status_code: Option<u16>,
    pub response_time: Duration,
    /// Body bytes received from the upstream, not just the ones inspected
    pub bytes_read: usize,
    pub redirects: usize,
    pub failure: Option<ProbeFailure>,
}

impl ProbeResult {
    pub fn cancelled(response_time: Duration) -> Self {
        Self {
            is_valid: false,
            status_code: None,
            response_time,
            bytes_read: 0,
            redirects: 0,
            failure: Some(ProbeFailure::Cancelled),
        }
    }

    /// 502s and network failures count against the provider's health
    pub fn counts_as_bad_gateway(&self) -> bool {
        self.status_code == Some(BAD_GATEWAY)
            || matches!(
                self.failure,
                Some(ProbeFailure::Network | ProbeFailure::Timeout)
            )
    }

    /// Label for logs and metrics: the status code, or the failure kind
    pub fn outcome_label(&self) -> String {
        match (self.failure, self.status_code) {
            (Some(failure), _) => failure.to_string(),
            (None, Some(status)) => status.to_string(),
            (None, None) => "unknown".to_string(),
        }
    }
}

/// Validates one URL
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str, provider_type: ProviderType, token: &CancellationToken) -> ProbeResult;
}

/// Process-local probe counters
#[derive(Debug, Default)]
pub struct ProbeStats {
    started: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    max_body_bytes: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProbeStatsSnapshot {
    pub started: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub in_flight: usize,
    /// Highest number of probes seen in flight at once
    pub max_in_flight: usize,
    /// Most body bytes any single probe received
    pub max_body_bytes: usize,
}

impl ProbeStats {
    /// Count a probe as started; the guard settles it as succeeded, failed
    /// or, if dropped unfinished, cancelled
    pub fn begin(&self) -> InFlight<'_> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight {
            stats: self,
            finished: false,
        }
    }

    pub fn snapshot(&self) -> ProbeStatsSnapshot {
        ProbeStatsSnapshot {
            started: self.started.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            max_in_flight: self.max_in_flight.load(Ordering::SeqCst),
            max_body_bytes: self.max_body_bytes.load(Ordering::SeqCst),
        }
    }
}

/// In-flight marker returned by [`ProbeStats::begin`]
#[derive(Debug)]
pub struct InFlight<'a> {
    stats: &'a ProbeStats,
    finished: bool,
}

impl InFlight<'_> {
    pub fn finish(mut self, result: &ProbeResult) {
        self.finished = true;
        let counter = if result.failure == Some(ProbeFailure::Cancelled) {
            &self.stats.cancelled
        } else if result.is_valid {
            &self.stats.succeeded
        } else {
            &self.stats.failed
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.stats
            .max_body_bytes
            .fetch_max(result.bytes_read, Ordering::SeqCst);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        if !self.finished {
            self.stats.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// What one request chain produced
struct Attempt {
    status: Option<u16>,
    bytes_read: usize,
    redirects: usize,
    failure: Option<ProbeFailure>,
}

impl Attempt {
    fn failed(failure: ProbeFailure, redirects: usize) -> Self {
        Self {
            status: None,
            bytes_read: 0,
            redirects,
            failure: Some(failure),
        }
    }

    fn into_result(self, response_time: Duration) -> ProbeResult {
        let is_valid = self.failure.is_none()
            && self.status.is_some_and(|status| (200..400).contains(&status));
        ProbeResult {
            is_valid,
            status_code: self.status,
            response_time,
            bytes_read: self.bytes_read,
            redirects: self.redirects,
            failure: self.failure,
        }
    }
}

/// reqwest-backed [`Prober`]
pub struct UrlProber {
    http: Client,
    timeout: Duration,
    max_redirects: usize,
    max_body_bytes: usize,
    stats: Arc<ProbeStats>,
}

impl UrlProber {
    pub fn new(config: &ProberConfig) -> ProviderResult<Self> {
        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            http,
            timeout: config.timeout,
            max_redirects: config.max_redirects,
            max_body_bytes: config.max_body_bytes,
            stats: Arc::new(ProbeStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<ProbeStats> {
        Arc::clone(&self.stats)
    }

    /// One request chain; `redirects` tracks the hops followed so far so a
    /// timeout can still report them
    async fn fetch(&self, url: &str, method: ProbeMethod, redirects: &mut usize) -> Attempt {
        let Ok(mut current) = Url::parse(url) else {
            return Attempt::failed(ProbeFailure::InvalidUrl, 0);
        };

        loop {
            let request = match method {
                ProbeMethod::Head => self.http.head(current.clone()),
                ProbeMethod::Get if self.max_body_bytes > 0 => self
                    .http
                    .get(current.clone())
                    .header(RANGE, format!("bytes=0-{}", self.max_body_bytes - 1)),
                ProbeMethod::Get => self.http.get(current.clone()),
            };

            let mut response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!(url = %obfuscate_credentials(current.as_str()), error = %e, "Probe request failed");
                    return Attempt::failed(ProbeFailure::Network, *redirects);
                }
            };

            let status = response.status();
            if status.is_redirection() {
                let next = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|location| resolve_location(&current, location));
                if let Some(next) = next {
                    if *redirects >= self.max_redirects {
                        return Attempt {
                            status: Some(status.as_u16()),
                            bytes_read: 0,
                            redirects: *redirects,
                            failure: Some(ProbeFailure::TooManyRedirects),
                        };
                    }
                    *redirects += 1;
                    current = next;
                    continue;
                }
            }

            let bytes_read = match method {
                ProbeMethod::Get => self.read_capped(&mut response).await,
                ProbeMethod::Head => 0,
            };
            return Attempt {
                status: Some(status.as_u16()),
                bytes_read,
                redirects: *redirects,
                failure: None,
            };
        }
    }

    /// Pull body chunks until `max_body_bytes` have arrived, then stop;
    /// dropping the response afterwards closes the connection
    ///
    /// Returns the bytes actually received. An upstream that honours the
    /// `Range` header sends exactly the cap; one that ignores it can
    /// overshoot by the rest of the transport chunk that crossed the cap.
    async fn read_capped(&self, response: &mut Response) -> usize {
        let mut read = 0;
        while read < self.max_body_bytes {
            match response.chunk().await {
                Ok(Some(chunk)) => read += chunk.len(),
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "Probe body read failed");
                    break;
                }
            }
        }
        read
    }
}

#[async_trait]
impl Prober for UrlProber {
    async fn probe(&self, url: &str, provider_type: ProviderType, token: &CancellationToken) -> ProbeResult {
        let method = provider_type.probe_method();
        let in_flight = self.stats.begin();
        let started = Instant::now();

        let mut redirects = 0;
        let attempt = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            attempt = tokio::time::timeout(self.timeout, self.fetch(url, method, &mut redirects)) => Some(attempt),
        };
        let result = match attempt {
            Some(Ok(attempt)) => attempt.into_result(started.elapsed()),
            Some(Err(_)) => Attempt::failed(ProbeFailure::Timeout, redirects).into_result(started.elapsed()),
            None => ProbeResult::cancelled(started.elapsed()),
        };
        in_flight.finish(&result);

        debug!(
            url = %obfuscate_credentials(url),
            method = %method,
            outcome = %result.outcome_label(),
            valid = result.is_valid,
            elapsed = %format_duration(result.response_time),
            "Probe finished"
        );
        result
    }
}

impl std::fmt::Debug for UrlProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlProber")
            .field("timeout", &self.timeout)
            .field("max_redirects", &self.max_redirects)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: Option<u16>, failure: Option<ProbeFailure>) -> ProbeResult {
        Attempt {
            status,
            bytes_read: 0,
            redirects: 0,
            failure,
        }
        .into_result(Duration::from_millis(5))
    }

    #[test]
    fn test_validity_is_2xx_and_3xx() {
        assert!(result(Some(200), None).is_valid);
        assert!(result(Some(206), None).is_valid);
        assert!(result(Some(302), None).is_valid);
        assert!(!result(Some(404), None).is_valid);
        assert!(!result(Some(502), None).is_valid);
        assert!(!result(Some(301), Some(ProbeFailure::TooManyRedirects)).is_valid);
    }

    #[test]
    fn test_bad_gateway_equivalents() {
        assert!(result(Some(502), None).counts_as_bad_gateway());
        assert!(result(None, Some(ProbeFailure::Network)).counts_as_bad_gateway());
        assert!(result(None, Some(ProbeFailure::Timeout)).counts_as_bad_gateway());
        assert!(!result(Some(503), None).counts_as_bad_gateway());
        assert!(!result(None, Some(ProbeFailure::Cancelled)).counts_as_bad_gateway());
        assert_eq!(result(None, Some(ProbeFailure::Network)).outcome_label(), "network");
        assert_eq!(result(Some(404), None).outcome_label(), "404");
    }

    #[test]
    fn test_stats_guard_counts_dropped_probes_as_cancelled() {
        let stats = ProbeStats::default();
        let first = stats.begin();
        let second = stats.begin();
        assert_eq!(stats.snapshot().max_in_flight, 2);

        first.finish(&result(Some(200), None));
        drop(second);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.started, 2);
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.cancelled, 1);
        assert_eq!(snapshot.in_flight, 0);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_network() {
        let prober = UrlProber::new(&ProberConfig::default()).unwrap();
        let result = prober
            .probe("not a url", ProviderType::Xtream, &CancellationToken::new())
            .await;
        assert_eq!(result.failure, Some(ProbeFailure::InvalidUrl));
        assert!(!result.counts_as_bad_gateway());
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let prober = UrlProber::new(&ProberConfig::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = prober
            .probe("http://127.0.0.1:9/stream.ts", ProviderType::Xtream, &token)
            .await;
        assert_eq!(result.failure, Some(ProbeFailure::Cancelled));
        assert_eq!(prober.stats().snapshot().cancelled, 1);
    }
}
