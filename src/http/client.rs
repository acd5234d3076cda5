//! Low-level HTTP client — `SovHttp`.
//!
//! One method per consumed endpoint. Returns wire types (conversion to
//! domain types happens at the client boundary). Internal to the SDK — the
//! high-level client wraps this.
//!
//! No failure from this layer escapes as a panic or an unobserved task
//! error; everything resolves to a typed `HttpError` value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::ad::wire::AdResponse;
use crate::domain::event::wire::{DebugLogBody, EventBody};
use crate::error::HttpError;
use crate::http::retry::{RetryConfig, RetryPolicy};
use crate::shared::SiteId;

/// Per-attempt request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the single attempt of an unload-safe beacon send.
const BEACON_TIMEOUT: Duration = Duration::from_secs(3);

/// Low-level HTTP client for the SovAds REST API.
pub struct SovHttp {
    base_url: String,
    client: Client,
    /// Cooperative cancellation signal, set by client teardown. In-flight
    /// retry chains check it before scheduling their next attempt.
    closed: Arc<AtomicBool>,
}

impl SovHttp {
    pub fn new(base_url: &str) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Signal teardown: pending retries abandon silently, beacons stop.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ── Ads ──────────────────────────────────────────────────────────────

    pub async fn get_ad(
        &self,
        site_id: &SiteId,
        consumer_id: Option<&str>,
    ) -> Result<AdResponse, HttpError> {
        let mut url = format!(
            "{}/ads?siteId={}",
            self.base_url,
            urlencoding::encode(site_id.as_str())
        );
        if let Some(c) = consumer_id {
            url = format!("{}&consumerId={}", url, urlencoding::encode(c));
        }
        self.get(&url, RetryPolicy::Idempotent).await
    }

    // ── Events ───────────────────────────────────────────────────────────

    /// Deliver a tracking event through the retrying path.
    ///
    /// Event ids are unique per event, so redelivery after an ambiguous
    /// failure is safe for the backend to dedupe.
    pub async fn post_event(&self, body: &EventBody) -> Result<(), HttpError> {
        let url = format!("{}/events", self.base_url);
        self.post_discard(&url, body, RetryPolicy::Custom(RetryConfig::default()))
            .await
    }

    /// Best-effort, unload-safe event delivery.
    ///
    /// Exactly one attempt on a detached task with a short timeout; the
    /// response is never awaited by the caller and every failure is
    /// swallowed. This is the transport for payloads that must go out even
    /// as the hosting page is being torn down.
    pub fn send_beacon(&self, body: &EventBody) {
        if self.is_closed() {
            return;
        }

        let url = format!("{}/events", self.base_url);
        let client = self.client.clone();
        let payload = match serde_json::to_vec(body) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("Beacon payload serialization failed: {}", e);
                return;
            }
        };

        tokio::spawn(async move {
            let send = client
                .post(&url)
                .header("Content-Type", "application/json")
                .body(payload)
                .send();
            match tokio::time::timeout(BEACON_TIMEOUT, send).await {
                Ok(Ok(resp)) => {
                    tracing::debug!(status = resp.status().as_u16(), "Beacon delivered");
                }
                Ok(Err(e)) => {
                    tracing::debug!("Beacon send failed: {}", e);
                }
                Err(_) => {
                    tracing::debug!("Beacon send timed out");
                }
            }
        });
    }

    // ── Debug log ────────────────────────────────────────────────────────

    pub async fn post_debug_log(&self, body: &DebugLogBody) -> Result<(), HttpError> {
        let url = format!("{}/debug/log", self.base_url);
        self.post_discard(&url, body, RetryPolicy::None).await
    }

    // ── Internal HTTP methods ────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, url: &str, retry: RetryPolicy) -> Result<T, HttpError> {
        self.request_with_retry(url, None::<&()>, retry, |resp| async move {
            Ok(resp.json::<T>().await?)
        })
        .await
    }

    async fn post_discard<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        retry: RetryPolicy,
    ) -> Result<(), HttpError> {
        self.request_with_retry(url, Some(body), retry, |_resp| async move { Ok(()) })
            .await
    }

    async fn request_with_retry<T, B, F, Fut>(
        &self,
        url: &str,
        body: Option<&B>,
        retry: RetryPolicy,
        parse: F,
    ) -> Result<T, HttpError>
    where
        B: Serialize,
        F: Fn(reqwest::Response) -> Fut,
        Fut: std::future::Future<Output = Result<T, HttpError>>,
    {
        let config = match &retry {
            RetryPolicy::None => {
                return self.do_request(url, body, &parse).await;
            }
            RetryPolicy::Idempotent => RetryConfig::idempotent(),
            RetryPolicy::Custom(c) => c.clone(),
        };

        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            if self.is_closed() {
                return Err(HttpError::Cancelled);
            }

            match self.do_request(url, body, &parse).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if !e.is_retryable(&config.retryable_statuses) {
                        return Err(e);
                    }

                    // 429 servers name their own minimum delay.
                    if let HttpError::RateLimited {
                        retry_after_ms: Some(ms),
                    } = &e
                    {
                        futures_timer::Delay::new(Duration::from_millis(*ms)).await;
                    }
                    last_error = Some(e);

                    if attempt == config.max_retries {
                        break;
                    }

                    let delay = config.delay_for_attempt(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        max = config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying request to {}",
                        url
                    );
                    futures_timer::Delay::new(delay).await;
                }
            }
        }

        // Every attempt failed with a retryable error.
        Err(HttpError::MaxRetriesExceeded {
            attempts: config.max_retries + 1,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn do_request<T, B, F, Fut>(
        &self,
        url: &str,
        body: Option<&B>,
        parse: &F,
    ) -> Result<T, HttpError>
    where
        B: Serialize,
        F: Fn(reqwest::Response) -> Fut,
        Fut: std::future::Future<Output = Result<T, HttpError>>,
    {
        let mut req = match body {
            Some(b) => self.client.post(url).json(b),
            None => self.client.get(url),
        };
        req = req.header("Accept", "application/json");

        let resp = req.send().await?;
        let status = resp.status();

        if status.is_success() {
            return parse(resp).await;
        }

        let status_code = status.as_u16();
        let retry_after_ms = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1000);
        let body_text = resp.text().await.unwrap_or_default();

        match status_code {
            404 => Err(HttpError::NotFound(body_text)),
            429 => Err(HttpError::RateLimited { retry_after_ms }),
            400..=499 => Err(HttpError::BadRequest(body_text)),
            _ => Err(HttpError::ServerError {
                status: status_code,
                body: body_text,
            }),
        }
    }
}

impl Clone for SovHttp {
    fn clone(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            client: self.client.clone(),
            closed: self.closed.clone(),
        }
    }
}
