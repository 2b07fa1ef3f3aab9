pub mod auth;
pub mod conditional_access;
pub mod service;
pub mod users;

#[cfg(test)]
pub(crate) mod fake;

use crate::config::RetrySettings;
use crate::error::{CaError, Result};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use service::GraphService;

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

const JITTER_FACTOR: f64 = 0.3; // +/- 30% jitter

/// Exponential backoff derived from the configured retry settings
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries.max(1),
            initial_backoff_ms: settings.initial_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff before jitter: initial * 2^attempt, capped
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let backoff = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(backoff.min(self.max_backoff_ms))
    }

    pub fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let capped_backoff = self.base_backoff(attempt).as_millis() as u64;

        let jitter_range = (capped_backoff as f64 * JITTER_FACTOR) as u64;
        let jitter = if jitter_range > 0 {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            std::time::SystemTime::now().hash(&mut hasher);
            (hasher.finish() % (jitter_range * 2)) as i64 - jitter_range as i64
        } else {
            0
        };

        Duration::from_millis((capped_backoff as i64 + jitter).max(1) as u64)
    }
}

/// Graph API client with retry support
#[derive(Clone)]
pub struct GraphClient {
    client: Client,
    access_token: String,
    base_url: String,
    retry: RetryPolicy,
}

impl GraphClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, GRAPH_API_BASE)
    }

    /// Point the client at a different Graph root (national clouds, tests)
    pub fn with_base_url(access_token: String, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            access_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, settings: &RetrySettings) -> Self {
        self.retry = RetryPolicy::from(settings);
        self
    }

    /// Build a client for an authenticated session
    pub fn from_session(session: &auth::Session, settings: &RetrySettings) -> Self {
        Self::new(session.access_token().to_string()).with_retry(settings)
    }

    fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    pub async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T> {
        let url = self.url_for(endpoint);
        let resp = self.send_with_retry(Method::GET, &url, None).await?;
        Ok(resp.json::<T>().await?)
    }

    pub async fn post<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<R> {
        let url = self.url_for(endpoint);
        let body = serde_json::to_value(body)?;
        let resp = self.send_with_retry(Method::POST, &url, Some(&body)).await?;
        Ok(resp.json::<R>().await?)
    }

    /// PATCH where Graph answers 204 No Content
    pub async fn patch_no_response<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<()> {
        let url = self.url_for(endpoint);
        let body = serde_json::to_value(body)?;
        self.send_with_retry(Method::PATCH, &url, Some(&body))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, endpoint: &str) -> Result<()> {
        let url = self.url_for(endpoint);
        self.send_with_retry(Method::DELETE, &url, None).await?;
        Ok(())
    }

    /// Send a request, retrying 429 (honouring Retry-After), 5xx and
    /// connection failures. 404 maps to `CaError::NotFound`.
    async fn send_with_retry(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let max_retries = self.retry.max_retries();

        for attempt in 0..max_retries {
            let is_last = attempt + 1 == max_retries;

            let mut request = self
                .client
                .request(method.clone(), url)
                .bearer_auth(&self.access_token);
            if let Some(body) = body {
                request = request.json(body);
            }

            tracing::debug!(%method, url, attempt = attempt + 1, "graph request");

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS && !is_last {
                        let wait_time = resp
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(Duration::from_secs)
                            .unwrap_or_else(|| self.retry.backoff_with_jitter(attempt));

                        tracing::warn!(
                            "Rate limited (429). Retrying in {:?}... (attempt {}/{})",
                            wait_time,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(wait_time).await;
                        continue;
                    }

                    if status.is_server_error() && !is_last {
                        let wait_time = self.retry.backoff_with_jitter(attempt);
                        tracing::warn!(
                            "Server error ({}). Retrying in {:?}... (attempt {}/{})",
                            status,
                            wait_time,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(wait_time).await;
                        continue;
                    }

                    if status == StatusCode::NOT_FOUND {
                        let error_text = resp.text().await.unwrap_or_default();
                        return Err(CaError::NotFound(format!(
                            "{} {}: {}",
                            method,
                            url,
                            crate::error::enhance_graph_error(&error_text)
                        )));
                    }

                    if !status.is_success() {
                        let error_text = resp.text().await.unwrap_or_default();
                        let enhanced_error = crate::error::enhance_graph_error(&error_text);
                        return Err(CaError::GraphApiError(format!(
                            "HTTP {}: {}",
                            status, enhanced_error
                        )));
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    if !is_last {
                        let wait_time = self.retry.backoff_with_jitter(attempt);
                        tracing::warn!(
                            "Connection error: {}. Retrying in {:?}... (attempt {}/{})",
                            e,
                            wait_time,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(wait_time).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(CaError::GraphApiError(format!(
            "{} {} failed after {} retries",
            method, url, max_retries
        )))
    }
}

// ============================================================================
// Pagination Helpers
// ============================================================================

/// Generic paginated response from Graph API
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

impl GraphClient {
    /// Fetch all pages of a paginated endpoint, following `@odata.nextLink`
    pub async fn get_all_pages<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
    ) -> Result<Vec<T>> {
        let mut all_items: Vec<T> = Vec::new();
        let mut current_url = self.url_for(endpoint);

        loop {
            let resp = self
                .send_with_retry(Method::GET, &current_url, None)
                .await?;
            let page: PaginatedResponse<T> = resp.json().await?;
            all_items.extend(page.value);

            match page.next_link {
                Some(next) => current_url = next,
                None => break,
            }
        }

        Ok(all_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_backoff_doubles_and_caps() {
        let policy = RetryPolicy::from(&RetrySettings {
            max_retries: 5,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        });
        assert_eq!(policy.base_backoff(0), Duration::from_millis(1000));
        assert_eq!(policy.base_backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.base_backoff(2), Duration::from_millis(4000));
        assert_eq!(policy.base_backoff(3), Duration::from_millis(5000));
        assert_eq!(policy.base_backoff(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_stays_within_thirty_percent() {
        let policy = RetryPolicy::default();
        for attempt in 0..4 {
            let base = policy.base_backoff(attempt).as_millis() as f64;
            let jittered = policy.backoff_with_jitter(attempt).as_millis() as f64;
            assert!(jittered >= base * 0.69 && jittered <= base * 1.31);
        }
    }

    #[test]
    fn test_zero_retries_still_sends_once() {
        let policy = RetryPolicy::from(&RetrySettings {
            max_retries: 0,
            ..RetrySettings::default()
        });
        assert_eq!(policy.max_retries(), 1);
    }

    #[test]
    fn test_url_joining() {
        let client = GraphClient::with_base_url("t".into(), "http://localhost:8080/v1.0/");
        assert_eq!(
            client.url_for("/identity/conditionalAccess/policies"),
            "http://localhost:8080/v1.0/identity/conditionalAccess/policies"
        );
    }
}
