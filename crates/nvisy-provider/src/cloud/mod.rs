//! Cloud recognition services reached over HTTP.
//!
//! Both services share one JSON contract (see [`wire`]) and one status
//! mapping onto the provider error taxonomy:
//!
//! | status                       | kind               |
//! |------------------------------|--------------------|
//! | 408, 429, 500, 502, 503, 504 | transient          |
//! | 413, 415, 422                | unsupported input  |
//! | other 4xx                    | configuration      |
//! | other 5xx                    | transient          |

mod structure;
mod vision;
pub mod wire;

use std::time::Duration;

use nvisy_core::ServiceHealth;
use nvisy_core::content::ContentElement;
use nvisy_core::provider::{ProviderError, ProviderId, ProviderResult, RecognizeRequest, Result};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use tokio::time::Instant;
use url::Url;

pub use self::structure::{DocumentStructure, DocumentStructureConfig};
pub use self::vision::{ImageUnderstanding, ImageUnderstandingConfig};
use self::wire::{RecognizeBody, RecognizeResponse};
use crate::TRACING_TARGET_CLOUD;

/// Maximum number of response body bytes kept in error messages.
const BODY_EXCERPT: usize = 256;

/// Timeout for `GET /health`.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for one cloud recognition service.
#[derive(Debug, Clone)]
pub struct CloudClient {
    http: Client,
    base_url: Url,
    provider: ProviderId,
}

impl CloudClient {
    /// Creates a client sending `Authorization: Bearer <api_key>` when a key
    /// is configured.
    pub fn new(provider: ProviderId, mut base_url: Url, api_key: Option<&str>) -> crate::Result<Self> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        if let Some(api_key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| crate::Error::config(format!("Invalid API key: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .user_agent(concat!("nvisy-provider/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        tracing::debug!(
            target: TRACING_TARGET_CLOUD,
            provider = %provider,
            base_url = %base_url,
            "cloud client initialized"
        );

        Ok(Self {
            http,
            base_url,
            provider,
        })
    }

    /// Returns the service base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Posts `body` to `endpoint` and decodes the elements, bounded by `deadline`.
    pub async fn recognize(
        &self,
        endpoint: &str,
        body: &RecognizeBody,
        deadline: Instant,
    ) -> Result<RecognizeResponse> {
        let url = self.base_url.join(endpoint).map_err(|e| {
            ProviderError::configuration(format!("invalid endpoint '{endpoint}'")).with_source(e)
        })?;
        let allowed = deadline.saturating_duration_since(Instant::now());
        if allowed.is_zero() {
            return Err(ProviderError::deadline_exceeded(allowed));
        }

        let call = async {
            let response = self
                .http
                .post(url.clone())
                .timeout(allowed)
                .json(body)
                .send()
                .await
                .map_err(classify_transport)?;
            self.handle_response(response).await
        };

        match tokio::time::timeout_at(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::deadline_exceeded(allowed)),
        }
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<RecognizeResponse> {
        let status = response.status();
        tracing::debug!(
            target: TRACING_TARGET_CLOUD,
            provider = %self.provider,
            status = status.as_u16(),
            "received response"
        );

        if status.is_success() {
            return response.json::<RecognizeResponse>().await.map_err(|e| {
                ProviderError::unsupported_input(format!(
                    "{} returned an unreadable response",
                    self.provider
                ))
                .with_source(e)
            });
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(&self.provider, status, retry_after, &body))
    }

    /// Calls `GET <base>/health`.
    pub async fn health(&self) -> ServiceHealth {
        let url = match self.base_url.join("health") {
            Ok(url) => url,
            Err(e) => return ServiceHealth::unhealthy(format!("invalid health URL: {e}")),
        };

        let started = std::time::Instant::now();
        match self.http.get(url).timeout(HEALTH_CHECK_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => {
                ServiceHealth::healthy().with_latency(started.elapsed())
            }
            Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                ServiceHealth::degraded("rate limited").with_latency(started.elapsed())
            }
            Ok(response) => {
                ServiceHealth::unhealthy(format!("health check returned {}", response.status()))
            }
            Err(e) => ServiceHealth::unhealthy(format!("health check failed: {e}")),
        }
    }
}

/// Sends `request` to `endpoint` and converts the answer into a result with
/// chunk-relative pages. Elements of unrequested types or outside the chunk
/// are dropped.
async fn recognize_chunk(
    client: &CloudClient,
    endpoint: &str,
    request: &RecognizeRequest,
) -> Result<ProviderResult> {
    let started = std::time::Instant::now();
    let body = RecognizeBody::from_request(request);
    let response = client.recognize(endpoint, &body, request.deadline).await?;

    let page_count = request.pages.len();
    let received = response.elements.len();
    let elements: Vec<ContentElement> = response
        .elements
        .into_iter()
        .filter(|element| request.content_types.contains(element.content_type()))
        .filter(|element| element.page() < page_count)
        .map(Into::into)
        .collect();

    if elements.len() < received {
        tracing::warn!(
            target: TRACING_TARGET_CLOUD,
            provider = %client.provider,
            dropped = received - elements.len(),
            "discarded elements outside the request"
        );
    }

    let mut result = ProviderResult::new(client.provider.clone(), elements);
    result.metadata.elapsed_ms = started.elapsed().as_millis() as u64;
    result.metadata.detected_language = response.language;
    Ok(result)
}

/// Maps a non-success status onto the provider taxonomy.
pub fn classify_status(
    provider: &ProviderId,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    let excerpt: String = body.trim().chars().take(BODY_EXCERPT).collect();
    let message = format!("{provider} returned {status}: {excerpt}");

    let error = match status {
        StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS
        | StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => ProviderError::transient(message),
        StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNSUPPORTED_MEDIA_TYPE
        | StatusCode::UNPROCESSABLE_ENTITY => ProviderError::unsupported_input(message),
        s if s.is_client_error() => ProviderError::configuration(message),
        s if s.is_server_error() => ProviderError::transient(message),
        _ => ProviderError::fatal(message),
    };

    match retry_after {
        Some(delay) if error.is_retryable() => error.with_retry_after(delay),
        _ => error,
    }
}

/// Maps a transport failure onto the provider taxonomy.
fn classify_transport(error: reqwest::Error) -> ProviderError {
    if error.is_builder() {
        ProviderError::configuration("invalid request").with_source(error)
    } else if error.is_timeout() {
        ProviderError::transient("request timed out").with_source(error)
    } else {
        ProviderError::transient("request failed").with_source(error)
    }
}

/// Reads `Retry-After` given in seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
