//! HTTP client for the external generation API.
//!
//! Submission is a per-kind `POST` under `/v1/generation`; status checks
//! are a `GET` on the same path with the provider id appended. Responses
//! are mapped into [`PollOutcome`] and [`ProviderError`] here so callers
//! never see raw HTTP detail.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use atelier_core::params::{JobKind, JobParams};

use crate::adapter::{AssetPayload, GenerationProvider, PollOutcome, ProviderError, SubmitAck};

/// Connection settings for the generation API.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base HTTP URL without a trailing slash, e.g. `https://gen.example.com`.
    pub base_url: String,
    /// Bearer token sent on every request.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`GenerationProvider`] backed by the provider's REST API.
pub struct HttpProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

/// Response returned by a submit endpoint after queuing a generation.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    /// Provider-assigned identifier for the queued generation.
    id: String,
}

/// Raw body of a status check, before normalization.
///
/// Different kinds report the finished asset under different keys, so all
/// of them are optional here and [`StatusResponse::asset_url`] picks the
/// first one present.
#[derive(Debug, Default, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl StatusResponse {
    fn asset_url(&self) -> Option<&str> {
        self.video_url
            .as_deref()
            .or(self.image_url.as_deref())
            .or(self.url.as_deref())
    }

    fn failure_reason(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "Generation failed".to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    /// Network-level failures (connect, DNS, TLS, timeout) are retryable.
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transient(format!("HTTP request failed: {err}"))
    }
}

impl HttpProvider {
    /// Create a client with its own connection pool.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    // ---- private helpers ----

    fn endpoint(&self, kind: JobKind) -> String {
        format!("{}{}", self.config.base_url, submit_path(kind))
    }

    /// Ensure the response has a success status code. Returns the response
    /// unchanged on success, or the classified error containing the status
    /// and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(classify(status.as_u16(), &body));
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type. A body
    /// that does not decode is treated as transient; the provider may be
    /// mid-deploy.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| ProviderError::Transient(format!("Unparseable provider response: {err}")))
    }
}

#[async_trait::async_trait]
impl GenerationProvider for HttpProvider {
    async fn submit(&self, params: &JobParams) -> Result<SubmitAck, ProviderError> {
        let response = self
            .client
            .post(self.endpoint(params.kind()))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .json(&submit_payload(params))
            .send()
            .await?;

        let body: SubmitResponse = Self::parse_response(response).await?;
        Ok(SubmitAck {
            external_id: body.id,
        })
    }

    async fn poll(&self, kind: JobKind, external_id: &str) -> Result<PollOutcome, ProviderError> {
        let response = self
            .client
            .get(format!("{}/{}", self.endpoint(kind), external_id))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .send()
            .await?;

        let body: StatusResponse = Self::parse_response(response).await?;
        normalize_outcome(&body)
    }

    async fn fetch_asset(&self, url: &str) -> Result<AssetPayload, ProviderError> {
        // Asset URLs are pre-signed by the provider; no auth header here.
        let response = self
            .client
            .get(url)
            .timeout(self.config.timeout)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await?;

        Ok(AssetPayload {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Routing, classification, normalization
// ---------------------------------------------------------------------------

/// Submit endpoint path for a job kind. Status checks append
/// `/{external_id}` to the same path.
fn submit_path(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Video => "/v1/generation/text-to-video",
        JobKind::Avatar => "/v1/generation/avatar",
        JobKind::FashionPhoto => "/v1/generation/fashion-photo",
        JobKind::ImageToVideo => "/v1/generation/image-to-video",
    }
}

/// Request body for a submit call, in the shape the provider expects.
fn submit_payload(params: &JobParams) -> serde_json::Value {
    match params {
        JobParams::Video {
            prompt,
            style,
            duration_secs,
            resolution,
        } => {
            let mut payload = json!({
                "text_prompts": [{"text": prompt}],
                "cfg_scale": 7.0,
                "motion_bucket_id": 40,
                "seconds": duration_secs,
                "resolution": resolution,
            });
            if let Some(style) = style {
                payload["style_preset"] = json!(style);
            }
            payload
        }
        JobParams::Avatar {
            description,
            style,
            gender,
            reference_image_url,
        } => {
            let mut payload = json!({
                "text_prompts": [{"text": description}],
                "style_preset": style,
                "gender": gender,
            });
            if let Some(url) = reference_image_url {
                payload["reference_image"] = json!(url);
            }
            payload
        }
        JobParams::FashionPhoto {
            description,
            model_type,
            outfit_style,
            lighting,
            background,
            resolution,
        } => {
            let mut payload = json!({
                "text_prompts": [{"text": description}],
                "model_type": model_type,
                "lighting": lighting,
                "resolution": resolution,
            });
            if let Some(outfit) = outfit_style {
                payload["outfit_style"] = json!(outfit);
            }
            if let Some(background) = background {
                payload["background"] = json!(background);
            }
            payload
        }
        JobParams::ImageToVideo {
            source_url,
            motion,
            duration_secs,
        } => json!({
            "image_url": source_url,
            "motion_bucket_id": 40,
            "motion_preset": motion,
            "seconds": duration_secs,
        }),
    }
}

/// Map a non-success HTTP status to the retry classification. 408, 429,
/// and all 5xx are worth retrying; other client errors mean the request
/// itself was rejected.
fn classify(status: u16, body: &str) -> ProviderError {
    let message = format!("Provider API error ({status}): {body}");
    match status {
        408 | 429 => ProviderError::Transient(message),
        s if s >= 500 => ProviderError::Transient(message),
        _ => ProviderError::Permanent(message),
    }
}

/// Normalize the provider's status vocabulary into a [`PollOutcome`].
///
/// A success report without an asset URL is treated as transient so the
/// next poll can pick it up once the provider finishes publishing.
fn normalize_outcome(response: &StatusResponse) -> Result<PollOutcome, ProviderError> {
    match response.status.to_ascii_lowercase().as_str() {
        "succeeded" | "complete" | "completed" => match response.asset_url() {
            Some(url) => Ok(PollOutcome::Succeeded {
                asset_url: url.to_string(),
            }),
            None => Err(ProviderError::Transient(
                "Provider reported success without an asset URL".to_string(),
            )),
        },
        "failed" | "error" => Ok(PollOutcome::Failed {
            reason: response.failure_reason(),
        }),
        _ => Ok(PollOutcome::Processing),
    }
}
