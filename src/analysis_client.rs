use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::ServiceConfig;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The request never produced a response. The transport detail is kept
    /// for logs; the user-facing message stays generic.
    #[error("Failed to analyze image.")]
    Network(String),
    /// The service responded but rejected the request.
    #[error("{0}")]
    Service(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub enum Ripeness {
    Green,
    Turning,
    Ripe,
    Overripe,
}

impl Ripeness {
    pub fn all() -> &'static [Ripeness] {
        &[
            Ripeness::Green,
            Ripeness::Turning,
            Ripeness::Ripe,
            Ripeness::Overripe,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ripeness::Green => "Green",
            Ripeness::Turning => "Turning",
            Ripeness::Ripe => "Ripe",
            Ripeness::Overripe => "Overripe",
        }
    }
}

impl std::fmt::Display for Ripeness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Warnings {
    #[serde(default)]
    pub too_dark: bool,
    #[serde(default)]
    pub too_blurry: bool,
}

/// Normalized outcome of a classification request. Replaced wholesale on
/// each new analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub is_banana: bool,
    /// Meaningful only when `is_banana` is true
    pub ripeness: Option<Ripeness>,
    pub confidence: f32,
    pub banana_confidence: f32,
    pub warnings: Warnings,
}

impl AnalysisResult {
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence * 100.0).round() as u32
    }
}

/// Wire shape of the service response
#[derive(Debug, Deserialize)]
struct ServiceResponse {
    #[serde(default)]
    is_banana: bool,
    #[serde(default)]
    ripeness: Option<Ripeness>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    banana_confidence: f32,
    #[serde(default)]
    warnings: Warnings,
    #[serde(default)]
    error: Option<String>,
}

/// Classification service abstraction, so the workflow can run against a
/// scripted classifier in tests.
#[async_trait]
pub trait BananaClassifier: Send + Sync {
    async fn analyze(&self, image: &[u8]) -> Result<AnalysisResult, AnalysisError>;
}

/// HTTP client for the remote classification service.
pub struct AnalysisClient {
    client: Client,
    endpoint: String,
}

impl AnalysisClient {
    pub fn new(config: &ServiceConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl BananaClassifier for AnalysisClient {
    async fn analyze(&self, image: &[u8]) -> Result<AnalysisResult, AnalysisError> {
        let part = multipart::Part::bytes(image.to_vec())
            .file_name("capture.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| AnalysisError::Network(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        log::info!("Submitting {} byte image to {}", image.len(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                log::error!("Analysis request failed: {}", e);
                AnalysisError::Network(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        interpret_response(status, &body)
    }
}

/// Map a raw service response into a result or a typed failure.
fn interpret_response(status: StatusCode, body: &[u8]) -> Result<AnalysisResult, AnalysisError> {
    if !status.is_success() {
        let message = serde_json::from_slice::<ServiceResponse>(body)
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| format!("Analysis service returned status {}", status));
        log::warn!("Analysis rejected: {}", message);
        return Err(AnalysisError::Service(message));
    }

    let raw: ServiceResponse = serde_json::from_slice(body)
        .map_err(|e| AnalysisError::Service(format!("Malformed service response: {}", e)))?;

    Ok(AnalysisResult {
        is_banana: raw.is_banana,
        ripeness: raw.ripeness,
        confidence: raw.confidence,
        banana_confidence: raw.banana_confidence,
        warnings: raw.warnings,
    })
}
