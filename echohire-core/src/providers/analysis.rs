//! Analysis provider: single-shot text completion.
//!
//! - **Gemini**: `models/{model}:generateContent` with retry on transient failures
//! - **Disabled**: used when no API key is configured; every call fails so the
//!   caller's fallback path runs

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use super::{ProviderError, ProviderErrorKind};
use crate::config::AnalysisConfig;

pub const API_KEY_ENV: &str = "GOOGLE_AI_API_KEY";

// ============================================================================
// AnalysisProvider trait
// ============================================================================

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Send `prompt` and return the raw model text.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Build the analysis provider. Falls back to [`DisabledAnalysisProvider`]
/// when no key is given or set in the environment.
pub fn create_analysis_provider(
    config: &AnalysisConfig,
    api_key: Option<String>,
) -> Arc<dyn AnalysisProvider> {
    let api_key = api_key
        .or_else(|| std::env::var(API_KEY_ENV).ok())
        .filter(|k| !k.trim().is_empty());

    let Some(api_key) = api_key else {
        tracing::warn!("{} not set; question drafting and feedback use fallbacks", API_KEY_ENV);
        return Arc::new(DisabledAnalysisProvider);
    };

    match GeminiAnalysisClient::new(config.clone(), api_key) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build analysis client; using fallbacks");
            Arc::new(DisabledAnalysisProvider)
        }
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiAnalysisClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiAnalysisClient {
    client: Client,
    config: AnalysisConfig,
    api_key: String,
}

impl GeminiAnalysisClient {
    pub fn new(config: AnalysisConfig, api_key: String) -> Result<Self, ProviderError> {
        if api_key.is_empty() {
            return Err(ProviderError::NotConfigured("analysis"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Create a client against a custom base URL (for testing)
    pub fn with_base_url(
        mut config: AnalysisConfig,
        api_key: String,
        base_url: String,
    ) -> Result<Self, ProviderError> {
        config.base_url = base_url;
        Self::new(config, api_key)
    }

    async fn complete_once(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        let request = GenerateRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig { temperature: 0.7 },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = error_detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, message = %message, "Gemini API error");

            return Err(ProviderError::Api { code, message });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.without_url().to_string()))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::Malformed("empty candidate text".to_string()));
        }

        Ok(text)
    }

    fn map_transport(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.config.timeout_seconds)
        } else {
            ProviderError::Http(e.without_url())
        }
    }
}

#[async_trait]
impl AnalysisProvider for GeminiAnalysisClient {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        // A malformed answer will not improve on retry.
        let result = RetryIf::spawn(
            retry_strategy,
            || self.complete_once(prompt),
            |e: &ProviderError| e.kind() == ProviderErrorKind::Unavailable,
        )
        .await;

        match result {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ProviderErrorKind::Malformed => Err(e),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All analysis retry attempts failed"
                );
                Err(ProviderError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// DisabledAnalysisProvider
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAnalysisProvider;

#[async_trait]
impl AnalysisProvider for DisabledAnalysisProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::NotConfigured("analysis"))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

// ============================================================================
// TESTS
// ============================================================================
