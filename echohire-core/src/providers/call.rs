//! Call provider: voice-call placement and tracking.
//!
//! Vapi is the only real backend. Response payloads are read loosely since
//! field names vary between API revisions (`status|state`,
//! `duration|callDuration`, camel- and snake-case locators).

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::ProviderError;
use crate::config::CallProviderConfig;
use crate::models::{render_turns, TranscriptTurn};

pub const API_KEY_ENV: &str = "VAPI_API_KEY";

/// Status reported for web calls that the client must start itself.
pub const CLIENT_INIT_STATUS: &str = "ready_for_client_init";

// ============================================================================
// Types
// ============================================================================

/// What the provider should run on the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallTarget {
    #[serde(rename = "assistantId")]
    Assistant(String),
    #[serde(rename = "workflowId")]
    Workflow(String),
}

#[derive(Debug, Clone)]
pub struct CallRequest {
    pub interview_id: String,
    pub user_id: String,
    pub candidate_name: Option<String>,
    pub target: CallTarget,
    /// Provider phone number id. `None` means a browser call started client-side.
    pub phone_number_id: Option<String>,
}

impl CallRequest {
    fn metadata(&self) -> Value {
        serde_json::json!({
            "interviewId": self.interview_id,
            "userId": self.user_id,
            "candidateName": self.candidate_name.as_deref().unwrap_or("Candidate"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHandle {
    /// Absent for client-initiated web calls until the client reports it.
    pub call_id: Option<String>,
    pub status: String,
    pub web_call_url: Option<String>,
    /// Everything the browser SDK needs to start the call itself.
    pub client_init: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallStatusReport {
    pub status: String,
    pub duration_seconds: Option<f64>,
    pub transcript_url: Option<String>,
    pub recording_url: Option<String>,
    pub ended_reason: Option<String>,
}

/// Transcript as returned by the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptPayload {
    Text(String),
    Turns(Vec<TranscriptTurn>),
}

impl TranscriptPayload {
    /// Flatten to `role: message` lines.
    pub fn render(&self) -> String {
        match self {
            TranscriptPayload::Text(text) => text.trim().to_string(),
            TranscriptPayload::Turns(turns) => render_turns(turns),
        }
    }

    /// Read a transcript body: a flat string, a list of turns, or an object
    /// carrying `messages` or `transcript`. Blank transcripts are `NotFound`.
    pub fn from_body(raw: String) -> Result<Self, ProviderError> {
        let body = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
        Self::from_json(body)
    }

    fn from_json(body: Value) -> Result<Self, ProviderError> {
        let turns_of = |v: &Value| -> Option<Vec<TranscriptTurn>> {
            serde_json::from_value::<Vec<TranscriptTurn>>(v.clone()).ok()
        };

        let payload = match &body {
            Value::String(s) => Some(TranscriptPayload::Text(s.clone())),
            Value::Array(_) => turns_of(&body).map(TranscriptPayload::Turns),
            Value::Object(map) => map
                .get("messages")
                .and_then(turns_of)
                .filter(|t| !t.is_empty())
                .map(TranscriptPayload::Turns)
                .or_else(|| {
                    map.get("transcript")
                        .and_then(Value::as_str)
                        .map(|s| TranscriptPayload::Text(s.to_string()))
                }),
            _ => None,
        };

        match payload {
            Some(p) if !p.render().is_empty() => Ok(p),
            Some(_) => Err(ProviderError::NotFound),
            None => Err(ProviderError::Malformed("unrecognised transcript shape".to_string())),
        }
    }
}

/// Request shapes tried, in order, to end a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopVariant {
    PatchAction,
    PatchEmpty,
    PostActions,
    PostEnd,
    Delete,
}

impl StopVariant {
    pub const ORDERED: [StopVariant; 5] = [
        StopVariant::PatchAction,
        StopVariant::PatchEmpty,
        StopVariant::PostActions,
        StopVariant::PostEnd,
        StopVariant::Delete,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StopVariant::PatchAction => "patch-action",
            StopVariant::PatchEmpty => "patch-empty",
            StopVariant::PostActions => "post-actions",
            StopVariant::PostEnd => "post-end",
            StopVariant::Delete => "delete-call",
        }
    }
}

// ============================================================================
// CallProvider trait
// ============================================================================

#[async_trait]
pub trait CallProvider: Send + Sync {
    async fn create_call(&self, request: &CallRequest) -> Result<CallHandle, ProviderError>;

    async fn get_status(&self, call_id: &str) -> Result<CallStatusReport, ProviderError>;

    /// `Err(ProviderError::NotFound)` when the provider has no transcript.
    async fn get_transcript(&self, call_id: &str) -> Result<TranscriptPayload, ProviderError>;

    /// Try a single stop request shape. `Ok(())` means the provider accepted it.
    async fn stop_call(&self, call_id: &str, variant: StopVariant) -> Result<(), ProviderError>;

    fn name(&self) -> &str;
}

pub fn create_call_provider(
    config: &CallProviderConfig,
    api_key: Option<String>,
) -> Arc<dyn CallProvider> {
    let api_key = api_key
        .or_else(|| std::env::var(API_KEY_ENV).ok())
        .filter(|k| !k.trim().is_empty());

    let Some(api_key) = api_key else {
        tracing::warn!("{} not set; interviews are recorded without voice calls", API_KEY_ENV);
        return Arc::new(DisabledCallProvider);
    };

    match VapiCallClient::new(config.clone(), api_key) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build call provider client");
            Arc::new(DisabledCallProvider)
        }
    }
}

// ============================================================================
// VapiCallClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct VapiCallClient {
    client: Client,
    config: CallProviderConfig,
    api_key: String,
}

impl VapiCallClient {
    pub fn new(config: CallProviderConfig, api_key: String) -> Result<Self, ProviderError> {
        if api_key.is_empty() {
            return Err(ProviderError::NotConfigured("call"));
        }
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Create a client against a custom base URL (for testing)
    pub fn with_base_url(
        mut config: CallProviderConfig,
        api_key: String,
        base_url: String,
    ) -> Result<Self, ProviderError> {
        config.base_url = base_url;
        Self::new(config, api_key)
    }

    fn request(&self, method: Method, path: &str, timeout_secs: u64) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.config.base_url.trim_end_matches('/'), path))
            .bearer_auth(&self.api_key)
            .header("x-api-key", &self.api_key)
            .timeout(Duration::from_secs(timeout_secs))
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        timeout_secs: u64,
    ) -> Result<reqwest::Response, ProviderError> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(timeout_secs)
            } else {
                ProviderError::Http(e.without_url())
            }
        })
    }

    fn client_init(&self, request: &CallRequest) -> CallHandle {
        let mut init = serde_json::json!({
            "status": CLIENT_INIT_STATUS,
            "publicKey": self.config.public_key,
            "metadata": request.metadata(),
        });
        match &request.target {
            CallTarget::Assistant(id) => init["assistantId"] = Value::from(id.as_str()),
            CallTarget::Workflow(id) => init["workflowId"] = Value::from(id.as_str()),
        }
        init["metadata"]["initMode"] = Value::from("client");

        CallHandle {
            call_id: None,
            status: CLIENT_INIT_STATUS.to_string(),
            web_call_url: None,
            client_init: Some(init),
        }
    }
}

async fn api_error(response: reqwest::Response) -> ProviderError {
    let code = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    ProviderError::Api { code, message }
}

fn str_field(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| body.get(*k))
        .find_map(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn f64_field(body: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| body.get(*k)).find_map(Value::as_f64)
}

#[async_trait]
impl CallProvider for VapiCallClient {
    async fn create_call(&self, request: &CallRequest) -> Result<CallHandle, ProviderError> {
        let Some(phone_number_id) = request.phone_number_id.as_deref() else {
            tracing::info!(interview_id = %request.interview_id, "Web call; returning client init config");
            return Ok(self.client_init(request));
        };

        let mut body = serde_json::json!({
            "metadata": request.metadata(),
            "phoneNumberId": phone_number_id,
        });
        match &request.target {
            CallTarget::Assistant(id) => body["assistantId"] = Value::from(id.as_str()),
            CallTarget::Workflow(id) => body["workflowId"] = Value::from(id.as_str()),
        }

        let timeout = self.config.create_timeout_seconds;
        let response = self
            .send(self.request(Method::POST, "/call", timeout).json(&body), timeout)
            .await?;

        if !response.status().is_success() {
            let err = api_error(response).await;
            tracing::error!(interview_id = %request.interview_id, error = %err, "Call creation rejected");
            return Err(err);
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.without_url().to_string()))?;

        let call_id = str_field(&data, &["id", "callId"])
            .ok_or_else(|| ProviderError::Malformed("call response without id".to_string()))?;

        Ok(CallHandle {
            call_id: Some(call_id),
            status: str_field(&data, &["status"]).unwrap_or_else(|| "initiated".to_string()),
            web_call_url: str_field(&data, &["webCallUrl", "web_call_url"]),
            client_init: None,
        })
    }

    async fn get_status(&self, call_id: &str) -> Result<CallStatusReport, ProviderError> {
        let timeout = self.config.status_timeout_seconds;
        let path = format!("/call/{}", call_id);
        let response = self.send(self.request(Method::GET, &path, timeout), timeout).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound);
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.without_url().to_string()))?;

        let status = str_field(&data, &["status", "state"])
            .ok_or_else(|| ProviderError::Malformed("status response without status".to_string()))?;

        Ok(CallStatusReport {
            status,
            duration_seconds: f64_field(&data, &["duration", "callDuration"]),
            transcript_url: str_field(&data, &["transcriptUrl", "transcript_url"]),
            recording_url: str_field(&data, &["recordingUrl", "recording_url"]),
            ended_reason: str_field(&data, &["endedReason", "ended_reason"]),
        })
    }

    async fn get_transcript(&self, call_id: &str) -> Result<TranscriptPayload, ProviderError> {
        let timeout = self.config.transcript_timeout_seconds;
        let path = format!("/call/{}/transcript", call_id);
        let response = self.send(self.request(Method::GET, &path, timeout), timeout).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound);
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        TranscriptPayload::from_body(response.text().await?)
    }

    async fn stop_call(&self, call_id: &str, variant: StopVariant) -> Result<(), ProviderError> {
        let timeout = self.config.stop_timeout_seconds;
        let base = format!("/call/{}", call_id);
        let builder = match variant {
            StopVariant::PatchAction => self
                .request(Method::PATCH, &base, timeout)
                .json(&serde_json::json!({ "action": "end" })),
            StopVariant::PatchEmpty => self.request(Method::PATCH, &base, timeout),
            StopVariant::PostActions => self
                .request(Method::POST, &format!("{}/actions", base), timeout)
                .json(&serde_json::json!({ "action": "end" })),
            StopVariant::PostEnd => self.request(Method::POST, &format!("{}/end", base), timeout),
            StopVariant::Delete => self.request(Method::DELETE, &base, timeout),
        };

        let response = self.send(builder, timeout).await?;
        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(api_error(response).await),
        }
    }

    fn name(&self) -> &str {
        "vapi"
    }
}

// ============================================================================
// DisabledCallProvider
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCallProvider;

#[async_trait]
impl CallProvider for DisabledCallProvider {
    async fn create_call(&self, _request: &CallRequest) -> Result<CallHandle, ProviderError> {
        Err(ProviderError::NotConfigured("call"))
    }

    async fn get_status(&self, _call_id: &str) -> Result<CallStatusReport, ProviderError> {
        Err(ProviderError::NotConfigured("call"))
    }

    async fn get_transcript(&self, _call_id: &str) -> Result<TranscriptPayload, ProviderError> {
        Err(ProviderError::NotConfigured("call"))
    }

    async fn stop_call(&self, _call_id: &str, _variant: StopVariant) -> Result<(), ProviderError> {
        Err(ProviderError::NotConfigured("call"))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

// ============================================================================
// TESTS
// ============================================================================
