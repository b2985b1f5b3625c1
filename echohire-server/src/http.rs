//! EchoHire HTTP REST API
//!
//! Axum-based HTTP server for practice dialogues, interviews, feedback and
//! the call-provider webhook.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Caller identity comes from the `X-User-Id` header, set by the
//! authenticating proxy in front of this service.
//!
//! Endpoints:
//! - GET  /health, /version
//! - POST /workflow/start, /workflow/message, /workflow/finalize
//! - GET  /workflow/summary/:session_id
//! - POST /interviews, GET /interviews, GET /interviews/:id
//! - POST /interviews/:id/start-ai, /complete-ai, /call-id, /stop-ai
//! - GET  /interviews/:id/ai-status, /transcript
//! - POST /interviews/:id/ai-feedback?force=
//! - POST /interviews/:id/feedback (manual), GET /interviews/:id/feedback
//! - POST /webhooks/call

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use echohire_core::config::HttpConfig;
use echohire_core::models::{FeedbackSource, ManualFeedback, NewInterview};
use echohire_core::ServiceError;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::services::Services;
use crate::subsystems::dialogue::FinalizeOptions;
use crate::subsystems::feedback::SynthesisOutcome;
use crate::subsystems::webhook::SIGNATURE_HEADERS;

pub const USER_HEADER: &str = "x-user-id";

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub services: Services,
    /// Present when the document store is PostgreSQL; used by /health.
    pub pool: Option<PgPool>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/workflow/start", post(workflow_start_handler))
        .route("/workflow/message", post(workflow_message_handler))
        .route("/workflow/summary/:session_id", get(workflow_summary_handler))
        .route("/workflow/finalize", post(workflow_finalize_handler))
        .route("/interviews", post(create_interview_handler).get(list_interviews_handler))
        .route("/interviews/:id", get(get_interview_handler))
        .route("/interviews/:id/start-ai", post(start_call_handler))
        .route("/interviews/:id/ai-status", get(call_status_handler))
        .route("/interviews/:id/complete-ai", post(complete_handler))
        .route("/interviews/:id/call-id", post(call_id_handler))
        .route("/interviews/:id/stop-ai", post(stop_handler))
        .route("/interviews/:id/transcript", get(transcript_handler))
        .route("/interviews/:id/ai-feedback", post(ai_feedback_handler))
        .route(
            "/interviews/:id/feedback",
            post(manual_feedback_handler).get(get_feedback_handler),
        )
        .route("/webhooks/call", post(webhook_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    services: Services,
    pool: Option<PgPool>,
    config: HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(HttpState { services, pool });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("EchoHire HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMessageRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub session_id: String,
    pub company_name: Option<String>,
    /// RFC 3339 timestamp or a plain `YYYY-MM-DD` date.
    pub interview_date: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub auto_start: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartCallRequest {
    /// Provider phone number id; omit for a browser call.
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIdRequest {
    pub call_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct FeedbackQuery {
    #[serde(default)]
    pub force: bool,
}

// ============================================================================
// Error mapping
// ============================================================================

pub fn status_for(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::AccessDenied => StatusCode::FORBIDDEN,
        ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ServiceError::PreconditionFailed(_) | ServiceError::Conflict(_) => StatusCode::CONFLICT,
        ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_body(error: &ServiceError) -> (StatusCode, Value) {
    let status = status_for(error);
    if status.is_server_error() {
        tracing::error!(error = %error, "Request failed");
    }
    (
        status,
        json!({
            "error": error.to_string(),
            "code": error.code(),
            "status": "error",
        }),
    )
}

fn respond(result: Result<Value, ServiceError>) -> (StatusCode, Value) {
    respond_with(StatusCode::OK, result)
}

fn respond_with(ok: StatusCode, result: Result<Value, ServiceError>) -> (StatusCode, Value) {
    match result {
        Ok(body) => (ok, body),
        Err(e) => error_body(&e),
    }
}

fn bad_request(message: &str) -> (StatusCode, Value) {
    (
        StatusCode::BAD_REQUEST,
        json!({ "error": message, "code": "bad_request", "status": "error" }),
    )
}

fn require_caller(caller: Option<&str>) -> Result<&str, ServiceError> {
    caller
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(ServiceError::Unauthenticated)
}

pub fn caller_from(headers: &HeaderMap) -> Option<&str> {
    headers.get(USER_HEADER).and_then(|v| v.to_str().ok())
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check. Queries PostgreSQL when it backs the store.
pub async fn health_inner(state: &HttpState) -> (StatusCode, Value) {
    let postgresql = match &state.pool {
        Some(pool) => match echohire_core::db::health_check(pool).await {
            Ok(v) => Value::String(v),
            Err(e) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({
                        "status": "unhealthy",
                        "error": e.to_string(),
                    }),
                );
            }
        },
        None => Value::Null,
    };

    (
        StatusCode::OK,
        json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "store": state.services.store.name(),
            "postgresql": postgresql,
        }),
    )
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "echohire",
    })
}

pub async fn workflow_start_inner(services: &Services, caller: Option<&str>) -> (StatusCode, Value) {
    respond(
        async {
            let owner = require_caller(caller)?;
            let session_id = uuid::Uuid::new_v4().to_string();
            let reply = services.dialogue.process_turn(&session_id, owner, "").await?;
            Ok::<_, ServiceError>(json!(reply))
        }
        .await,
    )
}

pub async fn workflow_message_inner(
    services: &Services,
    caller: Option<&str>,
    req: WorkflowMessageRequest,
) -> (StatusCode, Value) {
    let owner = match require_caller(caller) {
        Ok(owner) => owner,
        Err(e) => return error_body(&e),
    };
    let session_id = match req.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return bad_request("sessionId is required"),
    };
    respond(
        services
            .dialogue
            .process_turn(&session_id, owner, &req.message)
            .await
            .map(|reply| json!(reply)),
    )
}

pub async fn workflow_summary_inner(
    services: &Services,
    caller: Option<&str>,
    session_id: &str,
) -> (StatusCode, Value) {
    respond(
        async {
            let owner = require_caller(caller)?;
            let summary = services.dialogue.get_summary(session_id, owner).await?;
            Ok::<_, ServiceError>(json!(summary))
        }
        .await,
    )
}

/// Accepts RFC 3339 or a bare date, which is taken as midnight UTC.
pub fn parse_interview_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

pub async fn workflow_finalize_inner(
    services: &Services,
    caller: Option<&str>,
    req: FinalizeRequest,
) -> (StatusCode, Value) {
    let scheduled_at = match req.interview_date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => match parse_interview_date(raw) {
            Some(ts) => Some(ts),
            None => return bad_request("interviewDate must be RFC 3339 or YYYY-MM-DD"),
        },
        None => None,
    };
    let options = FinalizeOptions {
        company: req.company_name,
        scheduled_at,
        phone: req.phone,
        auto_start: req.auto_start,
    };
    let result = async {
        let owner = require_caller(caller)?;
        let input = services
            .dialogue
            .finalize(&req.session_id, owner, options)
            .await?;
        create_from_input(services, owner, input).await
    }
    .await;
    respond_with(StatusCode::CREATED, result)
}

async fn create_from_input(
    services: &Services,
    owner: &str,
    input: NewInterview,
) -> Result<Value, ServiceError> {
    if input.auto_start {
        let started = services.lifecycle.create_and_start(input, owner).await?;
        Ok(json!(started))
    } else {
        let interview = services.lifecycle.create(input, owner).await?;
        Ok(json!({ "interview": interview, "call": null }))
    }
}

pub async fn create_interview_inner(
    services: &Services,
    caller: Option<&str>,
    input: NewInterview,
) -> (StatusCode, Value) {
    let result = async {
        let owner = require_caller(caller)?;
        create_from_input(services, owner, input).await
    }
    .await;
    respond_with(StatusCode::CREATED, result)
}

pub async fn list_interviews_inner(services: &Services, caller: Option<&str>) -> (StatusCode, Value) {
    respond(
        async {
            let owner = require_caller(caller)?;
            let interviews = services.lifecycle.list(owner).await?;
            Ok::<_, ServiceError>(json!({ "count": interviews.len(), "interviews": interviews }))
        }
        .await,
    )
}

pub async fn get_interview_inner(
    services: &Services,
    caller: Option<&str>,
    id: &str,
) -> (StatusCode, Value) {
    respond(
        async {
            let owner = require_caller(caller)?;
            let interview = services.lifecycle.get_owned(id, owner).await?;
            Ok::<_, ServiceError>(json!({ "interview": interview }))
        }
        .await,
    )
}

pub async fn start_call_inner(
    services: &Services,
    caller: Option<&str>,
    id: &str,
    req: StartCallRequest,
) -> (StatusCode, Value) {
    respond(
        async {
            let owner = require_caller(caller)?;
            let started = services.lifecycle.start_call(id, owner, req.phone).await?;
            Ok::<_, ServiceError>(json!(started))
        }
        .await,
    )
}

pub async fn call_status_inner(
    services: &Services,
    caller: Option<&str>,
    id: &str,
) -> (StatusCode, Value) {
    respond(
        async {
            let owner = require_caller(caller)?;
            let record = services.lifecycle.get_owned(id, owner).await?;
            let polled = services.reconciler.poll_status(record).await?;
            Ok::<_, ServiceError>(json!(polled))
        }
        .await,
    )
}

pub async fn complete_inner(
    services: &Services,
    caller: Option<&str>,
    id: &str,
    req: CompleteRequest,
) -> (StatusCode, Value) {
    respond(
        async {
            let owner = require_caller(caller)?;
            services.lifecycle.get_owned(id, owner).await?;
            let outcome = services.reconciler.mark_complete(id, req.duration_seconds).await?;
            Ok::<_, ServiceError>(json!({
                "interview": outcome.interview,
                "feedbackScheduled": outcome.synthesis.is_some(),
            }))
        }
        .await,
    )
}

pub async fn call_id_inner(
    services: &Services,
    caller: Option<&str>,
    id: &str,
    req: CallIdRequest,
) -> (StatusCode, Value) {
    if req.call_id.trim().is_empty() {
        return bad_request("callId is required");
    }
    respond(
        async {
            let owner = require_caller(caller)?;
            let interview = services
                .lifecycle
                .record_external_call_id(id, owner, &req.call_id)
                .await?;
            Ok::<_, ServiceError>(json!({ "ok": true, "interview": interview }))
        }
        .await,
    )
}

pub async fn stop_inner(services: &Services, caller: Option<&str>, id: &str) -> (StatusCode, Value) {
    respond(
        async {
            let owner = require_caller(caller)?;
            let outcome = services.lifecycle.stop(id, owner).await?;
            Ok::<_, ServiceError>(json!({
                "interview": outcome.interview,
                "providerNotified": outcome.remote.is_some(),
            }))
        }
        .await,
    )
}

pub async fn transcript_inner(
    services: &Services,
    caller: Option<&str>,
    id: &str,
) -> (StatusCode, Value) {
    respond(
        async {
            let owner = require_caller(caller)?;
            let record = services.lifecycle.get_owned(id, owner).await?;
            match services.transcripts.acquire(&record).await? {
                Some(t) => Ok(json!(t)),
                None => Err(ServiceError::NotFound(format!("transcript for interview {}", id))),
            }
        }
        .await,
    )
}

pub async fn ai_feedback_inner(
    services: &Services,
    caller: Option<&str>,
    id: &str,
    query: FeedbackQuery,
) -> (StatusCode, Value) {
    let result = async {
        let owner = require_caller(caller)?;
        services.lifecycle.get_owned(id, owner).await?;
        services
            .feedback
            .synthesize(id, query.force, FeedbackSource::AiOnDemand)
            .await
    }
    .await;

    match result {
        Ok(outcome @ SynthesisOutcome::PendingTranscript) => (StatusCode::ACCEPTED, json!(outcome)),
        Ok(outcome) => (StatusCode::OK, json!(outcome)),
        Err(e) => error_body(&e),
    }
}

pub async fn manual_feedback_inner(
    services: &Services,
    caller: Option<&str>,
    id: &str,
    input: ManualFeedback,
) -> (StatusCode, Value) {
    let result = async {
        let owner = require_caller(caller)?;
        let record = services.lifecycle.get_owned(id, owner).await?;
        let artifact = services.feedback.submit_manual(&record, input).await?;
        Ok::<_, ServiceError>(json!({ "feedback": artifact }))
    }
    .await;
    respond_with(StatusCode::CREATED, result)
}

pub async fn get_feedback_inner(
    services: &Services,
    caller: Option<&str>,
    id: &str,
) -> (StatusCode, Value) {
    respond(
        async {
            let owner = require_caller(caller)?;
            services.lifecycle.get_owned(id, owner).await?;
            match services.feedback.latest(id).await? {
                Some(artifact) => Ok(json!({ "feedback": artifact })),
                None => Err(ServiceError::NotFound(format!("feedback for interview {}", id))),
            }
        }
        .await,
    )
}

/// Inner webhook. Always 200 with `{ok, message}`.
pub async fn webhook_inner(services: &Services, headers: &HeaderMap, body: &[u8]) -> Value {
    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|h| headers.get(*h).and_then(|v| v.to_str().ok()));
    json!(services.webhook.handle(signature, body).await)
}

// ============================================================================
// Axum handler wrappers (thin: delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn workflow_start_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = workflow_start_inner(&state.services, caller_from(&headers)).await;
    (status, Json(body))
}

pub async fn workflow_message_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Json(req): Json<WorkflowMessageRequest>,
) -> impl IntoResponse {
    let (status, body) = workflow_message_inner(&state.services, caller_from(&headers), req).await;
    (status, Json(body))
}

pub async fn workflow_summary_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) =
        workflow_summary_inner(&state.services, caller_from(&headers), &session_id).await;
    (status, Json(body))
}

pub async fn workflow_finalize_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Json(req): Json<FinalizeRequest>,
) -> impl IntoResponse {
    let (status, body) = workflow_finalize_inner(&state.services, caller_from(&headers), req).await;
    (status, Json(body))
}

pub async fn create_interview_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Json(input): Json<NewInterview>,
) -> impl IntoResponse {
    let (status, body) = create_interview_inner(&state.services, caller_from(&headers), input).await;
    (status, Json(body))
}

pub async fn list_interviews_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = list_interviews_inner(&state.services, caller_from(&headers)).await;
    (status, Json(body))
}

pub async fn get_interview_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = get_interview_inner(&state.services, caller_from(&headers), &id).await;
    (status, Json(body))
}

pub async fn start_call_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<StartCallRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let (status, body) = start_call_inner(&state.services, caller_from(&headers), &id, req).await;
    (status, Json(body))
}

pub async fn call_status_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = call_status_inner(&state.services, caller_from(&headers), &id).await;
    (status, Json(body))
}

pub async fn complete_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<CompleteRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let (status, body) = complete_inner(&state.services, caller_from(&headers), &id, req).await;
    (status, Json(body))
}

pub async fn call_id_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<CallIdRequest>,
) -> impl IntoResponse {
    let (status, body) = call_id_inner(&state.services, caller_from(&headers), &id, req).await;
    (status, Json(body))
}

pub async fn stop_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = stop_inner(&state.services, caller_from(&headers), &id).await;
    (status, Json(body))
}

pub async fn transcript_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = transcript_inner(&state.services, caller_from(&headers), &id).await;
    (status, Json(body))
}

pub async fn ai_feedback_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<FeedbackQuery>,
) -> impl IntoResponse {
    let (status, body) = ai_feedback_inner(&state.services, caller_from(&headers), &id, query).await;
    (status, Json(body))
}

pub async fn manual_feedback_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<ManualFeedback>,
) -> impl IntoResponse {
    let (status, body) = manual_feedback_inner(&state.services, caller_from(&headers), &id, input).await;
    (status, Json(body))
}

pub async fn get_feedback_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = get_feedback_inner(&state.services, caller_from(&headers), &id).await;
    (status, Json(body))
}

pub async fn webhook_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    (StatusCode::OK, Json(webhook_inner(&state.services, &headers, &body).await))
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{interview, FakeCallProvider, FixedAnalysis};
    use echohire_core::models::InterviewStatus;
    use echohire_core::{DocumentStore, EchoHireConfig, MemoryStore};

    async fn services_with(records: &[echohire_core::models::InterviewRecord]) -> Services {
        let store = Arc::new(MemoryStore::new());
        for r in records {
            store.put_interview(r).await.unwrap();
        }
        Services::build(
            EchoHireConfig::default(),
            store,
            Arc::new(FakeCallProvider::with_transcript("user: hello there.")),
            Arc::new(FixedAnalysis::new(r#"{"overallScore": 64}"#)),
            None,
        )
    }

    // ========================================================================
    // TEST 1: version_inner is pure and returns correct fields
    // ========================================================================
    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["service"], "echohire");
    }

    // ========================================================================
    // TEST 2: error taxonomy maps to distinct status codes
    // ========================================================================
    #[test]
    fn test_status_for_taxonomy() {
        assert_eq!(status_for(&ServiceError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&ServiceError::AccessDenied), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&ServiceError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&ServiceError::PreconditionFailed("x".into())),
            StatusCode::CONFLICT
        );
        let (_, body) = error_body(&ServiceError::Conflict("x".into()));
        assert_eq!(body["code"], "conflict");
        let (_, body) = error_body(&ServiceError::PreconditionFailed("x".into()));
        assert_eq!(body["code"], "precondition_failed");
    }

    // ========================================================================
    // TEST 3: health without PostgreSQL reports the memory store
    // ========================================================================
    #[tokio::test]
    async fn test_health_inner_memory_store() {
        let state = HttpState {
            services: services_with(&[]).await,
            pool: None,
        };
        let (status, body) = health_inner(&state).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store"], "memory");
        assert!(body["postgresql"].is_null());
    }

    #[tokio::test]
    async fn test_missing_caller_is_unauthenticated() {
        let services = services_with(&[]).await;
        let (status, body) = list_interviews_inner(&services, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthenticated");

        let (status, _) = get_interview_inner(&services, Some("  "), "i-1").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // ========================================================================
    // TEST 4: ownership and existence checks
    // ========================================================================
    #[tokio::test]
    async fn test_get_interview_owner_checks() {
        let services = services_with(&[interview("i-1", InterviewStatus::Scheduled, None)]).await;

        let (status, body) = get_interview_inner(&services, Some("user-1"), "i-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["interview"]["status"], "scheduled");

        let (status, _) = get_interview_inner(&services, Some("user-2"), "i-1").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = get_interview_inner(&services, Some("user-1"), "nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // ========================================================================
    // TEST 5: feedback before completion is a distinct, retryable error
    // ========================================================================
    #[tokio::test]
    async fn test_ai_feedback_precondition_then_success() {
        let services =
            services_with(&[interview("i-1", InterviewStatus::InProgress, Some("call-1"))]).await;

        let (status, body) =
            ai_feedback_inner(&services, Some("user-1"), "i-1", FeedbackQuery::default()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "precondition_failed");

        let (status, _) = complete_inner(&services, Some("user-1"), "i-1", CompleteRequest::default()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            ai_feedback_inner(&services, Some("user-1"), "i-1", FeedbackQuery::default()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["feedback"]["overallScore"], 64);

        let (status, body) = get_feedback_inner(&services, Some("user-1"), "i-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["feedback"]["overallScore"], 64);
    }

    // ========================================================================
    // TEST 6: workflow routes need a caller and a session id
    // ========================================================================
    #[tokio::test]
    async fn test_workflow_message_requires_session() {
        let services = services_with(&[]).await;
        let (status, _) = workflow_start_inner(&services, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = workflow_message_inner(
            &services,
            Some("user-1"),
            WorkflowMessageRequest {
                session_id: None,
                message: "hi".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = workflow_start_inner(&services, Some("user-1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "COLLECTING_ROLE");
    }

    // ========================================================================
    // TEST 7: another user cannot drive or read someone else's dialogue
    // ========================================================================
    #[tokio::test]
    async fn test_workflow_session_belongs_to_starter() {
        let services = services_with(&[]).await;
        let (_, body) = workflow_start_inner(&services, Some("user-1")).await;
        let session_id = body["sessionId"].as_str().unwrap().to_string();

        let (status, _) = workflow_message_inner(
            &services,
            Some("user-2"),
            WorkflowMessageRequest {
                session_id: Some(session_id.clone()),
                message: "Backend Engineer".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = workflow_summary_inner(&services, Some("user-2"), &session_id).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = workflow_summary_inner(&services, Some("user-1"), &session_id).await;
        assert_eq!(status, StatusCode::OK);
    }

    // ========================================================================
    // TEST 8: finalize carries company name and interview date
    // ========================================================================
    #[tokio::test]
    async fn test_workflow_finalize_uses_company_and_date() {
        let services = services_with(&[]).await;
        let (_, body) = workflow_start_inner(&services, Some("user-1")).await;
        let session_id = body["sessionId"].as_str().unwrap().to_string();

        let bad = FinalizeRequest {
            session_id: session_id.clone(),
            company_name: None,
            interview_date: Some("next tuesday".to_string()),
            phone: None,
            auto_start: false,
        };
        let (status, _) = workflow_finalize_inner(&services, Some("user-1"), bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = FinalizeRequest {
            session_id,
            company_name: Some("Acme".to_string()),
            interview_date: Some("2026-11-02".to_string()),
            phone: None,
            auto_start: false,
        };
        let (status, body) = workflow_finalize_inner(&services, Some("user-1"), req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["interview"]["company"], "Acme");
        let id = body["interview"]["id"].as_str().unwrap();
        let stored = services.store.get_interview(id).await.unwrap().unwrap();
        assert_eq!(stored.scheduled_at, parse_interview_date("2026-11-02").unwrap());
        assert_eq!(stored.scheduled_at.to_rfc3339(), "2026-11-02T00:00:00+00:00");
    }

    #[test]
    fn test_parse_interview_date_forms() {
        let ts = parse_interview_date("2026-11-02T15:30:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-11-02T13:30:00+00:00");
        assert!(parse_interview_date("2026-13-40").is_none());
    }
}
