//! Inbound call-provider webhook
//!
//! Every event is acknowledged with `{ok, message}`; nothing here surfaces as
//! an HTTP error, so the provider never enters a retry loop. When both a
//! shared secret and a signature header are present, the raw body must carry
//! a valid HMAC-SHA256 signature.
//!
//! Field aliases accepted:
//! - call id: `id | callId | call_id`
//! - status: `status | state`
//! - duration: `duration | callDuration`
//! - locators: `transcriptUrl | transcript_url`, `recordingUrl | recording_url`
//! - end reason: `endedReason | ended_reason`
//! - interview: `metadata.interviewId | metadata.interview_id`

use std::sync::Arc;

use echohire_core::models::InterviewRecord;
use echohire_core::{DocumentStore, ServiceError};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;

use super::reconcile::{CallStatusReconciler, ReconcileOutcome, SignalOrigin, StatusSignal};

pub const SIGNATURE_HEADERS: [&str; 2] = ["x-signature", "x-vapi-signature"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookAck {
    pub ok: bool,
    pub message: String,
}

impl WebhookAck {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Provider event reduced to the fields reconciliation cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallEvent {
    pub call_id: Option<String>,
    pub status: Option<String>,
    pub duration_seconds: Option<f64>,
    pub transcript_url: Option<String>,
    pub recording_url: Option<String>,
    pub ended_reason: Option<String>,
    pub interview_id: Option<String>,
}

impl CallEvent {
    pub fn from_value(body: &Value) -> Self {
        // Some deliveries wrap the event as {"message": {..., "call": {...}}}.
        let event = match body.get("message") {
            Some(inner) if inner.is_object() => inner,
            _ => body,
        };
        let call = event.get("call").filter(|c| c.is_object());
        let metadata = event
            .get("metadata")
            .filter(|m| m.is_object())
            .or_else(|| call.and_then(|c| c.get("metadata")));

        Self {
            call_id: first_text(event, &["id", "callId", "call_id"])
                .or_else(|| call.and_then(|c| first_text(c, &["id"]))),
            status: first_text(event, &["status", "state"]),
            duration_seconds: ["duration", "callDuration"]
                .iter()
                .find_map(|k| event.get(*k).and_then(number)),
            transcript_url: first_text(event, &["transcriptUrl", "transcript_url"]),
            recording_url: first_text(event, &["recordingUrl", "recording_url"]),
            ended_reason: first_text(event, &["endedReason", "ended_reason"])
                .or_else(|| call.and_then(|c| first_text(c, &["endedReason"]))),
            interview_id: metadata.and_then(|m| first_text(m, &["interviewId", "interview_id"])),
        }
    }

    fn signal(&self) -> StatusSignal {
        StatusSignal {
            raw_status: self.status.clone().unwrap_or_default(),
            duration_seconds: self.duration_seconds,
            transcript_url: self.transcript_url.clone(),
            recording_url: self.recording_url.clone(),
            ended_reason: self.ended_reason.clone(),
            origin: SignalOrigin::Webhook,
        }
    }
}

fn first_text(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        v.get(*k)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Check a hex HMAC-SHA256 signature of `body`. A `sha256=` prefix is tolerated.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let hex = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Some(expected) = decode_hex(hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub struct WebhookIntake {
    store: Arc<dyn DocumentStore>,
    reconciler: Arc<CallStatusReconciler>,
    secret: Option<String>,
}

impl WebhookIntake {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        reconciler: Arc<CallStatusReconciler>,
        secret: Option<String>,
    ) -> Self {
        Self {
            store,
            reconciler,
            secret,
        }
    }

    pub fn requires_signatures(&self) -> bool {
        self.secret.is_some()
    }

    /// Process one delivery. Never fails.
    pub async fn handle(&self, signature: Option<&str>, body: &[u8]) -> WebhookAck {
        if let (Some(secret), Some(signature)) = (self.secret.as_deref(), signature) {
            if !verify_signature(secret, body, signature) {
                tracing::warn!("Webhook rejected: invalid signature");
                return WebhookAck::rejected("invalid signature");
            }
        }

        let value: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Webhook rejected: body is not JSON");
                return WebhookAck::rejected("invalid payload");
            }
        };

        let event = CallEvent::from_value(&value);
        match self.process(&event).await {
            Ok(Some(outcome)) => WebhookAck::ok(format!("interview {} is {}", outcome.interview.id, outcome.interview.status)),
            Ok(None) => {
                tracing::info!(call_id = event.call_id.as_deref().unwrap_or("-"), "Webhook for unknown interview ignored");
                WebhookAck::ok("no matching interview")
            }
            Err(e) => {
                tracing::error!(error = %e, "Webhook processing failed");
                WebhookAck::rejected(e.to_string())
            }
        }
    }

    /// Locate the interview, link the call id if missing, and reconcile.
    pub async fn process(&self, event: &CallEvent) -> Result<Option<ReconcileOutcome>, ServiceError> {
        let Some(record) = self.locate(event).await? else {
            return Ok(None);
        };

        if let Some(call_id) = event.call_id.as_deref() {
            match record.call.call_id.as_deref() {
                None => self.link_call_id(&record.id, call_id).await?,
                Some(current) if current != call_id => {
                    tracing::warn!(
                        interview_id = %record.id,
                        stored = %current,
                        incoming = %call_id,
                        "Webhook call id differs from linked call; keeping linked id"
                    );
                }
                Some(_) => {}
            }
        }

        self.reconciler
            .reconcile(&record.id, event.signal())
            .await
            .map(Some)
    }

    /// Link `call_id` unless another interview already owns it.
    async fn link_call_id(&self, interview_id: &str, call_id: &str) -> Result<(), ServiceError> {
        if let Some(owner) = self.store.find_interview_by_call_id(call_id).await? {
            if owner.id != interview_id {
                tracing::warn!(
                    interview_id = %interview_id,
                    owner = %owner.id,
                    call_id = %call_id,
                    "Webhook call id already linked to another interview; not linking"
                );
                return Ok(());
            }
        }

        self.store
            .modify_interview(interview_id, &mut |r: &mut InterviewRecord| {
                if r.call.call_id.is_some() {
                    return false;
                }
                r.call.call_id = Some(call_id.to_string());
                r.touch();
                true
            })
            .await?;
        tracing::info!(interview_id = %interview_id, call_id = %call_id, "Call id linked from webhook");
        Ok(())
    }

    async fn locate(&self, event: &CallEvent) -> Result<Option<InterviewRecord>, ServiceError> {
        if let Some(id) = event.interview_id.as_deref() {
            if let Some(record) = self.store.get_interview(id).await? {
                return Ok(Some(record));
            }
        }
        match event.call_id.as_deref() {
            Some(call_id) => Ok(self.store.find_interview_by_call_id(call_id).await?),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
