//! Fakes shared by the subsystem unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use echohire_core::models::{CallRecord, InterviewRecord, InterviewStatus};
use echohire_core::providers::{
    CallHandle, CallRequest, CallStatusReport, ProviderError, StopVariant, TranscriptPayload,
};
use echohire_core::{AnalysisProvider, CallProvider, DocumentStore, MemoryStore};

#[derive(Default)]
pub struct FakeCallProvider {
    pub fail_create: bool,
    pub status: Mutex<Option<CallStatusReport>>,
    pub transcript: Mutex<Option<String>>,
    /// The only stop shape the fake accepts.
    pub accepted_stop: Option<StopVariant>,
    pub stop_attempts: Mutex<Vec<StopVariant>>,
    pub create_calls: AtomicUsize,
    pub transcript_calls: AtomicUsize,
    pub last_request: Mutex<Option<CallRequest>>,
    /// Returned as the web call URL of every created call.
    pub web_call_url: Option<String>,
}

impl FakeCallProvider {
    pub fn with_transcript(text: &str) -> Self {
        Self {
            transcript: Mutex::new(Some(text.to_string())),
            ..Self::default()
        }
    }

    pub fn set_status(&self, status: &str) {
        *self.status.lock().unwrap() = Some(CallStatusReport {
            status: status.to_string(),
            ..CallStatusReport::default()
        });
    }
}

#[async_trait]
impl CallProvider for FakeCallProvider {
    async fn create_call(&self, request: &CallRequest) -> Result<CallHandle, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if self.fail_create {
            return Err(ProviderError::Timeout(30));
        }
        Ok(CallHandle {
            call_id: request
                .phone_number_id
                .as_ref()
                .map(|_| format!("call-{}", request.interview_id)),
            status: "queued".to_string(),
            web_call_url: self.web_call_url.clone(),
            client_init: None,
        })
    }

    async fn get_status(&self, _call_id: &str) -> Result<CallStatusReport, ProviderError> {
        self.status
            .lock()
            .unwrap()
            .clone()
            .ok_or(ProviderError::Timeout(30))
    }

    async fn get_transcript(&self, _call_id: &str) -> Result<TranscriptPayload, ProviderError> {
        self.transcript_calls.fetch_add(1, Ordering::SeqCst);
        self.transcript
            .lock()
            .unwrap()
            .clone()
            .map(TranscriptPayload::Text)
            .ok_or(ProviderError::NotFound)
    }

    async fn stop_call(&self, _call_id: &str, variant: StopVariant) -> Result<(), ProviderError> {
        self.stop_attempts.lock().unwrap().push(variant);
        if self.accepted_stop == Some(variant) {
            Ok(())
        } else {
            Err(ProviderError::Api {
                code: 405,
                message: "method not allowed".to_string(),
            })
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Returns the same text for every prompt and counts calls.
pub struct FixedAnalysis {
    pub text: String,
    pub calls: AtomicUsize,
}

impl FixedAnalysis {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AnalysisProvider for FixedAnalysis {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

pub fn interview(id: &str, status: InterviewStatus, call_id: Option<&str>) -> InterviewRecord {
    let now = Utc::now();
    InterviewRecord {
        id: id.to_string(),
        owner_id: "user-1".to_string(),
        job_title: "Backend Engineer".to_string(),
        company: Some("Acme".to_string()),
        candidate_name: None,
        scheduled_at: now,
        interview_type: Some("technical".to_string()),
        experience_level: Some("mid".to_string()),
        questions: Vec::new(),
        ai_guided: true,
        status,
        call: CallRecord {
            call_id: call_id.map(str::to_string),
            ..CallRecord::default()
        },
        overall_score: None,
        feedback_generated: false,
        created_at: now,
        updated_at: now,
    }
}

pub async fn store_with(records: &[InterviewRecord]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for r in records {
        store.put_interview(r).await.unwrap();
    }
    store
}
