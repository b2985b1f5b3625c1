//! Call status reconciliation
//!
//! Webhook events, client polls and manual completion all funnel into
//! [`CallStatusReconciler::reconcile`]. The raw provider status is classified
//! once, then applied through the status lattice inside a single atomic
//! modification, so out-of-order or duplicate signals can never move a
//! finished interview backwards.
//!
//! A signal that leaves the interview `completed` spawns feedback synthesis.
//! Duplicate spawns are harmless; the synthesizer returns the existing artifact.

use std::sync::Arc;

use echohire_core::models::{FeedbackSource, InterviewRecord, InterviewStatus};
use echohire_core::providers::CallStatusReport;
use echohire_core::{CallProvider, DocumentStore, ServiceError};
use serde::Serialize;
use tokio::task::JoinHandle;

use super::feedback::{FeedbackSynthesizer, SynthesisOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalOrigin {
    Webhook,
    Poll,
    Manual,
}

#[derive(Debug, Clone)]
pub struct StatusSignal {
    pub raw_status: String,
    pub duration_seconds: Option<f64>,
    pub transcript_url: Option<String>,
    pub recording_url: Option<String>,
    pub ended_reason: Option<String>,
    pub origin: SignalOrigin,
}

impl StatusSignal {
    pub fn from_report(report: CallStatusReport, origin: SignalOrigin) -> Self {
        Self {
            raw_status: report.status,
            duration_seconds: report.duration_seconds,
            transcript_url: report.transcript_url,
            recording_url: report.recording_url,
            ended_reason: report.ended_reason,
            origin,
        }
    }
}

pub struct ReconcileOutcome {
    pub interview: InterviewRecord,
    pub classified: InterviewStatus,
    /// Whether the stored record changed.
    pub changed: bool,
    pub synthesis: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutcome {
    pub interview: InterviewRecord,
    /// Status string from the provider, or the cached one when the provider was unreachable.
    pub provider_status: Option<String>,
    pub live: bool,
}

pub struct CallStatusReconciler {
    store: Arc<dyn DocumentStore>,
    calls: Arc<dyn CallProvider>,
    synthesizer: Arc<FeedbackSynthesizer>,
    auto_feedback: bool,
}

impl CallStatusReconciler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        calls: Arc<dyn CallProvider>,
        synthesizer: Arc<FeedbackSynthesizer>,
        auto_feedback: bool,
    ) -> Self {
        Self {
            store,
            calls,
            synthesizer,
            auto_feedback,
        }
    }

    pub async fn reconcile(
        &self,
        interview_id: &str,
        signal: StatusSignal,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let classified = InterviewStatus::classify(&signal.raw_status);
        let raw = signal.raw_status.trim();
        let mut changed = false;

        let interview = self
            .store
            .modify_interview(interview_id, &mut |r: &mut InterviewRecord| {
                // Artifact-only events carry no status.
                changed = !raw.is_empty() && r.advance_status(classified);
                changed |= r.call.merge_artifacts(
                    signal.duration_seconds,
                    signal.transcript_url.as_deref(),
                    signal.recording_url.as_deref(),
                );
                changed |= r.call.note_ended_reason(signal.ended_reason.as_deref());
                if !raw.is_empty() && r.call.provider_status.as_deref() != Some(raw) {
                    r.call.provider_status = Some(raw.to_string());
                    changed = true;
                }
                if changed {
                    r.touch();
                }
                changed
            })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("interview {}", interview_id)))?;

        if changed {
            tracing::info!(
                interview_id = %interview_id,
                origin = ?signal.origin,
                raw_status = %raw,
                status = %interview.status,
                "Interview reconciled"
            );
        } else if !raw.is_empty() && interview.status != classified {
            tracing::debug!(
                interview_id = %interview_id,
                origin = ?signal.origin,
                stored = %interview.status,
                incoming = %classified,
                "Signal ignored by status lattice"
            );
        }

        let synthesis = (self.auto_feedback
            && classified == InterviewStatus::Completed
            && interview.status == InterviewStatus::Completed)
            .then(|| self.spawn_synthesis(interview_id.to_string()));

        Ok(ReconcileOutcome {
            interview,
            classified,
            changed,
            synthesis,
        })
    }

    fn spawn_synthesis(&self, interview_id: String) -> JoinHandle<()> {
        let synthesizer = self.synthesizer.clone();
        tokio::spawn(async move {
            match synthesizer
                .synthesize(&interview_id, false, FeedbackSource::AiAuto)
                .await
            {
                Ok(SynthesisOutcome::Created(a)) => {
                    tracing::info!(interview_id = %interview_id, source = a.source.as_str(), "Auto feedback generated");
                }
                Ok(SynthesisOutcome::Existing(_)) => {
                    tracing::debug!(interview_id = %interview_id, "Auto feedback already present");
                }
                Ok(SynthesisOutcome::PendingTranscript) => {
                    tracing::info!(interview_id = %interview_id, "Auto feedback deferred until transcript is available");
                }
                Err(e) => {
                    tracing::error!(interview_id = %interview_id, error = %e, "Auto feedback failed");
                }
            }
        })
    }

    /// Ask the provider for the live status and reconcile it. Falls back to
    /// the stored record when the provider cannot be reached.
    pub async fn poll_status(&self, record: InterviewRecord) -> Result<PollOutcome, ServiceError> {
        let Some(call_id) = record.call.call_id.clone() else {
            return Ok(cached(record));
        };
        if record.status.is_terminal() {
            return Ok(cached(record));
        }

        match self.calls.get_status(&call_id).await {
            Ok(report) => {
                let provider_status = Some(report.status.clone());
                let outcome = self
                    .reconcile(&record.id, StatusSignal::from_report(report, SignalOrigin::Poll))
                    .await?;
                Ok(PollOutcome {
                    interview: outcome.interview,
                    provider_status,
                    live: true,
                })
            }
            Err(e) => {
                tracing::warn!(
                    interview_id = %record.id,
                    call_id = %call_id,
                    error = %e,
                    "Status check failed; serving stored status"
                );
                Ok(cached(record))
            }
        }
    }

    /// Client-reported end of call. When a call is linked, the provider's
    /// report fills in duration and artifact locators, and the transcript is
    /// cached right away.
    pub async fn mark_complete(
        &self,
        interview_id: &str,
        duration_seconds: Option<f64>,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let record = self
            .store
            .get_interview(interview_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("interview {}", interview_id)))?;

        let mut signal = StatusSignal {
            raw_status: "completed".to_string(),
            duration_seconds,
            transcript_url: None,
            recording_url: None,
            ended_reason: None,
            origin: SignalOrigin::Manual,
        };
        if let Some(call_id) = record.call.call_id.as_deref() {
            match self.calls.get_status(call_id).await {
                Ok(report) => {
                    signal.duration_seconds = duration_seconds.or(report.duration_seconds);
                    signal.transcript_url = report.transcript_url;
                    signal.recording_url = report.recording_url;
                    signal.ended_reason = report.ended_reason;
                }
                Err(e) => {
                    tracing::warn!(
                        interview_id = %interview_id,
                        call_id = %call_id,
                        error = %e,
                        "Status check failed; completing with client data only"
                    );
                }
            }
        }

        let outcome = self.reconcile(interview_id, signal).await?;

        // Synthesis acquires the transcript itself.
        if outcome.synthesis.is_none() && outcome.interview.status == InterviewStatus::Completed {
            match self.synthesizer.transcripts().acquire(&outcome.interview).await {
                Ok(Some(t)) => {
                    tracing::info!(interview_id = %interview_id, source = ?t.served_from, "Transcript cached at completion");
                }
                Ok(None) => {
                    tracing::debug!(interview_id = %interview_id, "No transcript available at completion");
                }
                Err(e) => {
                    tracing::warn!(interview_id = %interview_id, error = %e, "Transcript caching failed");
                }
            }
        }
        Ok(outcome)
    }
}

fn cached(record: InterviewRecord) -> PollOutcome {
    PollOutcome {
        provider_status: record.call.provider_status.clone(),
        interview: record,
        live: false,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
