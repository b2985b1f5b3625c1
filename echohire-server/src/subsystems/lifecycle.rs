//! Interview session lifecycle
//!
//! - create: allocate and persist the record (`scheduled`, or `ai_guided_setup`)
//! - start_call: ask the call provider for a call; a failed request leaves a
//!   durable `scheduled` record behind instead of failing the operation
//! - stop: local cancellation first, provider notification best-effort afterwards
//! - record_external_call_id: write-once association for client-started calls

use std::sync::Arc;

use chrono::Utc;
use echohire_core::config::CallProviderConfig;
use echohire_core::models::{InterviewRecord, InterviewStatus, NewInterview};
use echohire_core::providers::{CallHandle, CallRequest, CallTarget, StopVariant};
use echohire_core::{CallProvider, DocumentStore, ServiceError};
use serde::Serialize;
use tokio::task::JoinHandle;

pub const DEFAULT_JOB_TITLE: &str = "Software Engineer";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedInterview {
    pub interview: InterviewRecord,
    /// `None` when no call could be requested.
    pub call: Option<CallHandle>,
}

pub struct StopOutcome {
    pub interview: InterviewRecord,
    /// Background provider notification; yields the variant that was accepted.
    pub remote: Option<JoinHandle<Option<StopVariant>>>,
}

pub struct SessionLifecycle {
    store: Arc<dyn DocumentStore>,
    calls: Arc<dyn CallProvider>,
    config: CallProviderConfig,
}

impl SessionLifecycle {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        calls: Arc<dyn CallProvider>,
        config: CallProviderConfig,
    ) -> Self {
        Self {
            store,
            calls,
            config,
        }
    }

    /// Load an interview and check that `caller` owns it.
    pub async fn get_owned(
        &self,
        interview_id: &str,
        caller: &str,
    ) -> Result<InterviewRecord, ServiceError> {
        let record = self
            .store
            .get_interview(interview_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("interview {}", interview_id)))?;
        record.ensure_owner(caller)?;
        Ok(record)
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<InterviewRecord>, ServiceError> {
        let mut records = self.store.list_interviews(owner).await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Persist a new interview without contacting the call provider.
    pub async fn create(
        &self,
        input: NewInterview,
        owner: &str,
    ) -> Result<InterviewRecord, ServiceError> {
        let now = Utc::now();
        let record = InterviewRecord {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner.to_string(),
            job_title: input
                .job_title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_JOB_TITLE.to_string()),
            company: input.company,
            candidate_name: input.candidate_name,
            scheduled_at: input.scheduled_at.unwrap_or(now),
            interview_type: input.interview_type,
            experience_level: input.experience_level,
            questions: input.questions,
            ai_guided: input.ai_guided,
            status: if input.ai_guided {
                InterviewStatus::AiGuidedSetup
            } else {
                InterviewStatus::Scheduled
            },
            call: Default::default(),
            overall_score: None,
            feedback_generated: false,
            created_at: now,
            updated_at: now,
        };

        self.store.put_interview(&record).await?;
        tracing::info!(
            interview_id = %record.id,
            status = %record.status,
            "Interview created"
        );
        Ok(record)
    }

    /// Create the interview, then request its call.
    pub async fn create_and_start(
        &self,
        input: NewInterview,
        owner: &str,
    ) -> Result<StartedInterview, ServiceError> {
        let phone = input.phone.clone();
        let record = self.create(input, owner).await?;
        self.request_call(record, phone).await
    }

    /// Request a call for an existing interview.
    pub async fn start_call(
        &self,
        interview_id: &str,
        caller: &str,
        phone: Option<String>,
    ) -> Result<StartedInterview, ServiceError> {
        let record = self.get_owned(interview_id, caller).await?;
        if record.status.is_terminal() {
            return Err(ServiceError::PreconditionFailed(format!(
                "interview is already {}",
                record.status
            )));
        }
        if record.call.call_id.is_some() {
            return Err(ServiceError::Conflict("a call is already linked".to_string()));
        }
        self.request_call(record, phone).await
    }

    fn call_target(&self, ai_guided: bool) -> Option<CallTarget> {
        let workflow = self.config.workflow_id.clone().filter(|w| !w.is_empty());
        let assistant = self.config.assistant_id.clone().filter(|a| !a.is_empty());
        match (ai_guided, workflow, assistant) {
            (true, Some(w), _) => Some(CallTarget::Workflow(w)),
            (_, _, Some(a)) => Some(CallTarget::Assistant(a)),
            (false, Some(w), None) => Some(CallTarget::Workflow(w)),
            _ => None,
        }
    }

    async fn request_call(
        &self,
        record: InterviewRecord,
        phone: Option<String>,
    ) -> Result<StartedInterview, ServiceError> {
        let Some(target) = self.call_target(record.ai_guided) else {
            tracing::warn!(interview_id = %record.id, "No assistant or workflow configured; call not requested");
            return self.fall_back_to_scheduled(record).await;
        };

        let request = CallRequest {
            interview_id: record.id.clone(),
            user_id: record.owner_id.clone(),
            candidate_name: record.candidate_name.clone(),
            target,
            phone_number_id: phone.filter(|p| !p.trim().is_empty()),
        };

        let handle = match self.calls.create_call(&request).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(
                    interview_id = %record.id,
                    provider = self.calls.name(),
                    error = %e,
                    "Call request failed; interview stays scheduled"
                );
                return self.fall_back_to_scheduled(record).await;
            }
        };

        let updated = self
            .store
            .modify_interview(&record.id, &mut |r: &mut InterviewRecord| {
                let mut changed = false;
                if let Some(call_id) = handle.call_id.as_deref() {
                    if r.call.call_id.is_none() {
                        r.call.call_id = Some(call_id.to_string());
                        changed = true;
                    }
                    changed |= r.advance_status(InterviewStatus::InProgress);
                }
                if handle.web_call_url.is_some() && r.call.web_call_url != handle.web_call_url {
                    r.call.web_call_url = handle.web_call_url.clone();
                    changed = true;
                }
                if r.call.provider_status.as_deref() != Some(handle.status.as_str()) {
                    r.call.provider_status = Some(handle.status.clone());
                    changed = true;
                }
                if changed {
                    r.touch();
                }
                changed
            })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("interview {}", record.id)))?;

        tracing::info!(
            interview_id = %updated.id,
            call_id = updated.call.call_id.as_deref().unwrap_or("-"),
            status = %updated.status,
            "Call requested"
        );
        Ok(StartedInterview {
            interview: updated,
            call: Some(handle),
        })
    }

    async fn fall_back_to_scheduled(
        &self,
        record: InterviewRecord,
    ) -> Result<StartedInterview, ServiceError> {
        let interview = self
            .store
            .modify_interview(&record.id, &mut |r: &mut InterviewRecord| {
                let changed = r.status == InterviewStatus::AiGuidedSetup
                    && r.advance_status(InterviewStatus::Scheduled);
                if changed {
                    r.touch();
                }
                changed
            })
            .await?
            .unwrap_or(record);
        Ok(StartedInterview {
            interview,
            call: None,
        })
    }

    /// Cancel locally, then notify the provider in the background.
    pub async fn stop(&self, interview_id: &str, caller: &str) -> Result<StopOutcome, ServiceError> {
        self.get_owned(interview_id, caller).await?;

        let interview = self
            .store
            .modify_interview(interview_id, &mut |r: &mut InterviewRecord| {
                let changed = r.advance_status(InterviewStatus::Cancelled);
                if changed {
                    r.touch();
                }
                changed
            })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("interview {}", interview_id)))?;

        if interview.status != InterviewStatus::Cancelled {
            tracing::info!(
                interview_id = %interview_id,
                status = %interview.status,
                "Stop ignored for finished interview"
            );
            return Ok(StopOutcome {
                interview,
                remote: None,
            });
        }
        tracing::info!(interview_id = %interview_id, "Interview cancelled");

        let remote = interview.call.call_id.clone().map(|call_id| {
            let calls = self.calls.clone();
            tokio::spawn(async move { notify_stop(calls.as_ref(), &call_id).await })
        });

        Ok(StopOutcome { interview, remote })
    }

    /// Link a call started by the client. The id is write-once.
    pub async fn record_external_call_id(
        &self,
        interview_id: &str,
        caller: &str,
        call_id: &str,
    ) -> Result<InterviewRecord, ServiceError> {
        let call_id = call_id.trim();
        if call_id.is_empty() {
            return Err(ServiceError::PreconditionFailed("call id is empty".to_string()));
        }
        self.get_owned(interview_id, caller).await?;

        if let Some(other) = self.store.find_interview_by_call_id(call_id).await? {
            if other.id != interview_id {
                return Err(ServiceError::Conflict(format!(
                    "call {} belongs to another interview",
                    call_id
                )));
            }
        }

        let mut existing: Option<String> = None;
        let updated = self
            .store
            .modify_interview(interview_id, &mut |r: &mut InterviewRecord| {
                match r.call.call_id.as_deref() {
                    Some(current) if current != call_id => {
                        existing = Some(current.to_string());
                        return false;
                    }
                    Some(_) => {}
                    None => r.call.call_id = Some(call_id.to_string()),
                }
                r.advance_status(InterviewStatus::InProgress);
                r.touch();
                true
            })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("interview {}", interview_id)))?;

        if let Some(current) = existing {
            return Err(ServiceError::Conflict(format!(
                "interview already linked to call {}",
                current
            )));
        }

        tracing::info!(interview_id = %interview_id, call_id = %call_id, "External call id recorded");
        Ok(updated)
    }
}

/// Try each stop request shape until the provider accepts one.
pub async fn notify_stop(calls: &dyn CallProvider, call_id: &str) -> Option<StopVariant> {
    for variant in StopVariant::ORDERED {
        match calls.stop_call(call_id, variant).await {
            Ok(()) => {
                tracing::debug!(call_id = %call_id, variant = variant.label(), "Provider accepted stop");
                return Some(variant);
            }
            Err(e) => {
                tracing::debug!(call_id = %call_id, variant = variant.label(), error = %e, "Stop variant rejected");
            }
        }
    }
    tracing::warn!(call_id = %call_id, "Provider rejected every stop variant; local cancellation stands");
    None
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{interview, store_with, FakeCallProvider};
    use echohire_core::MemoryStore;
    use std::sync::atomic::Ordering;

    fn configured() -> CallProviderConfig {
        CallProviderConfig {
            assistant_id: Some("asst-1".to_string()),
            workflow_id: Some("wf-1".to_string()),
            ..CallProviderConfig::default()
        }
    }

    fn lifecycle(
        store: Arc<MemoryStore>,
        calls: Arc<FakeCallProvider>,
    ) -> SessionLifecycle {
        SessionLifecycle::new(store, calls, configured())
    }

    fn phone_input(ai_guided: bool) -> NewInterview {
        NewInterview {
            job_title: Some("Platform Engineer".to_string()),
            ai_guided,
            phone: Some("pn-1".to_string()),
            ..NewInterview::default()
        }
    }

    // ========================================================================
    // TEST 1: a phone call links the id and moves to inProgress
    // ========================================================================
    #[tokio::test]
    async fn test_create_and_start_phone_call() {
        let store = Arc::new(MemoryStore::new());
        let calls = Arc::new(FakeCallProvider::default());
        let lc = lifecycle(store.clone(), calls.clone());

        let started = lc.create_and_start(phone_input(false), "user-1").await.unwrap();
        let id = started.interview.id.clone();
        assert_eq!(started.interview.status, InterviewStatus::InProgress);
        assert_eq!(started.interview.call.call_id, Some(format!("call-{}", id)));
        assert_eq!(calls.create_calls.load(Ordering::SeqCst), 1);

        let stored = store.get_interview(&id).await.unwrap().unwrap();
        assert_eq!(stored, started.interview);
    }

    #[tokio::test]
    async fn test_candidate_name_and_web_url_reach_the_call() {
        let store = Arc::new(MemoryStore::new());
        let calls = Arc::new(FakeCallProvider {
            web_call_url: Some("https://vapi.example/web/9".to_string()),
            ..FakeCallProvider::default()
        });
        let lc = lifecycle(store.clone(), calls.clone());

        let input = NewInterview {
            candidate_name: Some("Grace Hopper".to_string()),
            ..phone_input(false)
        };
        let started = lc.create_and_start(input, "user-1").await.unwrap();
        assert_eq!(started.interview.candidate_name.as_deref(), Some("Grace Hopper"));
        assert_eq!(
            started.interview.call.web_call_url.as_deref(),
            Some("https://vapi.example/web/9")
        );

        let request = calls.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.candidate_name.as_deref(), Some("Grace Hopper"));
        assert_eq!(request.user_id, "user-1");
    }

    // ========================================================================
    // TEST 2: provider failure still leaves a durable scheduled record
    // ========================================================================
    #[tokio::test]
    async fn test_provider_failure_keeps_scheduled_record() {
        let store = Arc::new(MemoryStore::new());
        let calls = Arc::new(FakeCallProvider {
            fail_create: true,
            ..FakeCallProvider::default()
        });
        let lc = lifecycle(store.clone(), calls);

        let started = lc.create_and_start(phone_input(true), "user-1").await.unwrap();
        assert!(started.call.is_none());
        assert_eq!(started.interview.status, InterviewStatus::Scheduled);

        let stored = store.get_interview(&started.interview.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InterviewStatus::Scheduled);
        assert!(stored.call.call_id.is_none());
    }

    #[tokio::test]
    async fn test_no_target_configured_stays_scheduled() {
        let store = Arc::new(MemoryStore::new());
        let calls = Arc::new(FakeCallProvider::default());
        let lc = SessionLifecycle::new(store, calls.clone(), CallProviderConfig::default());

        let started = lc.create_and_start(phone_input(false), "user-1").await.unwrap();
        assert_eq!(started.interview.status, InterviewStatus::Scheduled);
        assert_eq!(calls.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_web_call_waits_for_client_id() {
        let store = Arc::new(MemoryStore::new());
        let lc = lifecycle(store, Arc::new(FakeCallProvider::default()));

        let input = NewInterview {
            phone: None,
            ..phone_input(true)
        };
        let started = lc.create_and_start(input, "user-1").await.unwrap();
        assert!(started.call.is_some());
        assert!(started.interview.call.call_id.is_none());
        assert_eq!(started.interview.status, InterviewStatus::AiGuidedSetup);
        assert_eq!(started.interview.job_title, "Platform Engineer");
    }

    #[test]
    fn test_call_target_selection() {
        let lc = lifecycle(
            Arc::new(MemoryStore::new()),
            Arc::new(FakeCallProvider::default()),
        );
        assert_eq!(lc.call_target(true), Some(CallTarget::Workflow("wf-1".to_string())));
        assert_eq!(lc.call_target(false), Some(CallTarget::Assistant("asst-1".to_string())));
    }

    // ========================================================================
    // TEST 3: stop cancels locally even when the provider rejects everything
    // ========================================================================
    #[tokio::test]
    async fn test_stop_is_local_first() {
        let store = store_with(&[interview("i-1", InterviewStatus::InProgress, Some("call-1"))]).await;
        let calls = Arc::new(FakeCallProvider::default());
        let lc = lifecycle(store.clone(), calls.clone());

        let outcome = lc.stop("i-1", "user-1").await.unwrap();
        assert_eq!(outcome.interview.status, InterviewStatus::Cancelled);
        assert_eq!(outcome.remote.unwrap().await.unwrap(), None);
        assert_eq!(calls.stop_attempts.lock().unwrap().len(), StopVariant::ORDERED.len());

        let stored = store.get_interview("i-1").await.unwrap().unwrap();
        assert_eq!(stored.status, InterviewStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_stop_first_accepted_variant_wins() {
        let store = store_with(&[interview("i-1", InterviewStatus::InProgress, Some("call-1"))]).await;
        let calls = Arc::new(FakeCallProvider {
            accepted_stop: Some(StopVariant::PostActions),
            ..FakeCallProvider::default()
        });
        let lc = lifecycle(store, calls.clone());

        let outcome = lc.stop("i-1", "user-1").await.unwrap();
        assert_eq!(outcome.remote.unwrap().await.unwrap(), Some(StopVariant::PostActions));
        assert_eq!(
            *calls.stop_attempts.lock().unwrap(),
            vec![StopVariant::PatchAction, StopVariant::PatchEmpty, StopVariant::PostActions]
        );
    }

    #[tokio::test]
    async fn test_stop_after_completion_is_ignored() {
        let store = store_with(&[interview("i-1", InterviewStatus::Completed, Some("call-1"))]).await;
        let calls = Arc::new(FakeCallProvider::default());
        let lc = lifecycle(store, calls.clone());

        let outcome = lc.stop("i-1", "user-1").await.unwrap();
        assert_eq!(outcome.interview.status, InterviewStatus::Completed);
        assert!(outcome.remote.is_none());
        assert!(calls.stop_attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_other_owner_denied() {
        let store = store_with(&[interview("i-1", InterviewStatus::InProgress, None)]).await;
        let lc = lifecycle(store, Arc::new(FakeCallProvider::default()));
        assert!(matches!(
            lc.stop("i-1", "intruder").await,
            Err(ServiceError::AccessDenied)
        ));
    }

    // ========================================================================
    // TEST 4: external call ids are write-once
    // ========================================================================
    #[tokio::test]
    async fn test_record_external_call_id_write_once() {
        let store = store_with(&[
            interview("i-1", InterviewStatus::AiGuidedSetup, None),
            interview("i-2", InterviewStatus::Scheduled, Some("call-taken")),
        ])
        .await;
        let lc = lifecycle(store, Arc::new(FakeCallProvider::default()));

        let updated = lc.record_external_call_id("i-1", "user-1", "call-abc").await.unwrap();
        assert_eq!(updated.call.call_id.as_deref(), Some("call-abc"));
        assert_eq!(updated.status, InterviewStatus::InProgress);

        let again = lc.record_external_call_id("i-1", "user-1", "call-abc").await.unwrap();
        assert_eq!(again.call.call_id.as_deref(), Some("call-abc"));

        assert!(matches!(
            lc.record_external_call_id("i-1", "user-1", "call-other").await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            lc.record_external_call_id("i-1", "user-1", "call-taken").await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            lc.record_external_call_id("i-1", "user-1", "  ").await,
            Err(ServiceError::PreconditionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_start_call_rejects_finished_or_linked() {
        let store = store_with(&[
            interview("done", InterviewStatus::Completed, None),
            interview("linked", InterviewStatus::InProgress, Some("call-1")),
        ])
        .await;
        let lc = lifecycle(store, Arc::new(FakeCallProvider::default()));

        assert!(matches!(
            lc.start_call("done", "user-1", None).await,
            Err(ServiceError::PreconditionFailed(_))
        ));
        assert!(matches!(
            lc.start_call("linked", "user-1", None).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            lc.start_call("missing", "user-1", None).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    // ========================================================================
    // TEST 5: listing is newest-created first, whatever the schedule
    // ========================================================================
    #[tokio::test]
    async fn test_list_orders_by_creation_time() {
        let base = Utc::now();
        let mut old = interview("old", InterviewStatus::Scheduled, None);
        old.created_at = base - chrono::Duration::days(3);
        old.scheduled_at = base + chrono::Duration::days(30);
        let mut new = interview("new", InterviewStatus::Scheduled, None);
        new.created_at = base;
        new.scheduled_at = base - chrono::Duration::milliseconds(1500);
        let mut mid = interview("mid", InterviewStatus::Scheduled, None);
        mid.created_at = base - chrono::Duration::days(1);
        let mut other = interview("other", InterviewStatus::Scheduled, None);
        other.owner_id = "user-2".to_string();

        let store = store_with(&[old, new, mid, other]).await;
        let lc = lifecycle(store, Arc::new(FakeCallProvider::default()));

        let ids: Vec<String> = lc
            .list("user-1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }
}
