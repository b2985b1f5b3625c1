//! Interview record and the canonical status lattice.
//!
//! The canonical status is independent of any provider vocabulary. Provider
//! strings go through [`InterviewStatus::classify`] exactly once; everything
//! downstream works with the enum.
//!
//! Lattice:
//! - `pending | scheduled | ai_guided_setup` (rank 0)
//! - `inProgress` (rank 1)
//! - `completed | failed` (terminal)
//! - `cancelled` (terminal, reachable from any non-terminal state)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dialogue::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterviewStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "scheduled")]
    Scheduled,
    #[serde(rename = "ai_guided_setup")]
    AiGuidedSetup,
    #[serde(rename = "inProgress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl InterviewStatus {
    /// Normalize a provider status string.
    ///
    /// Lower-cases the input; anything containing "completed" or "ended" is
    /// `Completed`, anything containing "failed" is `Failed`, everything else
    /// (including the empty string) is `InProgress`.
    pub fn classify(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        if normalized.contains("completed") || normalized.contains("ended") {
            InterviewStatus::Completed
        } else if normalized.contains("failed") {
            InterviewStatus::Failed
        } else {
            InterviewStatus::InProgress
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InterviewStatus::Completed | InterviewStatus::Failed | InterviewStatus::Cancelled
        )
    }

    fn rank(self) -> u8 {
        match self {
            InterviewStatus::Pending
            | InterviewStatus::Scheduled
            | InterviewStatus::AiGuidedSetup => 0,
            InterviewStatus::InProgress => 1,
            InterviewStatus::Completed | InterviewStatus::Failed | InterviewStatus::Cancelled => 2,
        }
    }

    /// Whether a stored status may be replaced by `next`.
    ///
    /// Terminal values only accept themselves (idempotent re-delivery).
    /// `Cancelled` is accepted from any non-terminal value. Otherwise the
    /// new value must be at least as advanced as the stored one.
    pub fn can_advance_to(self, next: InterviewStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        if next == InterviewStatus::Cancelled {
            return true;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InterviewStatus::Pending => "pending",
            InterviewStatus::Scheduled => "scheduled",
            InterviewStatus::AiGuidedSetup => "ai_guided_setup",
            InterviewStatus::InProgress => "inProgress",
            InterviewStatus::Completed => "completed",
            InterviewStatus::Failed => "failed",
            InterviewStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for InterviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call linkage embedded in the interview record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    /// Write-once external call id.
    pub call_id: Option<String>,
    /// Status string exactly as the provider last reported it.
    pub provider_status: Option<String>,
    pub duration_seconds: Option<f64>,
    pub transcript_url: Option<String>,
    pub recording_url: Option<String>,
    pub web_call_url: Option<String>,
    /// Why the provider ended the call, when it says.
    #[serde(default)]
    pub ended_reason: Option<String>,
}

impl CallRecord {
    /// Merge artifact locators: a present value refines, an absent one never erases.
    pub fn merge_artifacts(
        &mut self,
        duration_seconds: Option<f64>,
        transcript_url: Option<&str>,
        recording_url: Option<&str>,
    ) -> bool {
        let mut changed = false;
        if let Some(d) = duration_seconds {
            if self.duration_seconds != Some(d) {
                self.duration_seconds = Some(d);
                changed = true;
            }
        }
        changed |= refine(&mut self.transcript_url, transcript_url);
        changed |= refine(&mut self.recording_url, recording_url);
        changed
    }

    pub fn note_ended_reason(&mut self, reason: Option<&str>) -> bool {
        refine(&mut self.ended_reason, reason)
    }
}

fn refine(slot: &mut Option<String>, incoming: Option<&str>) -> bool {
    match incoming.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) if slot.as_deref() != Some(value) => {
            *slot = Some(value.to_string());
            true
        }
        _ => false,
    }
}

/// The persisted interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRecord {
    pub id: String,
    pub owner_id: String,
    pub job_title: String,
    pub company: Option<String>,
    #[serde(default)]
    pub candidate_name: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub interview_type: Option<String>,
    pub experience_level: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub ai_guided: bool,
    pub status: InterviewStatus,
    #[serde(default)]
    pub call: CallRecord,
    pub overall_score: Option<u8>,
    #[serde(default)]
    pub feedback_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InterviewRecord {
    pub fn ensure_owner(&self, caller: &str) -> Result<(), crate::error::ServiceError> {
        if self.owner_id == caller {
            Ok(())
        } else {
            Err(crate::error::ServiceError::AccessDenied)
        }
    }

    /// Apply a status through the lattice. Returns true when the stored value changed.
    pub fn advance_status(&mut self, next: InterviewStatus) -> bool {
        if self.status != next && self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Input for creating an interview.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInterview {
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub candidate_name: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub interview_type: Option<String>,
    pub experience_level: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub ai_guided: bool,
    /// Phone number id for a server-placed phone call; web calls start client-side.
    pub phone: Option<String>,
    #[serde(default)]
    pub auto_start: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [InterviewStatus; 7] = [
        InterviewStatus::Pending,
        InterviewStatus::Scheduled,
        InterviewStatus::AiGuidedSetup,
        InterviewStatus::InProgress,
        InterviewStatus::Completed,
        InterviewStatus::Failed,
        InterviewStatus::Cancelled,
    ];

    #[test]
    fn test_classify_vendor_vocabulary() {
        assert_eq!(InterviewStatus::classify("ended"), InterviewStatus::Completed);
        assert_eq!(InterviewStatus::classify("COMPLETED"), InterviewStatus::Completed);
        assert_eq!(InterviewStatus::classify("call-ended-by-user"), InterviewStatus::Completed);
        assert_eq!(InterviewStatus::classify("Failed"), InterviewStatus::Failed);
        assert_eq!(InterviewStatus::classify("pipeline-failed"), InterviewStatus::Failed);
        assert_eq!(InterviewStatus::classify("in-progress"), InterviewStatus::InProgress);
        assert_eq!(InterviewStatus::classify("ringing"), InterviewStatus::InProgress);
        assert_eq!(InterviewStatus::classify(""), InterviewStatus::InProgress);
    }

    #[test]
    fn test_terminal_statuses_only_accept_themselves() {
        for from in ALL.iter().copied().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert_eq!(from.can_advance_to(to), from == to, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_cancel_reachable_from_every_non_terminal_status() {
        for from in ALL.iter().copied().filter(|s| !s.is_terminal()) {
            assert!(from.can_advance_to(InterviewStatus::Cancelled), "{}", from);
        }
    }

    #[test]
    fn test_in_progress_never_regresses_to_setup_states() {
        let s = InterviewStatus::InProgress;
        assert!(!s.can_advance_to(InterviewStatus::Scheduled));
        assert!(!s.can_advance_to(InterviewStatus::Pending));
        assert!(s.can_advance_to(InterviewStatus::InProgress));
        assert!(s.can_advance_to(InterviewStatus::Completed));
    }

    #[test]
    fn test_status_serializes_with_canonical_names() {
        let json = serde_json::to_string(&InterviewStatus::InProgress).unwrap();
        assert_eq!(json, "\"inProgress\"");
        let parsed: InterviewStatus = serde_json::from_str("\"ai_guided_setup\"").unwrap();
        assert_eq!(parsed, InterviewStatus::AiGuidedSetup);
    }

    #[test]
    fn test_merge_artifacts_never_erases() {
        let mut call = CallRecord::default();
        assert!(call.merge_artifacts(Some(120.0), Some("https://t/1"), None));
        assert!(!call.merge_artifacts(None, None, Some("  ")));
        assert_eq!(call.transcript_url.as_deref(), Some("https://t/1"));
        assert_eq!(call.duration_seconds, Some(120.0));

        assert!(call.merge_artifacts(Some(130.0), Some("https://t/2"), Some("https://r/1")));
        assert_eq!(call.transcript_url.as_deref(), Some("https://t/2"));
        assert_eq!(call.recording_url.as_deref(), Some("https://r/1"));
    }
}
