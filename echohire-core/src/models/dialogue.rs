use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phases of the preference-gathering dialogue, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialoguePhase {
    Greeting,
    CollectingRole,
    CollectingType,
    CollectingLevel,
    GeneratingQuestions,
    Asking,
    Feedback,
    Complete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub role: Option<String>,
    pub interview_type: Option<String>,
    pub experience_level: Option<String>,
}

impl Preferences {
    pub fn role_or_default(&self) -> &str {
        self.role.as_deref().filter(|r| !r.is_empty()).unwrap_or("the role")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: u32,
    #[serde(alias = "question")]
    pub text: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub difficulty: String,
}

/// Transient per-user dialogue state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueSession {
    pub id: String,
    /// Caller that started the dialogue; only they may continue or finalize it.
    #[serde(default)]
    pub owner_id: String,
    pub phase: DialoguePhase,
    pub preferences: Preferences,
    pub questions: Vec<Question>,
    /// Index of the question currently awaiting an answer.
    pub current_index: usize,
    pub answers: Vec<String>,
    pub feedback: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl DialogueSession {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            phase: DialoguePhase::Greeting,
            preferences: Preferences::default(),
            questions: Vec::new(),
            current_index: 0,
            answers: Vec::new(),
            feedback: Vec::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn ensure_owner(&self, caller: &str) -> Result<(), crate::error::ServiceError> {
        if self.owner_id == caller {
            Ok(())
        } else {
            Err(crate::error::ServiceError::AccessDenied)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase == DialoguePhase::Complete
    }

    pub fn summary(&self) -> DialogueSummary {
        DialogueSummary {
            session_id: self.id.clone(),
            phase: self.phase,
            preferences: self.preferences.clone(),
            questions: self.questions.clone(),
            answers: self.answers.clone(),
            feedback: self.feedback.clone(),
            completed: self.is_complete(),
        }
    }
}

/// Result of one dialogue turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    pub session_id: String,
    pub phase: DialoguePhase,
    pub reply: String,
    /// 1-based number of the question currently asked, 0 before questions exist.
    pub question_index: usize,
    pub total_questions: usize,
    pub preferences: Preferences,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueSummary {
    pub session_id: String,
    pub phase: DialoguePhase,
    pub preferences: Preferences,
    pub questions: Vec<Question>,
    pub answers: Vec<String>,
    pub feedback: Vec<String>,
    pub completed: bool,
}
