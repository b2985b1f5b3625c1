//! Preference dialogue: the conversational practice coach
//!
//! This subsystem is responsible for:
//! - Walking a session through GREETING → ROLE → TYPE → LEVEL → questions → COMPLETE
//! - Drafting exactly 5 questions with the analysis provider (fallback set on any failure)
//! - Producing per-answer feedback (fixed encouragement on any failure)
//! - Evicting abandoned sessions on a timer
//!
//! One input drives exactly one transition. Sessions live behind the
//! [`SessionStore`] trait; the engine never holds a map guard across a
//! provider call.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use echohire_core::config::DialogueConfig;
use echohire_core::models::{
    DialoguePhase, DialogueSession, DialogueSummary, NewInterview, Preferences, Question,
    TurnReply,
};
use echohire_core::providers::extract_json;
use echohire_core::{AnalysisProvider, ServiceError};
use serde::Deserialize;
use tokio::sync::broadcast;

pub const QUESTION_COUNT: usize = 5;

pub const FALLBACK_FEEDBACK: &str = "Good answer! You provided relevant information. To strengthen your response, consider adding more specific examples or metrics to demonstrate your impact. Keep up the great work!";

// ============================================================================
// Session store
// ============================================================================

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &str) -> Option<DialogueSession>;

    async fn save(&self, session: DialogueSession);

    async fn remove(&self, id: &str) -> Option<DialogueSession>;

    /// Drop sessions idle since before `cutoff`. Returns how many were dropped.
    async fn evict_idle(&self, cutoff: DateTime<Utc>) -> usize;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, DialogueSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Option<DialogueSession> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    async fn save(&self, session: DialogueSession) {
        self.sessions.insert(session.id.clone(), session);
    }

    async fn remove(&self, id: &str) -> Option<DialogueSession> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    async fn evict_idle(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.last_active_at >= cutoff);
        before.saturating_sub(self.sessions.len())
    }
}

/// Periodically evict sessions idle longer than the configured TTL.
pub async fn run_session_sweeper(
    sessions: Arc<dyn SessionStore>,
    config: DialogueConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let period = tokio::time::Duration::from_secs(config.sweep_interval_seconds.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        ttl_minutes = config.session_ttl_minutes,
        "Dialogue session sweeper started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let cutoff = Utc::now() - chrono::Duration::minutes(config.session_ttl_minutes as i64);
                let evicted = sessions.evict_idle(cutoff).await;
                if evicted > 0 {
                    tracing::info!(evicted = evicted, "Evicted idle dialogue sessions");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Dialogue session sweeper shutting down");
                break;
            }
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct DialogueEngine {
    sessions: Arc<dyn SessionStore>,
    analysis: Arc<dyn AnalysisProvider>,
}

/// Interview details supplied when a dialogue is finalized.
#[derive(Debug, Clone, Default)]
pub struct FinalizeOptions {
    pub company: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub phone: Option<String>,
    pub auto_start: bool,
}

/// Question as the model drafts it, before numbering.
#[derive(Debug, Deserialize)]
struct DraftQuestion {
    #[serde(alias = "text", default)]
    question: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    difficulty: String,
}

impl DialogueEngine {
    pub fn new(sessions: Arc<dyn SessionStore>, analysis: Arc<dyn AnalysisProvider>) -> Self {
        Self { sessions, analysis }
    }

    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        self.sessions.clone()
    }

    /// Apply one user input. Unknown session ids start a new dialogue owned by `caller`.
    pub async fn process_turn(
        &self,
        session_id: &str,
        caller: &str,
        text: &str,
    ) -> Result<TurnReply, ServiceError> {
        let mut session = match self.sessions.load(session_id).await {
            Some(s) => {
                s.ensure_owner(caller)?;
                s
            }
            None => {
                tracing::info!(session_id = %session_id, "Starting dialogue session");
                DialogueSession::new(session_id, caller)
            }
        };

        let reply = self.advance(&mut session, text.trim()).await;
        session.last_active_at = Utc::now();

        let total_questions = session.questions.len();
        let question_index = if total_questions == 0 {
            0
        } else {
            (session.current_index + 1).min(total_questions)
        };

        let turn = TurnReply {
            session_id: session.id.clone(),
            phase: session.phase,
            reply,
            question_index,
            total_questions,
            preferences: session.preferences.clone(),
        };
        self.sessions.save(session).await;
        Ok(turn)
    }

    async fn load_owned(&self, session_id: &str, caller: &str) -> Result<DialogueSession, ServiceError> {
        let session = self
            .sessions
            .load(session_id)
            .await
            .ok_or_else(|| ServiceError::NotFound(format!("session {}", session_id)))?;
        session.ensure_owner(caller)?;
        Ok(session)
    }

    pub async fn get_summary(
        &self,
        session_id: &str,
        caller: &str,
    ) -> Result<DialogueSummary, ServiceError> {
        Ok(self.load_owned(session_id, caller).await?.summary())
    }

    /// Turn a dialogue into interview input and forget the session.
    pub async fn finalize(
        &self,
        session_id: &str,
        caller: &str,
        options: FinalizeOptions,
    ) -> Result<NewInterview, ServiceError> {
        self.load_owned(session_id, caller).await?;
        let session = self
            .sessions
            .remove(session_id)
            .await
            .ok_or_else(|| ServiceError::NotFound(format!("session {}", session_id)))?;

        Ok(NewInterview {
            job_title: Some(session.preferences.role_or_default().to_string()),
            company: options.company.filter(|c| !c.trim().is_empty()),
            candidate_name: None,
            scheduled_at: options.scheduled_at,
            interview_type: session.preferences.interview_type.clone(),
            experience_level: session.preferences.experience_level.clone(),
            questions: session.questions,
            ai_guided: true,
            phone: options.phone,
            auto_start: options.auto_start,
        })
    }

    async fn advance(&self, session: &mut DialogueSession, input: &str) -> String {
        match session.phase {
            DialoguePhase::Greeting => {
                session.phase = DialoguePhase::CollectingRole;
                "Hello! Welcome to EchoHire's AI Interview Coach. I'm excited to help you practice for your upcoming interviews!\n\n\
                 I'll start by asking you three quick questions to personalize your interview experience, and then we'll dive into a mock interview with feedback after every answer.\n\n\
                 Let's begin! What job role are you interviewing for? For example, Software Engineer, Product Manager, Data Scientist."
                    .to_string()
            }
            DialoguePhase::CollectingRole => {
                session.preferences.role = Some(input.to_string());
                session.phase = DialoguePhase::CollectingType;
                format!(
                    "Perfect! A {} role - that's exciting!\n\n\
                     Now, what type of interview would you like to practice?\n\
                     - Technical: coding, system design and technical skills\n\
                     - Behavioral: situational questions, soft skills and culture fit\n\
                     - Mixed: a combination of both\n\n\
                     Which type would you prefer?",
                    session.preferences.role_or_default()
                )
            }
            DialoguePhase::CollectingType => {
                session.preferences.interview_type = Some(input.to_string());
                session.phase = DialoguePhase::CollectingLevel;
                format!(
                    "Great choice! {} interviews are really valuable to practice.\n\n\
                     One last question - what's your experience level?\n\
                     - Entry Level: 0 to 2 years\n\
                     - Mid Level: 3 to 5 years\n\
                     - Senior Level: 6 or more years",
                    input
                )
            }
            DialoguePhase::CollectingLevel => {
                session.preferences.experience_level = Some(input.to_string());
                session.phase = DialoguePhase::GeneratingQuestions;
                session.questions = self.draft_questions(&session.preferences, &session.id).await;
                session.current_index = 0;
                session.phase = DialoguePhase::Asking;

                let first = session
                    .questions
                    .first()
                    .map(|q| q.text.as_str())
                    .unwrap_or_default();
                format!(
                    "Thank you! I've prepared {} questions for a {} {} {} interview.\n\n\
                     I'll ask them one at a time and give you feedback after each answer. Answer as if this were the real interview.\n\n\
                     Question 1: {}",
                    session.questions.len(),
                    session.preferences.experience_level.as_deref().unwrap_or_default(),
                    session.preferences.role_or_default(),
                    session.preferences.interview_type.as_deref().unwrap_or_default(),
                    first
                )
            }
            DialoguePhase::Asking | DialoguePhase::Feedback | DialoguePhase::GeneratingQuestions => {
                let Some(question) = session.questions.get(session.current_index).cloned() else {
                    session.phase = DialoguePhase::Complete;
                    return closing_summary(&session.preferences);
                };

                session.answers.push(input.to_string());
                session.phase = DialoguePhase::Feedback;
                let feedback = self
                    .answer_feedback(&question, input, &session.preferences, &session.id)
                    .await;
                session.feedback.push(feedback.clone());
                session.current_index += 1;

                match session.questions.get(session.current_index) {
                    Some(next) => {
                        session.phase = DialoguePhase::Asking;
                        format!(
                            "{}\n\nLet's move on to question {}:\n\n{}",
                            feedback,
                            session.current_index + 1,
                            next.text
                        )
                    }
                    None => {
                        session.phase = DialoguePhase::Complete;
                        tracing::info!(session_id = %session.id, "Dialogue complete");
                        format!("{}\n\n{}", feedback, closing_summary(&session.preferences))
                    }
                }
            }
            DialoguePhase::Complete => {
                "Thank you for using EchoHire's AI Interview Coach! Good luck with your interviews!"
                    .to_string()
            }
        }
    }

    async fn draft_questions(&self, prefs: &Preferences, session_id: &str) -> Vec<Question> {
        let prompt = question_prompt(prefs);
        let drafted = match self.analysis.complete(&prompt).await {
            Ok(raw) => match parse_questions(&raw) {
                Some(questions) => questions,
                None => {
                    tracing::warn!(session_id = %session_id, "Unparseable question draft; using fallback set");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Question drafting failed; using fallback set");
                Vec::new()
            }
        };
        complete_question_set(drafted, prefs)
    }

    async fn answer_feedback(
        &self,
        question: &Question,
        answer: &str,
        prefs: &Preferences,
        session_id: &str,
    ) -> String {
        let prompt = format!(
            "Provide constructive interview feedback for this {} {} candidate.\n\n\
             Question: {}\nAnswer: {}\n\n\
             Provide feedback that:\n\
             1. Acknowledges what they did well (be specific)\n\
             2. Offers 1-2 concrete suggestions for improvement\n\
             3. Is encouraging and supportive\n\
             4. Is appropriate for their experience level\n\
             5. Keeps the feedback concise (2-3 sentences max)\n",
            prefs.experience_level.as_deref().unwrap_or_default(),
            prefs.role_or_default(),
            question.text,
            answer
        );

        match self.analysis.complete(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => FALLBACK_FEEDBACK.to_string(),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Answer feedback failed; using fallback");
                FALLBACK_FEEDBACK.to_string()
            }
        }
    }
}

fn question_prompt(prefs: &Preferences) -> String {
    let role = prefs.role_or_default();
    let kind = prefs.interview_type.as_deref().unwrap_or("mixed");
    let level = prefs.experience_level.as_deref().unwrap_or("any");
    format!(
        "Generate exactly 5 interview questions for the following profile:\n\n\
         Job Role: {role}\nInterview Type: {kind}\nExperience Level: {level}\n\n\
         Questions should suit the {level} level, match the {kind} interview type, \
         be relevant to the {role} role and mix difficulty levels.\n\n\
         Respond with a JSON array only:\n\
         [{{\"question\": \"...\", \"category\": \"Technical Skills\", \"difficulty\": \"Easy|Medium|Hard\"}}]"
    )
}

/// Accepts a bare array or an object with a `questions` array.
fn parse_questions(raw: &str) -> Option<Vec<DraftQuestion>> {
    let value = extract_json(raw).ok()?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("questions") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    let drafted: Vec<DraftQuestion> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<DraftQuestion>(item).ok())
        .filter(|q| !q.question.trim().is_empty())
        .collect();

    (!drafted.is_empty()).then_some(drafted)
}

/// Generic questions built from the collected role.
pub fn fallback_questions(prefs: &Preferences) -> Vec<Question> {
    let role = prefs.role_or_default();
    [
        (format!("Tell me about yourself and your background in {}.", role), "General", "Easy"),
        (format!("What interests you most about working as a {}?", role), "Motivation", "Easy"),
        (
            "Describe a challenging project you've worked on and how you overcame obstacles.".to_string(),
            "Problem Solving",
            "Medium",
        ),
        (
            "Where do you see yourself in your career in the next 3-5 years?".to_string(),
            "Career Goals",
            "Medium",
        ),
        (
            format!("What do you think are the most important skills for a {}?", role),
            "Technical Knowledge",
            "Medium",
        ),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, (text, category, difficulty))| Question {
        id: i as u32 + 1,
        text,
        category: category.to_string(),
        difficulty: difficulty.to_string(),
    })
    .collect()
}

/// Exactly [`QUESTION_COUNT`] questions: drafted ones first, padded from the
/// fallback set, numbered from 1.
fn complete_question_set(drafted: Vec<DraftQuestion>, prefs: &Preferences) -> Vec<Question> {
    let mut questions: Vec<Question> = drafted
        .into_iter()
        .take(QUESTION_COUNT)
        .map(|d| Question {
            id: 0,
            text: d.question.trim().to_string(),
            category: d.category,
            difficulty: d.difficulty,
        })
        .collect();

    let missing = QUESTION_COUNT - questions.len();
    questions.extend(fallback_questions(prefs).into_iter().skip(QUESTION_COUNT - missing));

    for (i, q) in questions.iter_mut().enumerate() {
        q.id = i as u32 + 1;
    }
    questions
}

fn closing_summary(prefs: &Preferences) -> String {
    format!(
        "Congratulations! You've completed your mock interview for the {} position.\n\n\
         Strengths: you communicated clearly and drew on relevant experience.\n\
         Areas for improvement: structure each answer and back it with concrete, measurable examples.\n\
         Next steps: keep practicing different question types and prepare stories that show your impact as a {} candidate.\n\n\
         Thank you for practicing with EchoHire. Best of luck with your real interviews!",
        prefs.role_or_default(),
        prefs.experience_level.as_deref().unwrap_or("strong")
    )
}

// ============================================================================
// Unit Tests
// ============================================================================
