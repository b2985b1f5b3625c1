//! Feedback artifacts and the canonical hiring recommendation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a feedback artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    /// Synthesized after reconciliation observed the call completing.
    AiAuto,
    /// Synthesized because a client asked for feedback.
    AiOnDemand,
    /// The analysis provider failed or returned unusable output; deterministic fallback.
    AiFallback,
    /// AI artifact written before source tags existed.
    LegacyAi,
    Manual,
}

impl FeedbackSource {
    pub fn is_ai(self) -> bool {
        !matches!(self, FeedbackSource::Manual)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackSource::AiAuto => "ai_auto",
            FeedbackSource::AiOnDemand => "ai_on_demand",
            FeedbackSource::AiFallback => "ai_fallback",
            FeedbackSource::LegacyAi => "legacy_ai",
            FeedbackSource::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "recommended")]
    Recommended,
    #[serde(rename = "notRecommended")]
    NotRecommended,
    #[serde(rename = "conditionallyRecommended")]
    ConditionallyRecommended,
}

impl Recommendation {
    /// Map a free-text hiring token to exactly one canonical value plus the
    /// narrative used when the provider supplied none.
    ///
    /// | token                  | value                      |
    /// |------------------------|----------------------------|
    /// | `hire`, `strong_hire`  | `recommended`              |
    /// | `conditional_hire`     | `conditionallyRecommended` |
    /// | `no_hire`, `reject`    | `notRecommended`           |
    /// | anything else          | `conditionallyRecommended` |
    pub fn from_token(token: Option<&str>) -> (Self, &'static str) {
        let normalized = token
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .replace(['-', ' '], "_");
        match normalized.as_str() {
            "hire" | "strong_hire" => (
                Recommendation::Recommended,
                "Strong Hire - Recommended for immediate offer",
            ),
            "conditional_hire" => (
                Recommendation::ConditionallyRecommended,
                "Conditional Hire - Recommend additional assessment",
            ),
            "no_hire" | "reject" => (
                Recommendation::NotRecommended,
                "No Hire - Does not meet current requirements",
            ),
            _ => (
                Recommendation::ConditionallyRecommended,
                "Review Recommended - Additional evaluation suggested",
            ),
        }
    }

    /// Narrative for a value chosen directly rather than mapped from a token.
    pub fn default_narrative(self) -> &'static str {
        match self {
            Recommendation::Recommended => "Strong Hire - Recommended for immediate offer",
            Recommendation::ConditionallyRecommended => {
                "Conditional Hire - Recommend additional assessment"
            }
            Recommendation::NotRecommended => "No Hire - Does not meet current requirements",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TechnicalAssessment {
    pub score: Option<u8>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub assessment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommunicationAssessment {
    pub score: Option<u8>,
    pub clarity: Option<u8>,
    pub articulation: Option<u8>,
    pub confidence: Option<u8>,
    pub examples: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProblemSolvingAssessment {
    pub score: Option<u8>,
    pub approach: String,
    pub creativity: Option<u8>,
    pub logical_thinking: Option<u8>,
    pub methodology: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoleSpecificAssessment {
    pub role_alignment: Option<u8>,
    pub experience_level: String,
    pub readiness: String,
    pub growth_potential: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InterviewQuality {
    pub response_depth: Option<u8>,
    pub question_handling: Option<u8>,
    pub engagement: Option<u8>,
}

/// Plain transcript statistics, computed locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpeechMetrics {
    pub total_words: usize,
    pub total_sentences: usize,
    pub avg_words_per_sentence: f64,
    /// Distinct words over total words, 0-100.
    pub vocabulary_richness: f64,
}

impl SpeechMetrics {
    pub fn from_transcript(text: &str) -> Self {
        let words: Vec<&str> = text.split_whitespace().collect();
        let total_words = words.len();
        let total_sentences = text
            .split(['.', '!', '?'])
            .filter(|s| !s.trim().is_empty())
            .count();
        let distinct: std::collections::HashSet<String> =
            words.iter().map(|w| w.to_lowercase()).collect();
        Self {
            total_words,
            total_sentences,
            avg_words_per_sentence: total_words as f64 / total_sentences.max(1) as f64,
            vocabulary_richness: (distinct.len() as f64 / total_words.max(1) as f64 * 100.0).min(100.0),
        }
    }
}

/// One feedback report for an interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackArtifact {
    pub id: String,
    pub interview_id: String,
    pub user_id: String,
    pub source: FeedbackSource,
    /// 1-100.
    pub overall_score: u8,
    /// 0.0-1.0.
    pub confidence: f64,
    pub overall_impression: String,
    pub recommendation: Recommendation,
    pub recommendation_text: String,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub recommended_areas: Vec<String>,
    #[serde(default)]
    pub next_steps: String,
    #[serde(default)]
    pub technical: TechnicalAssessment,
    #[serde(default)]
    pub communication: CommunicationAssessment,
    #[serde(default)]
    pub problem_solving: ProblemSolvingAssessment,
    #[serde(default)]
    pub role_specific: RoleSpecificAssessment,
    #[serde(default)]
    pub interview_quality: InterviewQuality,
    #[serde(default)]
    pub speech: SpeechMetrics,
    pub transcript_preview: Option<String>,
    #[serde(default)]
    pub superseded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedbackArtifact {
    pub fn counts_as_ai(&self) -> bool {
        self.source.is_ai() && !self.superseded
    }
}

/// Most recently created non-superseded AI artifact, if any.
pub fn latest_ai_artifact(artifacts: &[FeedbackArtifact]) -> Option<&FeedbackArtifact> {
    artifacts
        .iter()
        .filter(|a| a.counts_as_ai())
        .max_by_key(|a| a.created_at)
}

/// Input for a manually written feedback artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualFeedback {
    /// Any integer; clamped to 1-100 when the artifact is built.
    pub overall_score: i64,
    pub overall_impression: String,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub recommendation_text: Option<String>,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub next_steps: Option<String>,
}

impl ManualFeedback {
    pub fn clamped_score(&self) -> u8 {
        self.overall_score.clamp(1, 100) as u8
    }
}
