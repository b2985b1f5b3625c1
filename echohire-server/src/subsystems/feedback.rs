//! Feedback synthesis
//!
//! Produces at most one live AI feedback artifact per interview:
//! - the interview must be `completed` unless forced
//! - an existing AI artifact is returned unchanged, never regenerated
//! - without a transcript the result is `PendingTranscript` unless forced
//! - provider output is clamped and defaulted field by field; unusable output
//!   or a provider failure yields a complete fallback artifact tagged `ai_fallback`
//!
//! The existence check is backed by the store's conditional insert, so two
//! concurrent triggers cost at most one wasted provider call.

use std::sync::Arc;

use chrono::Utc;
use echohire_core::models::{
    latest_ai_artifact, CommunicationAssessment, FeedbackArtifact, FeedbackSource,
    InterviewQuality, InterviewRecord, InterviewStatus, ManualFeedback, ProblemSolvingAssessment,
    Recommendation, RoleSpecificAssessment, SpeechMetrics, TechnicalAssessment,
};
use echohire_core::providers::extract_json;
use echohire_core::{AnalysisProvider, DocumentStore, ServiceError};
use serde::Serialize;
use serde_json::Value;

use super::transcript::TranscriptAcquirer;

pub const TRANSCRIPT_PREVIEW_CHARS: usize = 5000;
const MISSING_TRANSCRIPT: &str = "Transcript not available.";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", content = "feedback", rename_all = "snake_case")]
pub enum SynthesisOutcome {
    /// An AI artifact already existed; it is returned unchanged.
    Existing(FeedbackArtifact),
    Created(FeedbackArtifact),
    /// No transcript yet. Not an error; retry later.
    PendingTranscript,
}

impl SynthesisOutcome {
    pub fn artifact(&self) -> Option<&FeedbackArtifact> {
        match self {
            SynthesisOutcome::Existing(a) | SynthesisOutcome::Created(a) => Some(a),
            SynthesisOutcome::PendingTranscript => None,
        }
    }
}

pub struct FeedbackSynthesizer {
    store: Arc<dyn DocumentStore>,
    analysis: Arc<dyn AnalysisProvider>,
    acquirer: Arc<TranscriptAcquirer>,
}

impl FeedbackSynthesizer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        analysis: Arc<dyn AnalysisProvider>,
        acquirer: Arc<TranscriptAcquirer>,
    ) -> Self {
        Self {
            store,
            analysis,
            acquirer,
        }
    }

    pub fn transcripts(&self) -> &Arc<TranscriptAcquirer> {
        &self.acquirer
    }

    /// `trigger` is the source tag used when the provider answers usefully.
    pub async fn synthesize(
        &self,
        interview_id: &str,
        force: bool,
        trigger: FeedbackSource,
    ) -> Result<SynthesisOutcome, ServiceError> {
        let record = self
            .store
            .get_interview(interview_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("interview {}", interview_id)))?;

        if record.status != InterviewStatus::Completed && !force {
            return Err(ServiceError::PreconditionFailed(format!(
                "interview is {}, feedback needs a completed interview",
                record.status
            )));
        }

        let existing = self.store.list_feedback(interview_id).await?;
        if let Some(artifact) = latest_ai_artifact(&existing) {
            tracing::debug!(interview_id = %interview_id, "AI feedback already exists");
            return Ok(SynthesisOutcome::Existing(artifact.clone()));
        }

        let transcript = match self.acquirer.acquire(&record).await? {
            Some(t) => Some(t.document.text),
            None if force => None,
            None => {
                tracing::info!(interview_id = %interview_id, "Feedback waiting for transcript");
                return Ok(SynthesisOutcome::PendingTranscript);
            }
        };

        let artifact = self.analyze(&record, transcript.as_deref(), trigger).await;

        let (artifact, inserted) = self.store.insert_ai_feedback_if_absent(artifact).await?;
        if !inserted {
            tracing::info!(interview_id = %interview_id, "Concurrent synthesis won; returning its artifact");
            return Ok(SynthesisOutcome::Existing(artifact));
        }

        self.apply_summary(interview_id, artifact.overall_score).await?;
        tracing::info!(
            interview_id = %interview_id,
            source = artifact.source.as_str(),
            score = artifact.overall_score,
            "Feedback artifact created"
        );
        Ok(SynthesisOutcome::Created(artifact))
    }

    /// Store a manually written artifact. It never blocks AI synthesis.
    pub async fn submit_manual(
        &self,
        record: &InterviewRecord,
        input: ManualFeedback,
    ) -> Result<FeedbackArtifact, ServiceError> {
        let now = Utc::now();
        let artifact = FeedbackArtifact {
            id: uuid::Uuid::new_v4().to_string(),
            interview_id: record.id.clone(),
            user_id: record.owner_id.clone(),
            source: FeedbackSource::Manual,
            overall_score: input.clamped_score(),
            confidence: 1.0,
            overall_impression: input.overall_impression,
            recommendation: input.recommendation,
            recommendation_text: input
                .recommendation_text
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| input.recommendation.default_narrative().to_string()),
            key_insights: input.key_insights,
            recommended_areas: Vec::new(),
            next_steps: input.next_steps.unwrap_or_default(),
            technical: TechnicalAssessment::default(),
            communication: CommunicationAssessment::default(),
            problem_solving: ProblemSolvingAssessment::default(),
            role_specific: RoleSpecificAssessment::default(),
            interview_quality: InterviewQuality::default(),
            speech: SpeechMetrics::default(),
            transcript_preview: None,
            superseded: false,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_feedback(&artifact).await?;
        self.apply_summary(&record.id, artifact.overall_score).await?;
        tracing::info!(interview_id = %record.id, "Manual feedback stored");
        Ok(artifact)
    }

    /// Most recent artifact of any source.
    pub async fn latest(&self, interview_id: &str) -> Result<Option<FeedbackArtifact>, ServiceError> {
        Ok(self
            .store
            .list_feedback(interview_id)
            .await?
            .into_iter()
            .max_by_key(|a| a.created_at))
    }

    async fn apply_summary(&self, interview_id: &str, score: u8) -> Result<(), ServiceError> {
        self.store
            .modify_interview(interview_id, &mut |r: &mut InterviewRecord| {
                r.overall_score = Some(score);
                r.feedback_generated = true;
                r.touch();
                true
            })
            .await?;
        Ok(())
    }

    async fn analyze(
        &self,
        record: &InterviewRecord,
        transcript: Option<&str>,
        trigger: FeedbackSource,
    ) -> FeedbackArtifact {
        let prompt = analysis_prompt(record, transcript.unwrap_or(MISSING_TRANSCRIPT));

        let parsed = match self.analysis.complete(&prompt).await {
            Ok(raw) => match extract_json(&raw) {
                Ok(Value::Object(map)) => Some(Value::Object(map)),
                Ok(_) | Err(_) => {
                    tracing::warn!(interview_id = %record.id, "Analysis output unusable; using fallback feedback");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(interview_id = %record.id, error = %e, "Analysis failed; using fallback feedback");
                None
            }
        };

        let mut artifact = match parsed {
            Some(body) => normalize(record, &body, trigger),
            None => fallback_artifact(record),
        };

        if let Some(text) = transcript {
            artifact.speech = SpeechMetrics::from_transcript(text);
            artifact.transcript_preview = Some(text.chars().take(TRANSCRIPT_PREVIEW_CHARS).collect());
        }
        artifact
    }
}

// ============================================================================
// Prompt and normalization
// ============================================================================

fn analysis_prompt(record: &InterviewRecord, transcript: &str) -> String {
    let role = &record.job_title;
    let kind = record.interview_type.as_deref().unwrap_or("technical");
    let level = record.experience_level.as_deref().unwrap_or("mid");
    let company = record.company.as_deref().unwrap_or("Technology Company");
    format!(
        "You are an expert interviewer analyzing a {kind} interview for a {level} level {role} position at {company}.\n\n\
         INTERVIEW TRANSCRIPT:\n{transcript}\n\n\
         Focus on the candidate's responses. Respond with a single JSON object:\n\
         {{\n\
           \"overallScore\": <integer 1-100>,\n\
           \"overallImpression\": \"<2-3 sentence summary>\",\n\
           \"technicalCompetency\": {{\"score\": <1-100>, \"strengths\": [], \"weaknesses\": [], \"assessment\": \"\"}},\n\
           \"communicationSkills\": {{\"score\": <1-100>, \"clarity\": <1-100>, \"articulation\": <1-100>, \"confidence\": <1-100>, \"examples\": \"\"}},\n\
           \"problemSolving\": {{\"score\": <1-100>, \"approach\": \"\", \"creativity\": <1-100>, \"logicalThinking\": <1-100>, \"methodology\": \"\"}},\n\
           \"keyInsights\": [\"...\"],\n\
           \"recommendedAreas\": [\"...\"],\n\
           \"roleSpecificAssessment\": {{\"roleAlignment\": <1-100>, \"experienceLevel\": \"junior|mid|senior|lead\", \"readiness\": \"\", \"growthPotential\": \"\"}},\n\
           \"hiringRecommendation\": \"hire|conditional_hire|no_hire\",\n\
           \"confidenceLevel\": <float 0.0-1.0>,\n\
           \"nextSteps\": \"\",\n\
           \"interviewQuality\": {{\"responseDepth\": <1-100>, \"questionHandling\": <1-100>, \"engagement\": <1-100>}}\n\
         }}\n\n\
         Scoring: 90-100 exceptional, 80-89 strong, 70-79 meets expectations, 60-69 below, under 60 does not meet requirements."
    )
}

/// Clamp a number (or numeric string) into 1..=100.
fn score(v: Option<&Value>) -> Option<u8> {
    let n = match v? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then(|| n.round().clamp(1.0, 100.0) as u8)
}

fn confidence(v: Option<&Value>) -> Option<f64> {
    let n = match v? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then(|| n.clamp(0.0, 1.0))
}

fn text(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn list(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| text(Some(i)))
                .collect()
        })
        .unwrap_or_default()
}

fn section<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| body.get(*k))
        .find(|v| v.is_object())
}

fn normalize(record: &InterviewRecord, body: &Value, source: FeedbackSource) -> FeedbackArtifact {
    let now = Utc::now();
    let token = text(body.get("hiringRecommendation")).or_else(|| text(body.get("recommendation")));
    let (recommendation, narrative) = Recommendation::from_token(token.as_deref());

    let tech = section(body, &["technicalCompetency", "technical"]);
    let comm = section(body, &["communicationSkills", "communication"]);
    let prob = section(body, &["problemSolving"]);
    let role = section(body, &["roleSpecificAssessment", "roleSpecific"]);
    let quality = section(body, &["interviewQuality"]);
    let field = |s: Option<&'_ Value>, k: &str| s.and_then(|v| v.get(k)).cloned();

    FeedbackArtifact {
        id: uuid::Uuid::new_v4().to_string(),
        interview_id: record.id.clone(),
        user_id: record.owner_id.clone(),
        source,
        overall_score: score(body.get("overallScore")).unwrap_or(75),
        confidence: confidence(body.get("confidenceLevel").or_else(|| body.get("confidence")))
            .unwrap_or(0.8),
        overall_impression: text(body.get("overallImpression"))
            .unwrap_or_else(|| "Analysis completed".to_string()),
        recommendation,
        recommendation_text: narrative.to_string(),
        key_insights: list(body.get("keyInsights")),
        recommended_areas: list(body.get("recommendedAreas")),
        next_steps: text(body.get("nextSteps"))
            .unwrap_or_else(|| "Further evaluation recommended".to_string()),
        technical: TechnicalAssessment {
            score: score(field(tech, "score").as_ref()),
            strengths: list(field(tech, "strengths").as_ref()),
            weaknesses: list(field(tech, "weaknesses").as_ref()),
            assessment: text(field(tech, "assessment").as_ref()).unwrap_or_default(),
        },
        communication: CommunicationAssessment {
            score: score(field(comm, "score").as_ref()),
            clarity: score(field(comm, "clarity").as_ref()),
            articulation: score(field(comm, "articulation").as_ref()),
            confidence: score(field(comm, "confidence").as_ref()),
            examples: text(field(comm, "examples").as_ref()).unwrap_or_default(),
        },
        problem_solving: ProblemSolvingAssessment {
            score: score(field(prob, "score").as_ref()),
            approach: text(field(prob, "approach").as_ref()).unwrap_or_default(),
            creativity: score(field(prob, "creativity").as_ref()),
            logical_thinking: score(field(prob, "logicalThinking").as_ref()),
            methodology: text(field(prob, "methodology").as_ref()).unwrap_or_default(),
        },
        role_specific: RoleSpecificAssessment {
            role_alignment: score(field(role, "roleAlignment").as_ref()),
            experience_level: text(field(role, "experienceLevel").as_ref()).unwrap_or_default(),
            readiness: text(field(role, "readiness").as_ref()).unwrap_or_default(),
            growth_potential: text(field(role, "growthPotential").as_ref()).unwrap_or_default(),
        },
        interview_quality: InterviewQuality {
            response_depth: score(field(quality, "responseDepth").as_ref()),
            question_handling: score(field(quality, "questionHandling").as_ref()),
            engagement: score(field(quality, "engagement").as_ref()),
        },
        speech: SpeechMetrics::default(),
        transcript_preview: None,
        superseded: false,
        created_at: now,
        updated_at: now,
    }
}

/// Complete, fixed artifact used when the analysis provider cannot help.
pub fn fallback_artifact(record: &InterviewRecord) -> FeedbackArtifact {
    let now = Utc::now();
    let kind = record.interview_type.as_deref().unwrap_or("technical");
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    FeedbackArtifact {
        id: uuid::Uuid::new_v4().to_string(),
        interview_id: record.id.clone(),
        user_id: record.owner_id.clone(),
        source: FeedbackSource::AiFallback,
        overall_score: 70,
        confidence: 0.5,
        overall_impression: format!(
            "Interview completed - manual review recommended for {} {} interview",
            record.job_title, kind
        ),
        recommendation: Recommendation::ConditionallyRecommended,
        recommendation_text: "Manual review required - AI analysis unavailable".to_string(),
        key_insights: strings(&[
            "Technical interview conducted",
            "Response quality evaluated",
            "Communication assessed",
        ]),
        recommended_areas: strings(&[
            "Review candidate's technical depth manually",
            "Assess communication nuances via transcript",
        ]),
        next_steps: "Conduct manual review or rerun AI analysis when available".to_string(),
        technical: TechnicalAssessment {
            score: Some(68),
            strengths: strings(&["Baseline technical competency observed"]),
            weaknesses: strings(&["Detailed AI insights unavailable"]),
            assessment: "Automated analysis unavailable. Please review candidate responses manually."
                .to_string(),
        },
        communication: CommunicationAssessment {
            score: Some(70),
            clarity: Some(70),
            articulation: Some(68),
            confidence: Some(65),
            examples: "Communication metrics unavailable due to AI fallback.".to_string(),
        },
        problem_solving: ProblemSolvingAssessment {
            score: Some(69),
            approach: "Problem-solving indicators require manual verification.".to_string(),
            creativity: Some(65),
            logical_thinking: Some(68),
            methodology: "Review transcript to assess structured thinking and methodology."
                .to_string(),
        },
        role_specific: RoleSpecificAssessment {
            role_alignment: Some(70),
            experience_level: "mid".to_string(),
            readiness: "Manual evaluation required to confirm readiness.".to_string(),
            growth_potential: "Manual evaluation required to gauge growth potential.".to_string(),
        },
        interview_quality: InterviewQuality {
            response_depth: Some(68),
            question_handling: Some(70),
            engagement: Some(72),
        },
        speech: SpeechMetrics::default(),
        transcript_preview: None,
        superseded: false,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
