pub mod dialogue;
pub mod feedback;
pub mod interview;
pub mod transcript;

pub use dialogue::{DialoguePhase, DialogueSession, DialogueSummary, Preferences, Question, TurnReply};
pub use feedback::{
    latest_ai_artifact, CommunicationAssessment, FeedbackArtifact, FeedbackSource,
    InterviewQuality, ManualFeedback, ProblemSolvingAssessment, Recommendation,
    RoleSpecificAssessment, SpeechMetrics, TechnicalAssessment,
};
pub use interview::{CallRecord, InterviewRecord, InterviewStatus, NewInterview};
pub use transcript::{render_turns, TranscriptDocument, TranscriptSource, TranscriptTurn};
