use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a transcript was obtained from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    Cache,
    UrlFetch,
    ProviderApi,
}

/// The single authoritative transcript of an interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptDocument {
    pub interview_id: String,
    pub text: String,
    pub source: TranscriptSource,
    pub created_at: DateTime<Utc>,
}

impl TranscriptDocument {
    pub fn new(interview_id: impl Into<String>, text: impl Into<String>, source: TranscriptSource) -> Self {
        Self {
            interview_id: interview_id.into(),
            text: text.into(),
            source,
            created_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// One speaker turn as some providers return transcripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    #[serde(default = "unknown_role")]
    pub role: String,
    #[serde(default)]
    pub message: String,
}

fn unknown_role() -> String {
    "unknown".to_string()
}

/// Render turns as `role: message` lines.
pub fn render_turns(turns: &[TranscriptTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_turns_as_role_lines() {
        let turns: Vec<TranscriptTurn> = serde_json::from_value(serde_json::json!([
            {"role": "assistant", "message": "Tell me about yourself."},
            {"role": "user", "message": "I build backends."},
            {"message": "orphan"}
        ]))
        .unwrap();
        assert_eq!(
            render_turns(&turns),
            "assistant: Tell me about yourself.\nuser: I build backends.\nunknown: orphan"
        );
    }

    #[test]
    fn test_whitespace_transcript_counts_as_empty() {
        let doc = TranscriptDocument::new("i-1", "  \n ", TranscriptSource::ProviderApi);
        assert!(doc.is_empty());
    }
}
