use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{DocumentStore, InterviewMutation};
use crate::error::StoreError;
use crate::models::{latest_ai_artifact, FeedbackArtifact, InterviewRecord, TranscriptDocument};

/// Process-local store. Each map shard lock gives single-document atomicity.
#[derive(Debug, Default)]
pub struct MemoryStore {
    interviews: DashMap<String, InterviewRecord>,
    transcripts: DashMap<String, TranscriptDocument>,
    /// Keyed by interview id.
    feedback: DashMap<String, Vec<FeedbackArtifact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put_interview(&self, record: &InterviewRecord) -> Result<(), StoreError> {
        self.interviews.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_interview(&self, id: &str) -> Result<Option<InterviewRecord>, StoreError> {
        Ok(self.interviews.get(id).map(|r| r.value().clone()))
    }

    async fn modify_interview(
        &self,
        id: &str,
        mutate: InterviewMutation<'_>,
    ) -> Result<Option<InterviewRecord>, StoreError> {
        let Some(mut entry) = self.interviews.get_mut(id) else {
            return Ok(None);
        };
        let mut working = entry.value().clone();
        if mutate(&mut working) {
            *entry.value_mut() = working.clone();
        }
        Ok(Some(entry.value().clone()))
    }

    async fn find_interview_by_call_id(
        &self,
        call_id: &str,
    ) -> Result<Option<InterviewRecord>, StoreError> {
        Ok(self
            .interviews
            .iter()
            .find(|r| r.call.call_id.as_deref() == Some(call_id))
            .map(|r| r.value().clone()))
    }

    async fn list_interviews(&self, owner_id: &str) -> Result<Vec<InterviewRecord>, StoreError> {
        Ok(self
            .interviews
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn get_transcript(
        &self,
        interview_id: &str,
    ) -> Result<Option<TranscriptDocument>, StoreError> {
        Ok(self.transcripts.get(interview_id).map(|t| t.value().clone()))
    }

    async fn create_transcript_if_absent(
        &self,
        doc: TranscriptDocument,
    ) -> Result<(TranscriptDocument, bool), StoreError> {
        match self.transcripts.entry(doc.interview_id.clone()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_empty() {
                    existing.insert(doc.clone());
                    Ok((doc, true))
                } else {
                    Ok((existing.get().clone(), false))
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(doc.clone());
                Ok((doc, true))
            }
        }
    }

    async fn list_feedback(&self, interview_id: &str) -> Result<Vec<FeedbackArtifact>, StoreError> {
        Ok(self
            .feedback
            .get(interview_id)
            .map(|f| f.value().clone())
            .unwrap_or_default())
    }

    async fn insert_feedback(&self, artifact: &FeedbackArtifact) -> Result<(), StoreError> {
        self.feedback
            .entry(artifact.interview_id.clone())
            .or_default()
            .push(artifact.clone());
        Ok(())
    }

    async fn insert_ai_feedback_if_absent(
        &self,
        artifact: FeedbackArtifact,
    ) -> Result<(FeedbackArtifact, bool), StoreError> {
        let mut artifacts = self
            .feedback
            .entry(artifact.interview_id.clone())
            .or_default();
        if let Some(existing) = latest_ai_artifact(artifacts.value()) {
            return Ok((existing.clone(), false));
        }
        artifacts.value_mut().push(artifact.clone());
        Ok((artifact, true))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
