//! Document store abstraction.
//!
//! The store offers single-document atomicity only: one interview, one
//! transcript, or one feedback artifact at a time, never a transaction across
//! documents. Correctness under concurrent writers is built from three
//! primitives on top of that:
//! - `modify_interview`: atomic read-modify-write of one interview
//! - `create_transcript_if_absent`: first writer wins, losers get the winner back
//! - `insert_ai_feedback_if_absent`: conditional create of the single AI artifact

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{FeedbackArtifact, InterviewRecord, TranscriptDocument};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Mutation applied by [`DocumentStore::modify_interview`]. Returns whether it
/// changed the record; unchanged records are not written back.
pub type InterviewMutation<'a> = &'a mut (dyn FnMut(&mut InterviewRecord) -> bool + Send);

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put_interview(&self, record: &InterviewRecord) -> Result<(), StoreError>;

    async fn get_interview(&self, id: &str) -> Result<Option<InterviewRecord>, StoreError>;

    /// Atomically apply `mutate` to the stored interview. Returns the record as
    /// stored after the mutation, or `None` when the interview does not exist.
    async fn modify_interview(
        &self,
        id: &str,
        mutate: InterviewMutation<'_>,
    ) -> Result<Option<InterviewRecord>, StoreError>;

    async fn find_interview_by_call_id(
        &self,
        call_id: &str,
    ) -> Result<Option<InterviewRecord>, StoreError>;

    /// Every interview owned by `owner_id`, in no particular order.
    async fn list_interviews(&self, owner_id: &str) -> Result<Vec<InterviewRecord>, StoreError>;

    async fn get_transcript(
        &self,
        interview_id: &str,
    ) -> Result<Option<TranscriptDocument>, StoreError>;

    /// Store `doc` unless a non-empty transcript already exists for the
    /// interview. Returns the authoritative document and whether `doc` won.
    async fn create_transcript_if_absent(
        &self,
        doc: TranscriptDocument,
    ) -> Result<(TranscriptDocument, bool), StoreError>;

    async fn list_feedback(&self, interview_id: &str) -> Result<Vec<FeedbackArtifact>, StoreError>;

    async fn insert_feedback(&self, artifact: &FeedbackArtifact) -> Result<(), StoreError>;

    /// Insert an AI artifact unless a non-superseded AI artifact already exists
    /// for the interview. Returns the authoritative artifact and whether
    /// `artifact` was inserted.
    async fn insert_ai_feedback_if_absent(
        &self,
        artifact: FeedbackArtifact,
    ) -> Result<(FeedbackArtifact, bool), StoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}
