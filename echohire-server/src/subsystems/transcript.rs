//! Transcript acquisition
//!
//! Ordered fallback, first success wins:
//! 1. stored transcript for the interview
//! 2. direct fetch of the recorded transcript URL (non-2xx or timeout = no result)
//! 3. the call provider's transcript endpoint
//!
//! A fetched transcript is stored with a create-if-absent write; a caller
//! that loses the race gets the stored copy back instead of its own.

use std::sync::Arc;
use std::time::Duration;

use echohire_core::models::{InterviewRecord, TranscriptDocument, TranscriptSource};
use echohire_core::providers::TranscriptPayload;
use echohire_core::{CallProvider, DocumentStore, StoreError};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquiredTranscript {
    pub document: TranscriptDocument,
    /// Where this caller obtained it; `Cache` when another writer stored it first.
    pub served_from: TranscriptSource,
}

pub struct TranscriptAcquirer {
    store: Arc<dyn DocumentStore>,
    calls: Arc<dyn CallProvider>,
    http: reqwest::Client,
    url_timeout: Duration,
}

impl TranscriptAcquirer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        calls: Arc<dyn CallProvider>,
        url_timeout_secs: u64,
    ) -> Self {
        Self {
            store,
            calls,
            http: reqwest::Client::new(),
            url_timeout: Duration::from_secs(url_timeout_secs),
        }
    }

    /// Resolve the transcript for `record`. `Ok(None)` means unavailable.
    pub async fn acquire(
        &self,
        record: &InterviewRecord,
    ) -> Result<Option<AcquiredTranscript>, StoreError> {
        if let Some(cached) = self.store.get_transcript(&record.id).await? {
            if !cached.is_empty() {
                tracing::debug!(interview_id = %record.id, "Transcript served from cache");
                return Ok(Some(AcquiredTranscript {
                    document: cached,
                    served_from: TranscriptSource::Cache,
                }));
            }
        }

        let fetched = match self.fetch_url(record).await {
            Some(text) => Some((text, TranscriptSource::UrlFetch)),
            None => self
                .fetch_from_provider(record)
                .await
                .map(|text| (text, TranscriptSource::ProviderApi)),
        };

        let Some((text, source)) = fetched else {
            tracing::info!(interview_id = %record.id, "Transcript unavailable");
            return Ok(None);
        };

        let (document, won) = self
            .store
            .create_transcript_if_absent(TranscriptDocument::new(&record.id, text, source))
            .await?;

        if won {
            tracing::info!(interview_id = %record.id, source = ?source, "Transcript stored");
        } else {
            tracing::debug!(interview_id = %record.id, "Lost transcript race; using stored copy");
        }

        Ok(Some(AcquiredTranscript {
            document,
            served_from: if won { source } else { TranscriptSource::Cache },
        }))
    }

    async fn fetch_url(&self, record: &InterviewRecord) -> Option<String> {
        let url = record.call.transcript_url.as_deref()?;

        let response = match self.http.get(url).timeout(self.url_timeout).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(interview_id = %record.id, error = %e, "Transcript URL fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                interview_id = %record.id,
                status = response.status().as_u16(),
                "Transcript URL returned non-success"
            );
            return None;
        }

        let body = response.text().await.ok()?;
        TranscriptPayload::from_body(body)
            .ok()
            .map(|p| p.render())
            .filter(|t| !t.is_empty())
    }

    async fn fetch_from_provider(&self, record: &InterviewRecord) -> Option<String> {
        let call_id = record.call.call_id.as_deref()?;
        match self.calls.get_transcript(call_id).await {
            Ok(payload) => Some(payload.render()).filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(
                    interview_id = %record.id,
                    call_id = %call_id,
                    error = %e,
                    "Provider transcript unavailable"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{interview, store_with, FakeCallProvider};
    use echohire_core::models::InterviewStatus;
    use std::sync::atomic::Ordering;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completed(url: Option<String>) -> InterviewRecord {
        let mut r = interview("i-1", InterviewStatus::Completed, Some("call-1"));
        r.call.transcript_url = url;
        r
    }

    // ========================================================================
    // TEST 1: a cached copy wins and no network call is made
    // ========================================================================
    #[tokio::test]
    async fn test_cache_first_no_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("url copy"))
            .expect(0)
            .mount(&server)
            .await;

        let record = completed(Some(format!("{}/t.txt", server.uri())));
        let store = store_with(&[record.clone()]).await;
        store
            .create_transcript_if_absent(TranscriptDocument::new("i-1", "cached copy", TranscriptSource::ProviderApi))
            .await
            .unwrap();
        let calls = Arc::new(FakeCallProvider::with_transcript("provider copy"));

        let acquirer = TranscriptAcquirer::new(store, calls.clone(), 5);
        let got = acquirer.acquire(&record).await.unwrap().unwrap();

        assert_eq!(got.document.text, "cached copy");
        assert_eq!(got.served_from, TranscriptSource::Cache);
        assert_eq!(calls.transcript_calls.load(Ordering::SeqCst), 0);
    }

    // ========================================================================
    // TEST 2: URL fetch is preferred over the provider and stored
    // ========================================================================
    #[tokio::test]
    async fn test_url_fetch_before_provider() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/t.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{ "role": "user", "message": "hi" }]
            })))
            .mount(&server)
            .await;

        let record = completed(Some(format!("{}/t.json", server.uri())));
        let store = store_with(&[record.clone()]).await;
        let calls = Arc::new(FakeCallProvider::with_transcript("provider copy"));

        let acquirer = TranscriptAcquirer::new(store.clone(), calls.clone(), 5);
        let got = acquirer.acquire(&record).await.unwrap().unwrap();

        assert_eq!(got.document.text, "user: hi");
        assert_eq!(got.served_from, TranscriptSource::UrlFetch);
        assert_eq!(calls.transcript_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.get_transcript("i-1").await.unwrap().unwrap().text, "user: hi");
    }

    // ========================================================================
    // TEST 3: a failing URL falls through to the provider
    // ========================================================================
    #[tokio::test]
    async fn test_url_failure_falls_back_to_provider() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let record = completed(Some(format!("{}/t.txt", server.uri())));
        let store = store_with(&[record.clone()]).await;
        let calls = Arc::new(FakeCallProvider::with_transcript("assistant: hello"));

        let acquirer = TranscriptAcquirer::new(store, calls, 5);
        let got = acquirer.acquire(&record).await.unwrap().unwrap();
        assert_eq!(got.document.text, "assistant: hello");
        assert_eq!(got.served_from, TranscriptSource::ProviderApi);
    }

    #[tokio::test]
    async fn test_url_timeout_falls_back_to_provider() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let record = completed(Some(format!("{}/slow", server.uri())));
        let store = store_with(&[record.clone()]).await;
        let calls = Arc::new(FakeCallProvider::with_transcript("user: fallback"));

        let mut acquirer = TranscriptAcquirer::new(store, calls, 5);
        acquirer.url_timeout = Duration::from_millis(200);
        let got = acquirer.acquire(&record).await.unwrap().unwrap();
        assert_eq!(got.served_from, TranscriptSource::ProviderApi);
    }

    // ========================================================================
    // TEST 4: nothing available is reported, not invented
    // ========================================================================
    #[tokio::test]
    async fn test_unavailable_returns_none() {
        let record = completed(None);
        let store = store_with(&[record.clone()]).await;
        let acquirer = TranscriptAcquirer::new(store.clone(), Arc::new(FakeCallProvider::default()), 5);

        assert!(acquirer.acquire(&record).await.unwrap().is_none());
        assert!(store.get_transcript("i-1").await.unwrap().is_none());
    }

    // ========================================================================
    // TEST 5: concurrent acquisitions store exactly one document
    // ========================================================================
    #[tokio::test]
    async fn test_concurrent_acquire_single_document() {
        let record = completed(None);
        let store = store_with(&[record.clone()]).await;
        let acquirer = Arc::new(TranscriptAcquirer::new(
            store.clone(),
            Arc::new(FakeCallProvider::with_transcript("user: same call")),
            5,
        ));

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let acquirer = acquirer.clone();
                let record = record.clone();
                tokio::spawn(async move { acquirer.acquire(&record).await.unwrap().unwrap() })
            })
            .collect();
        let results: Vec<AcquiredTranscript> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let stored = store.get_transcript("i-1").await.unwrap().unwrap();
        assert!(results.iter().all(|r| r.document == stored));
    }
}
