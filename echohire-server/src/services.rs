//! Service graph: one instance of each subsystem, sharing the store and providers.

use std::sync::Arc;

use echohire_core::{AnalysisProvider, CallProvider, DocumentStore, EchoHireConfig};

use crate::subsystems::dialogue::{DialogueEngine, MemorySessionStore, SessionStore};
use crate::subsystems::feedback::FeedbackSynthesizer;
use crate::subsystems::lifecycle::SessionLifecycle;
use crate::subsystems::reconcile::CallStatusReconciler;
use crate::subsystems::transcript::TranscriptAcquirer;
use crate::subsystems::webhook::WebhookIntake;

#[derive(Clone)]
pub struct Services {
    pub config: EchoHireConfig,
    pub store: Arc<dyn DocumentStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub dialogue: Arc<DialogueEngine>,
    pub lifecycle: Arc<SessionLifecycle>,
    pub transcripts: Arc<TranscriptAcquirer>,
    pub feedback: Arc<FeedbackSynthesizer>,
    pub reconciler: Arc<CallStatusReconciler>,
    pub webhook: Arc<WebhookIntake>,
}

impl Services {
    pub fn build(
        config: EchoHireConfig,
        store: Arc<dyn DocumentStore>,
        calls: Arc<dyn CallProvider>,
        analysis: Arc<dyn AnalysisProvider>,
        webhook_secret: Option<String>,
    ) -> Self {
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let dialogue = Arc::new(DialogueEngine::new(sessions.clone(), analysis.clone()));
        let lifecycle = Arc::new(SessionLifecycle::new(
            store.clone(),
            calls.clone(),
            config.call_provider.clone(),
        ));
        let transcripts = Arc::new(TranscriptAcquirer::new(
            store.clone(),
            calls.clone(),
            config.call_provider.transcript_timeout_seconds,
        ));
        let feedback = Arc::new(FeedbackSynthesizer::new(
            store.clone(),
            analysis,
            transcripts.clone(),
        ));
        let reconciler = Arc::new(CallStatusReconciler::new(
            store.clone(),
            calls,
            feedback.clone(),
            config.webhook.auto_generate_feedback,
        ));
        let webhook = Arc::new(WebhookIntake::new(
            store.clone(),
            reconciler.clone(),
            webhook_secret,
        ));

        tracing::info!(
            store = store.name(),
            auto_feedback = config.webhook.auto_generate_feedback,
            signed_webhooks = webhook.requires_signatures(),
            "Services ready"
        );

        Self {
            config,
            store,
            sessions,
            dialogue,
            lifecycle,
            transcripts,
            feedback,
            reconciler,
            webhook,
        }
    }
}
