//! Clients for the two external providers.
//!
//! - **Analysis**: single-shot generative text completion (Gemini)
//! - **Call**: voice-call placement, status, transcript and cancellation (Vapi)
//!
//! Every provider call returns `Result<_, ProviderError>`; callers pick their
//! fallback by matching on [`ProviderError::kind`].

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub mod analysis;
pub mod call;

pub use analysis::{
    create_analysis_provider, AnalysisProvider, DisabledAnalysisProvider, GeminiAnalysisClient,
};
pub use call::{
    create_call_provider, CallHandle, CallProvider, CallRequest, CallStatusReport, CallTarget,
    DisabledCallProvider, StopVariant, TranscriptPayload, VapiCallClient,
};

/// Broad class of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Network error, timeout, non-success status, or missing credentials.
    Unavailable,
    /// The provider answered but the payload could not be used.
    Malformed,
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("{0} provider is not configured")]
    NotConfigured(&'static str),

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },

    #[error("Not found")]
    NotFound,
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Malformed(_) => ProviderErrorKind::Malformed,
            ProviderError::Http(e) if e.is_decode() => ProviderErrorKind::Malformed,
            _ => ProviderErrorKind::Unavailable,
        }
    }
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").ok())
        .as_ref()
}

/// Pull a JSON value out of model output.
///
/// Accepts bare JSON, JSON inside a Markdown code fence, or JSON surrounded by
/// prose.
pub fn extract_json(raw: &str) -> Result<serde_json::Value, ProviderError> {
    let trimmed = raw.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }

    if let Some(inner) = fence_regex()
        .and_then(|re| re.captures(trimmed))
        .and_then(|c| c.get(1))
    {
        if let Ok(v) = serde_json::from_str(inner.as_str()) {
            return Ok(v);
        }
    }

    // Outermost span first: whichever bracket opens earliest.
    let mut spans: Vec<(usize, usize)> = [('{', '}'), ('[', ']')]
        .iter()
        .filter_map(|&(open, close)| Some((trimmed.find(open)?, trimmed.rfind(close)?)))
        .filter(|(start, end)| start < end)
        .collect();
    spans.sort_by_key(|(start, _)| *start);
    for (start, end) in spans {
        if let Ok(v) = serde_json::from_str(&trimmed[start..=end]) {
            return Ok(v);
        }
    }

    Err(ProviderError::Malformed(format!(
        "no JSON found in {} chars of model output",
        trimmed.len()
    )))
}
