use thiserror::Error;

use crate::scorer::ScorerType;

/// Errors surfaced by explanation generation and scoring.
///
/// Only [`AutointerpError::MalformedResponse`] is ever recovered inside the crate (the recall
/// scorer downgrades it to a negative judgment). Everything else propagates to the caller.
#[derive(Debug, Error)]
pub enum AutointerpError {
    /// No usable key for the backend selected by the model and routing.
    #[error("no API key available for {backend}")]
    Credential { backend: String },

    #[error("unsupported combination: {detail}")]
    UnsupportedCombination { detail: String },

    /// Network failure or non-2xx status from a vendor or scoring service.
    ///
    /// The provider body is logged at debug level and never included here.
    #[error("{provider} request failed{}", status_suffix(.status))]
    Provider {
        provider: String,
        status: Option<u16>,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("malformed judge response: {detail}")]
    MalformedResponse { detail: String },

    #[error("model returned an empty explanation")]
    EmptyExplanation,

    /// Max-logit post-processing found method-numbering scaffolding in the final text.
    #[error("explanation leaked prompt scaffolding (`{marker}`)")]
    ScaffoldLeak { marker: String },

    #[error("explanation already has a `{scorer_type}` score from model `{scorer_model}`")]
    DuplicateScore {
        scorer_type: ScorerType,
        scorer_model: String,
    },

    #[error("invalid activation sample: {detail}")]
    InvalidSample { detail: String },
}

impl AutointerpError {
    pub(crate) fn credential(backend: impl Into<String>) -> Self {
        Self::Credential {
            backend: backend.into(),
        }
    }

    pub(crate) fn unsupported(detail: impl Into<String>) -> Self {
        Self::UnsupportedCombination {
            detail: detail.into(),
        }
    }

    pub(crate) fn transport(provider: &str, source: reqwest::Error) -> Self {
        Self::Provider {
            provider: provider.to_string(),
            status: source.status().map(|s| s.as_u16()),
            source: Some(source),
        }
    }

    pub(crate) fn status(provider: &str, status: reqwest::StatusCode) -> Self {
        Self::Provider {
            provider: provider.to_string(),
            status: Some(status.as_u16()),
            source: None,
        }
    }

    /// True for failures that happened before any response content was received.
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" with status {code}"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, AutointerpError>;
