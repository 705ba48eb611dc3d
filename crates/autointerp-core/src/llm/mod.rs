mod anthropic;
mod catalog;
mod credentials;
mod gemini;
mod openai;
mod openrouter;
mod settings;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AutointerpError, Result};
use crate::prompt::Turn;
use crate::sample::ExplanationStrategy;

pub use anthropic::AnthropicBackend;
pub use catalog::{ModelCapabilities, ModelCatalog, Route, Vendor};
pub use credentials::{Credential, Credentials, KeyKind};
pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use openrouter::OpenRouterBackend;
pub use settings::ClientSettings;

/// The wire protocol a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
    OpenRouter,
}

impl Provider {
    pub fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Gemini => "Gemini",
            Self::OpenRouter => "OpenRouter",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sampling options for one completion. `None` leaves the vendor default in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// Ask the vendor to constrain output to a JSON object.
    pub json_response: bool,
}

impl CompletionParams {
    /// Explanation sampling per strategy and wire protocol.
    ///
    /// Chat-completions vendors get a large budget so reasoning models have room to think;
    /// Anthropic gets short caps since its answers come back without a reasoning preamble.
    pub fn explanation(strategy: ExplanationStrategy, provider: Provider) -> Self {
        let max_tokens = match (provider, strategy) {
            (Provider::Gemini, _) => None,
            (Provider::Anthropic, ExplanationStrategy::MaxLogit) => Some(240),
            (Provider::Anthropic, _) => Some(60),
            (_, ExplanationStrategy::AttentionPair) => Some(80),
            _ => Some(4096),
        };
        let chat_completions = matches!(provider, Provider::OpenAi | Provider::OpenRouter);
        Self {
            max_tokens,
            temperature: (provider != Provider::Gemini).then_some(1.0),
            top_p: (chat_completions && strategy != ExplanationStrategy::AttentionPair)
                .then_some(1.0),
            json_response: false,
        }
    }

    /// Deterministic JSON-object output for the recall judge.
    pub fn judge() -> Self {
        Self {
            max_tokens: Some(5000),
            temperature: Some(0.0),
            top_p: None,
            json_response: true,
        }
    }
}

/// A model as named by the caller: the canonical name plus the aggregator's id for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregator_id: Option<String>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aggregator_id: None,
        }
    }

    pub fn with_aggregator_id(mut self, id: impl Into<String>) -> Self {
        self.aggregator_id = Some(id.into());
        self
    }
}

/// One chat-completion capability over a vendor wire protocol.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn provider(&self) -> Provider;

    /// Send `system` plus alternating `turns` and return the completion text, which may be
    /// empty when the vendor returned no content.
    async fn send(&self, system: &str, turns: &[Turn], params: &CompletionParams)
        -> Result<String>;
}

/// Builds a backend for a model and credential. Called once per generation or scoring run.
pub trait BackendConnector: Send + Sync {
    fn connect(
        &self,
        model: &ModelDescriptor,
        credential: &Credential,
    ) -> Result<Arc<dyn ChatBackend>>;
}

/// Connects to the real vendor APIs using [`ClientSettings`] and a [`ModelCatalog`].
#[derive(Debug, Clone)]
pub struct HttpConnector {
    settings: ClientSettings,
    catalog: Arc<ModelCatalog>,
}

impl HttpConnector {
    pub fn new(settings: ClientSettings, catalog: Arc<ModelCatalog>) -> Self {
        Self { settings, catalog }
    }

    /// Settings from the environment and the builtin catalog.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(ClientSettings::from_env()?, ModelCatalog::builtin()?))
    }

    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }
}

impl BackendConnector for HttpConnector {
    fn connect(
        &self,
        model: &ModelDescriptor,
        credential: &Credential,
    ) -> Result<Arc<dyn ChatBackend>> {
        let route = self.catalog.route(model, credential)?;
        debug!(provider = %route.provider, model = %route.model_id, "routing model");
        let key = credential.key();
        let backend: Arc<dyn ChatBackend> = match route.provider {
            Provider::OpenAi => Arc::new(OpenAiBackend::new(&self.settings, key, route.model_id)?),
            Provider::Anthropic => {
                Arc::new(AnthropicBackend::new(&self.settings, key, route.model_id)?)
            }
            Provider::Gemini => Arc::new(GeminiBackend::new(&self.settings, key, route.model_id)?),
            Provider::OpenRouter => {
                Arc::new(OpenRouterBackend::new(&self.settings, key, route.model_id)?)
            }
        };
        Ok(backend)
    }
}

pub(crate) fn require_key(provider: Provider, key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(AutointerpError::credential(provider.label()));
    }
    Ok(())
}
