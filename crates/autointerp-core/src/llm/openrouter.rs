use async_trait::async_trait;
use reqwest::Client;
use tracing::instrument;

use super::openai::{post_chat_completion, ChatCompletionRequest};
use super::{require_key, ChatBackend, ClientSettings, CompletionParams, Provider};
use crate::error::{AutointerpError, Result};
use crate::prompt::Turn;

/// Multi-vendor aggregator speaking the OpenAI chat-completions envelope.
///
/// `model` is the aggregator's id (`anthropic/claude-3.5-haiku`), not the vendor's name.
#[derive(Debug, Clone)]
pub struct OpenRouterBackend {
    http: Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenRouterBackend {
    pub fn new(settings: &ClientSettings, api_key: &str, model: impl Into<String>) -> Result<Self> {
        require_key(Provider::OpenRouter, api_key)?;
        let url = format!(
            "{}/chat/completions",
            settings.openrouter_base.trim_end_matches('/')
        );
        let http = settings
            .http_client()
            .map_err(|err| AutointerpError::transport(Provider::OpenRouter.label(), err))?;
        Ok(Self {
            http,
            url,
            api_key: api_key.to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ChatBackend for OpenRouterBackend {
    fn provider(&self) -> Provider {
        Provider::OpenRouter
    }

    #[instrument(skip_all, fields(provider = "OpenRouter", model = %self.model))]
    async fn send(
        &self,
        system: &str,
        turns: &[Turn],
        params: &CompletionParams,
    ) -> Result<String> {
        let mut payload = ChatCompletionRequest::new(&self.model, system, turns, params);
        payload.max_tokens = params.max_tokens;
        post_chat_completion(
            &self.http,
            &self.url,
            &self.api_key,
            &payload,
            Provider::OpenRouter,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn send_uses_aggregator_id_and_max_tokens() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/chat/completions")
                .header("authorization", "Bearer or-key")
                .json_body_partial(r#"{"model":"openai/gpt-4o-mini","max_tokens":5000,"temperature":0.0}"#);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"choices": [{"message": {"content": "{\"match\": true, \"reason\": \"ok\"}"}}]}));
        });

        let settings = ClientSettings {
            openrouter_base: format!("{}/api/v1", server.base_url()),
            ..ClientSettings::default()
        };
        let backend = OpenRouterBackend::new(&settings, "or-key", "openai/gpt-4o-mini").unwrap();
        let text = backend
            .send("sys", &[Turn::user("judge")], &CompletionParams::judge())
            .await
            .unwrap();
        assert!(text.contains("\"match\": true"));
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn missing_content_is_empty_text() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"choices": [{"message": {"content": null}}]}));
        });

        let settings = ClientSettings {
            openrouter_base: server.base_url(),
            ..ClientSettings::default()
        };
        let backend = OpenRouterBackend::new(&settings, "or-key", "x/y").unwrap();
        let text = backend
            .send("sys", &[Turn::user("judge")], &CompletionParams::judge())
            .await
            .unwrap();
        assert!(text.is_empty());
    }
}
