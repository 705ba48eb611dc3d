use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{require_key, ChatBackend, ClientSettings, CompletionParams, Provider};
use crate::error::{AutointerpError, Result};
use crate::prompt::{Role, Turn};

const API_VERSION: &str = "2023-06-01";
/// The messages API requires a cap; used when the caller leaves it unset.
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    http: Client,
    url: String,
    api_key: String,
    model: String,
}

impl AnthropicBackend {
    pub fn new(settings: &ClientSettings, api_key: &str, model: impl Into<String>) -> Result<Self> {
        require_key(Provider::Anthropic, api_key)?;
        let url = format!(
            "{}/v1/messages",
            settings.anthropic_base.trim_end_matches('/')
        );
        let http = settings
            .http_client()
            .map_err(|err| AutointerpError::transport(Provider::Anthropic.label(), err))?;
        Ok(Self {
            http,
            url,
            api_key: api_key.to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    #[instrument(skip_all, fields(provider = "Anthropic", model = %self.model))]
    async fn send(
        &self,
        system: &str,
        turns: &[Turn],
        params: &CompletionParams,
    ) -> Result<String> {
        let payload = AnthropicRequest {
            model: &self.model,
            system,
            messages: turns
                .iter()
                .map(|turn| AnthropicMessage {
                    role: match turn.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content: &turn.content,
                })
                .collect(),
            max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: params.temperature,
            top_p: params.top_p,
        };

        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|err| AutointerpError::transport(Provider::Anthropic.label(), err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, %body, "Anthropic returned an error");
            return Err(AutointerpError::status(Provider::Anthropic.label(), status));
        }

        let message: AnthropicResponse = response
            .json()
            .await
            .map_err(|err| AutointerpError::transport(Provider::Anthropic.label(), err))?;
        Ok(message
            .content
            .into_iter()
            .find_map(|part| part.text)
            .unwrap_or_default())
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    _type: String,
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn settings(base: String) -> ClientSettings {
        ClientSettings {
            anthropic_base: base,
            ..ClientSettings::default()
        }
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn send_parses_successful_response() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .header("x-api-key", "test-key")
                .header("anthropic-version", "2023-06-01")
                .json_body_partial(r#"{"system":"sys","max_tokens":60}"#);
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"content":[{"type":"text","text":"words about felines"}]}"#);
        });

        let backend = AnthropicBackend::new(&settings(server.base_url()), "test-key", "claude-test").unwrap();
        let params = CompletionParams::explanation(
            crate::sample::ExplanationStrategy::TokenActivationPair,
            Provider::Anthropic,
        );
        let text = backend.send("sys", &[Turn::user("hello")], &params).await.unwrap();
        assert_eq!(text, "words about felines");
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn server_error_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(500);
        });

        let backend = AnthropicBackend::new(&settings(server.base_url()), "test-key", "claude-test").unwrap();
        let err = backend
            .send("sys", &[Turn::user("hello")], &CompletionParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Anthropic request failed"));
        mock.assert_hits(1);
    }
}
