use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{require_key, ChatBackend, ClientSettings, CompletionParams, Provider};
use crate::error::{AutointerpError, Result};
use crate::prompt::Turn;

#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    http: Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(settings: &ClientSettings, api_key: &str, model: impl Into<String>) -> Result<Self> {
        require_key(Provider::OpenAi, api_key)?;
        let url = format!(
            "{}/v1/chat/completions",
            settings.openai_base.trim_end_matches('/')
        );
        let http = settings
            .http_client()
            .map_err(|err| AutointerpError::transport(Provider::OpenAi.label(), err))?;
        Ok(Self {
            http,
            url,
            api_key: api_key.to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    #[instrument(skip_all, fields(provider = "OpenAI", model = %self.model))]
    async fn send(
        &self,
        system: &str,
        turns: &[Turn],
        params: &CompletionParams,
    ) -> Result<String> {
        let mut payload = ChatCompletionRequest::new(&self.model, system, turns, params);
        payload.max_completion_tokens = params.max_tokens;
        post_chat_completion(&self.http, &self.url, &self.api_key, &payload, Provider::OpenAi)
            .await
    }
}

/// POST a chat-completions body and pull the first choice's content out of the reply.
pub(super) async fn post_chat_completion(
    http: &Client,
    url: &str,
    api_key: &str,
    payload: &ChatCompletionRequest<'_>,
    provider: Provider,
) -> Result<String> {
    let response = http
        .post(url)
        .bearer_auth(api_key)
        .json(payload)
        .send()
        .await
        .map_err(|err| AutointerpError::transport(provider.label(), err))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!(%status, %body, "{} returned an error", provider.label());
        return Err(AutointerpError::status(provider.label(), status));
    }

    let chat: ChatCompletionResponse = response
        .json()
        .await
        .map_err(|err| AutointerpError::transport(provider.label(), err))?;
    Ok(chat
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .unwrap_or_default())
}

#[derive(Debug, Serialize)]
pub(super) struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

impl<'a> ChatCompletionRequest<'a> {
    /// Body without a token cap; callers pick the cap field their endpoint expects.
    pub(super) fn new(
        model: &'a str,
        system: &'a str,
        turns: &'a [Turn],
        params: &CompletionParams,
    ) -> Self {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
        messages.extend(turns.iter().map(|turn| ChatMessage {
            role: match turn.role {
                crate::prompt::Role::User => "user",
                crate::prompt::Role::Assistant => "assistant",
            },
            content: &turn.content,
        }));
        Self {
            model,
            messages,
            max_completion_tokens: None,
            max_tokens: None,
            temperature: params.temperature,
            top_p: params.top_p,
            response_format: params.json_response.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
