use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{require_key, ChatBackend, ClientSettings, CompletionParams, Provider};
use crate::error::{AutointerpError, Result};
use crate::prompt::{Role, Turn};

#[derive(Debug, Clone)]
pub struct GeminiBackend {
    http: Client,
    url: String,
    api_key: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(settings: &ClientSettings, api_key: &str, model: impl Into<String>) -> Result<Self> {
        require_key(Provider::Gemini, api_key)?;
        let model = model.into();
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            settings.gemini_base.trim_end_matches('/'),
            model
        );
        let http = settings
            .http_client()
            .map_err(|err| AutointerpError::transport(Provider::Gemini.label(), err))?;
        Ok(Self {
            http,
            url,
            api_key: api_key.to_string(),
            model,
        })
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    #[instrument(skip_all, fields(provider = "Gemini", model = %self.model))]
    async fn send(
        &self,
        system: &str,
        turns: &[Turn],
        params: &CompletionParams,
    ) -> Result<String> {
        let payload = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system }],
            },
            contents: turns
                .iter()
                .map(|turn| GeminiContent {
                    role: Some(match turn.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    }),
                    parts: vec![GeminiPart {
                        text: &turn.content,
                    }],
                })
                .collect(),
            generation_config: GenerationConfig {
                max_output_tokens: params.max_tokens,
                temperature: params.temperature,
                top_p: params.top_p,
                response_mime_type: params.json_response.then_some("application/json"),
            },
        };

        let response = self
            .http
            .post(&self.url)
            .query(&[("key", &self.api_key)])
            .json(&payload)
            .send()
            .await
            .map_err(|err| AutointerpError::transport(Provider::Gemini.label(), err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, %body, "Gemini returned an error");
            return Err(AutointerpError::status(Provider::Gemini.label(), status));
        }

        let reply: GeminiResponse = response
            .json()
            .await
            .map_err(|err| AutointerpError::transport(Provider::Gemini.label(), err))?;
        Ok(reply
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn settings(base: String) -> ClientSettings {
        ClientSettings {
            gemini_base: base,
            ..ClientSettings::default()
        }
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn send_maps_assistant_turns_to_model_role() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-test:generateContent")
                .query_param("key", "test-key")
                .json_body_partial(
                    r#"{"systemInstruction":{"parts":[{"text":"sys"}]},"contents":[{"role":"user","parts":[{"text":"q"}]},{"role":"model","parts":[{"text":"a"}]},{"role":"user","parts":[{"text":"open"}]}]}"#,
                );
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "candidates": [
                        {"content": {"role": "model", "parts": [{"text": "numbers "}, {"text": "and digits"}]}}
                    ]
                }));
        });

        let backend = GeminiBackend::new(&settings(server.base_url()), "test-key", "gemini-test").unwrap();
        let turns = [Turn::user("q"), Turn::assistant("a"), Turn::user("open")];
        let text = backend
            .send("sys", &turns, &CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(text, "numbers and digits");
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn forbidden_is_provider_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-test:generateContent");
            then.status(403).body("API key not valid");
        });

        let backend = GeminiBackend::new(&settings(server.base_url()), "test-key", "gemini-test").unwrap();
        let err = backend
            .send("sys", &[Turn::user("q")], &CompletionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AutointerpError::Provider { status: Some(403), .. }));
    }
}
