//! Client for the batched fuzz/detection and embedding scoring service.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, instrument};

use crate::error::{AutointerpError, Result};
use crate::llm::ClientSettings;
use crate::sample::ActivationSample;

const PROVIDER: &str = "scoring service";
const SECRET_HEADER: &str = "X-SECRET-KEY";

/// A sample as the service sees it: tokens and values only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BareActivation {
    pub tokens: Vec<String>,
    pub values: Vec<f64>,
}

impl From<&ActivationSample> for BareActivation {
    fn from(sample: &ActivationSample) -> Self {
        Self {
            tokens: sample.tokens.clone(),
            values: sample.values.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClassifierMode {
    Fuzz,
    Detection,
}

#[derive(Clone, Serialize)]
pub struct FuzzDetectionRequest {
    #[serde(rename = "type")]
    pub mode: ClassifierMode,
    pub activations: Vec<BareActivation>,
    pub explanation: String,
    /// Aggregator id of the judging model.
    pub model: String,
    pub openrouter_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuzzDetectionResponse {
    pub score: f64,
    #[serde(default)]
    pub breakdown: Vec<ClassifierOutput>,
}

/// One judged sample. `prediction` is `None` when the service reported its `-1` error sentinel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassifierOutput {
    #[serde(default)]
    pub str_tokens: Vec<String>,
    #[serde(default)]
    pub activations: Vec<f64>,
    pub distance: f64,
    pub ground_truth: bool,
    #[serde(deserialize_with = "prediction_or_sentinel")]
    pub prediction: Option<bool>,
    #[serde(default)]
    pub highlighted: bool,
    pub correct: bool,
    #[serde(default)]
    pub probability: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest {
    pub activations: Vec<BareActivation>,
    pub explanation: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingResponse {
    pub score: f64,
    #[serde(default)]
    pub breakdown: Vec<EmbeddingOutput>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmbeddingOutput {
    pub text: String,
    pub distance: f64,
    pub similarity: f64,
}

/// Request for the service's own explainer.
#[derive(Clone, Serialize)]
pub struct ExplainRequest {
    pub activations: Vec<BareActivation>,
    pub openrouter_key: String,
    /// Aggregator id of the explaining model.
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplainResponse {
    pub explanation: String,
}

fn prediction_or_sentinel<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Flag(flag) => Some(flag),
        Raw::Number(-1) => None,
        Raw::Number(n) => Some(n != 0),
    })
}

/// The batched scoring backend.
#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn fuzz_detection(&self, request: &FuzzDetectionRequest) -> Result<FuzzDetectionResponse>;

    async fn embedding(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse>;

    async fn explain_default(&self, request: &ExplainRequest) -> Result<ExplainResponse>;
}

#[derive(Debug, Clone)]
pub struct RemoteScoringService {
    http: Client,
    base: String,
    secret: Option<String>,
}

impl RemoteScoringService {
    pub fn new(settings: &ClientSettings) -> anyhow::Result<Self> {
        let base = settings
            .scorer_url
            .clone()
            .context("AUTOINTERP_SCORER_URL must be set to use the scoring service")?;
        let http = settings
            .http_client()
            .context("failed to build scoring service HTTP client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            secret: settings.scorer_secret.clone(),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned + Send,
    {
        let mut request = self.http.post(format!("{}{}", self.base, path)).json(body);
        if let Some(secret) = &self.secret {
            request = request.header(SECRET_HEADER, secret);
        }
        let response = request
            .send()
            .await
            .map_err(|err| AutointerpError::transport(PROVIDER, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, %body, "scoring service returned an error");
            return Err(AutointerpError::status(PROVIDER, status));
        }
        response
            .json()
            .await
            .map_err(|err| AutointerpError::transport(PROVIDER, err))
    }
}

#[async_trait]
impl ScoringService for RemoteScoringService {
    #[instrument(skip_all, fields(mode = ?request.mode, samples = request.activations.len()))]
    async fn fuzz_detection(&self, request: &FuzzDetectionRequest) -> Result<FuzzDetectionResponse> {
        self.post("/v1/score/fuzz-detection", request).await
    }

    #[instrument(skip_all, fields(samples = request.activations.len()))]
    async fn embedding(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.post("/v1/score/embedding", request).await
    }

    #[instrument(skip_all, fields(model = %request.model, samples = request.activations.len()))]
    async fn explain_default(&self, request: &ExplainRequest) -> Result<ExplainResponse> {
        self.post("/v1/explain/default", request).await
    }
}
