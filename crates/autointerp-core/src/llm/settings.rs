use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Endpoints and HTTP client options shared by every backend and scoring-service client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub openai_base: String,
    pub anthropic_base: String,
    pub gemini_base: String,
    pub openrouter_base: String,
    pub scorer_url: Option<String>,
    pub scorer_secret: Option<String>,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            openai_base: "https://api.openai.com".to_string(),
            anthropic_base: "https://api.anthropic.com".to_string(),
            gemini_base: "https://generativelanguage.googleapis.com".to_string(),
            openrouter_base: "https://openrouter.ai/api/v1".to_string(),
            scorer_url: None,
            scorer_secret: None,
            user_agent: concat!("autointerp/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Unvalidated settings as read from the environment or a config file.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    openai_base: Option<String>,
    anthropic_base: Option<String>,
    gemini_base: Option<String>,
    openrouter_base: Option<String>,
    scorer_url: Option<String>,
    scorer_secret: Option<String>,
    user_agent: Option<String>,
    timeout: Option<String>,
}

impl ClientSettings {
    const ENV_PREFIX: &'static str = "AUTOINTERP";
    const OPENAI_BASE_ENV: &'static str = "AUTOINTERP_OPENAI_BASE";
    const ANTHROPIC_BASE_ENV: &'static str = "AUTOINTERP_ANTHROPIC_BASE";
    const GEMINI_BASE_ENV: &'static str = "AUTOINTERP_GEMINI_BASE";
    const OPENROUTER_BASE_ENV: &'static str = "AUTOINTERP_OPENROUTER_BASE";
    const SCORER_URL_ENV: &'static str = "AUTOINTERP_SCORER_URL";
    const SCORER_SECRET_ENV: &'static str = "AUTOINTERP_SCORER_SECRET";
    const USER_AGENT_ENV: &'static str = "AUTOINTERP_USER_AGENT";
    const TIMEOUT_ENV: &'static str = "AUTOINTERP_TIMEOUT";

    /// Load settings from `AUTOINTERP_*` environment variables.
    ///
    /// * `AUTOINTERP_OPENAI_BASE`, `_ANTHROPIC_BASE`, `_GEMINI_BASE`, `_OPENROUTER_BASE` override
    ///   vendor base URLs.
    /// * `AUTOINTERP_SCORER_URL` / `AUTOINTERP_SCORER_SECRET` locate the batched scoring service.
    /// * `AUTOINTERP_TIMEOUT` accepts `45s`, `2m` or a bare number of seconds.
    pub fn from_env() -> Result<Self> {
        Self::from_map(std::env::vars().collect())
    }

    pub fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).cloned();
        RawSettings {
            openai_base: get(Self::OPENAI_BASE_ENV),
            anthropic_base: get(Self::ANTHROPIC_BASE_ENV),
            gemini_base: get(Self::GEMINI_BASE_ENV),
            openrouter_base: get(Self::OPENROUTER_BASE_ENV),
            scorer_url: get(Self::SCORER_URL_ENV),
            scorer_secret: get(Self::SCORER_SECRET_ENV),
            user_agent: get(Self::USER_AGENT_ENV),
            timeout: get(Self::TIMEOUT_ENV),
        }
        .resolve()
    }

    /// Layer an optional config file (TOML, YAML or JSON, keys as in `RawSettings`) under the
    /// `AUTOINTERP_*` environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(config::Environment::with_prefix(Self::ENV_PREFIX));
        let raw: RawSettings = builder
            .build()
            .context("failed to read autointerp configuration")?
            .try_deserialize()
            .context("invalid autointerp configuration")?;
        raw.resolve()
    }

    pub(crate) fn http_client(&self) -> reqwest::Result<Client> {
        Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .build()
    }
}

impl RawSettings {
    fn resolve(self) -> Result<ClientSettings> {
        let defaults = ClientSettings::default();
        let timeout = match non_empty(self.timeout) {
            Some(raw) => parse_timeout(&raw)?,
            None => defaults.timeout,
        };
        Ok(ClientSettings {
            openai_base: non_empty(self.openai_base).unwrap_or(defaults.openai_base),
            anthropic_base: non_empty(self.anthropic_base).unwrap_or(defaults.anthropic_base),
            gemini_base: non_empty(self.gemini_base).unwrap_or(defaults.gemini_base),
            openrouter_base: non_empty(self.openrouter_base).unwrap_or(defaults.openrouter_base),
            scorer_url: non_empty(self.scorer_url),
            scorer_secret: non_empty(self.scorer_secret),
            user_agent: non_empty(self.user_agent).unwrap_or(defaults.user_agent),
            timeout,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    let timeout = match raw.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(raw)
            .with_context(|| format!("invalid timeout `{raw}`"))?,
    };
    if timeout.is_zero() {
        bail!("timeout must be greater than zero");
    }
    Ok(timeout)
}
