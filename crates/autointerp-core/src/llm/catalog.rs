use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::{Credential, ModelDescriptor, Provider};
use crate::error::AutointerpError;
use crate::sample::ExplanationStrategy;

const BUILTIN_YAML: &str = include_str!("models.yaml");

static BUILTIN: OnceCell<Arc<ModelCatalog>> = OnceCell::new();

/// The company that serves a model on its own API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vendor {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google")]
    Google,
}

impl Vendor {
    pub fn provider(self) -> Provider {
        match self {
            Self::OpenAi => Provider::OpenAi,
            Self::Anthropic => Provider::Anthropic,
            Self::Google => Provider::Gemini,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        })
    }
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    pattern: String,
    #[serde(default)]
    vendor: Option<Vendor>,
    #[serde(default)]
    reasoning: bool,
    #[serde(default)]
    strategies: Option<Vec<ExplanationStrategy>>,
}

#[derive(Debug, Clone)]
struct CompiledRow {
    pattern: Regex,
    vendor: Option<Vendor>,
    reasoning: bool,
    strategies: Option<Vec<ExplanationStrategy>>,
}

/// What the catalog knows about one model name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelCapabilities {
    pub vendor: Option<Vendor>,
    pub reasoning: bool,
    /// `None` means every strategy is allowed.
    pub strategies: Option<Vec<ExplanationStrategy>>,
}

impl ModelCapabilities {
    pub fn supports(&self, strategy: ExplanationStrategy) -> bool {
        self.strategies
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&strategy))
    }
}

/// Where a request for a model is sent and under which id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub provider: Provider,
    pub model_id: String,
}

/// Pattern table mapping model names to vendor and capability flags.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    rows: Vec<CompiledRow>,
}

impl ModelCatalog {
    /// The catalog shipped with the crate, parsed once per process.
    pub fn builtin() -> Result<Arc<Self>> {
        BUILTIN
            .get_or_try_init(|| Self::from_yaml(BUILTIN_YAML).map(Arc::new))
            .cloned()
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        let rows: Vec<CatalogRow> =
            serde_yaml::from_str(source).context("invalid model catalog YAML")?;
        let rows = rows
            .into_iter()
            .map(|row| {
                let pattern = Regex::new(&row.pattern).with_context(|| {
                    format!("invalid model pattern `{}` in catalog", row.pattern)
                })?;
                Ok(CompiledRow {
                    pattern,
                    vendor: row.vendor,
                    reasoning: row.reasoning,
                    strategies: row.strategies,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows })
    }

    pub fn capabilities(&self, model_name: &str) -> ModelCapabilities {
        let mut caps = ModelCapabilities::default();
        for row in self.rows.iter().filter(|row| row.pattern.is_match(model_name)) {
            if caps.vendor.is_none() {
                caps.vendor = row.vendor;
            }
            caps.reasoning |= row.reasoning;
            if caps.strategies.is_none() {
                caps.strategies = row.strategies.clone();
            }
        }
        caps
    }

    pub fn vendor(&self, model_name: &str) -> Option<Vendor> {
        self.capabilities(model_name).vendor
    }

    pub fn is_reasoning(&self, model_name: &str) -> bool {
        self.capabilities(model_name).reasoning
    }

    /// Pick the backend for `model` given the kind of key the caller holds.
    ///
    /// Aggregator keys reach every model under its aggregator id (falling back to the plain
    /// name). Direct keys must belong to the model's vendor.
    pub fn route(
        &self,
        model: &ModelDescriptor,
        credential: &Credential,
    ) -> crate::error::Result<Route> {
        if credential.kind().is_aggregator() {
            return Ok(Route {
                provider: Provider::OpenRouter,
                model_id: model
                    .aggregator_id
                    .clone()
                    .unwrap_or_else(|| model.name.clone()),
            });
        }
        let vendor = self.vendor(&model.name).ok_or_else(|| {
            AutointerpError::unsupported(format!(
                "model `{}` has no direct vendor and needs an aggregator key",
                model.name
            ))
        })?;
        if super::KeyKind::for_vendor(vendor) != credential.kind() {
            return Err(AutointerpError::credential(
                super::KeyKind::for_vendor(vendor).label(),
            ));
        }
        Ok(Route {
            provider: vendor.provider(),
            model_id: model.name.clone(),
        })
    }
}
