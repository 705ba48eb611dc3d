use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::catalog::Vendor;
use crate::error::{AutointerpError, Result};

/// Which backend family a key was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    OpenAi,
    Anthropic,
    Google,
    /// Aggregator key; every model routes through the aggregator.
    OpenRouter,
}

impl KeyKind {
    pub fn for_vendor(vendor: Vendor) -> Self {
        match vendor {
            Vendor::OpenAi => Self::OpenAi,
            Vendor::Anthropic => Self::Anthropic,
            Vendor::Google => Self::Google,
        }
    }

    pub fn is_aggregator(self) -> bool {
        self == Self::OpenRouter
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Google => "Google",
            Self::OpenRouter => "OpenRouter",
        }
    }
}

/// An API key plus the kind of backend it unlocks. Immutable and passed per call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    key: String,
    kind: KeyKind,
}

impl Credential {
    pub fn new(kind: KeyKind, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Keys available to a caller, at most one per [`KeyKind`].
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    keys: HashMap<KeyKind, Credential>,
}

impl Credentials {
    const ENV_KEYS: [(KeyKind, &'static str); 4] = [
        (KeyKind::OpenAi, "OPENAI_API_KEY"),
        (KeyKind::Anthropic, "ANTHROPIC_API_KEY"),
        (KeyKind::Google, "GEMINI_API_KEY"),
        (KeyKind::OpenRouter, "OPENROUTER_API_KEY"),
    ];

    pub fn from_env() -> Self {
        Self::from_map(std::env::vars().collect())
    }

    pub fn from_map(vars: HashMap<String, String>) -> Self {
        let mut credentials = Self::default();
        for (kind, env) in Self::ENV_KEYS {
            if let Some(key) = vars.get(env).map(|v| v.trim()).filter(|v| !v.is_empty()) {
                credentials = credentials.with(Credential::new(kind, key));
            }
        }
        credentials
    }

    pub fn with(mut self, credential: Credential) -> Self {
        self.keys.insert(credential.kind, credential);
        self
    }

    pub fn get(&self, kind: KeyKind) -> Option<&Credential> {
        self.keys.get(&kind)
    }

    /// The direct key for `vendor` if present, else the aggregator key.
    pub fn resolve(&self, vendor: Option<Vendor>) -> Result<Credential> {
        let direct = vendor.and_then(|v| self.get(KeyKind::for_vendor(v)));
        direct
            .or_else(|| self.get(KeyKind::OpenRouter))
            .cloned()
            .ok_or_else(|| {
                AutointerpError::credential(
                    vendor
                        .map(|v| KeyKind::for_vendor(v).label())
                        .unwrap_or(KeyKind::OpenRouter.label()),
                )
            })
    }

    /// Only the aggregator key; for scorers that cannot run on direct vendor keys.
    pub fn aggregator(&self) -> Result<Credential> {
        self.get(KeyKind::OpenRouter)
            .cloned()
            .ok_or_else(|| AutointerpError::credential(KeyKind::OpenRouter.label()))
    }
}
