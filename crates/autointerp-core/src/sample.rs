use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::decoy::decoy_samples;
use crate::error::{AutointerpError, Result};

/// A text span with one activation value per token for a single feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationSample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub tokens: Vec<String>,
    pub values: Vec<f64>,
    /// Per-token attention weights; only read by the attention-pair strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dfa_values: Option<Vec<f64>>,
    /// Index of the attending ("from") token; only read by the attention-pair strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dfa_target_index: Option<usize>,
}

impl ActivationSample {
    /// Construct a sample, validating the token/value invariant before returning.
    pub fn new(tokens: Vec<String>, values: Vec<f64>) -> Result<Self> {
        let sample = Self {
            id: None,
            tokens,
            values,
            dfa_values: None,
            dfa_target_index: None,
        };
        sample.validate()?;
        Ok(sample)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attention(mut self, dfa_values: Vec<f64>, dfa_target_index: usize) -> Self {
        self.dfa_values = Some(dfa_values);
        self.dfa_target_index = Some(dfa_target_index);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tokens.is_empty() {
            return Err(AutointerpError::InvalidSample {
                detail: format!("{} has no tokens", self.label()),
            });
        }
        if self.tokens.len() != self.values.len() {
            return Err(AutointerpError::InvalidSample {
                detail: format!(
                    "{} has {} tokens but {} values",
                    self.label(),
                    self.tokens.len(),
                    self.values.len()
                ),
            });
        }
        if let Some(dfa) = &self.dfa_values {
            if dfa.len() != self.tokens.len() {
                return Err(AutointerpError::InvalidSample {
                    detail: format!(
                        "{} has {} tokens but {} attention values",
                        self.label(),
                        self.tokens.len(),
                        dfa.len()
                    ),
                });
            }
        }
        if let Some(target) = self.dfa_target_index {
            if target >= self.tokens.len() {
                return Err(AutointerpError::InvalidSample {
                    detail: format!(
                        "{} has {} tokens but attention target index {}",
                        self.label(),
                        self.tokens.len(),
                        target
                    ),
                });
            }
        }
        Ok(())
    }

    /// Index of the max-activating token; the first one wins on ties.
    pub fn max_index(&self) -> Option<usize> {
        argmax(&self.values)
    }

    pub fn max_value(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Concatenated token text, used as the identity of a sample across services.
    pub fn text(&self) -> String {
        self.tokens.concat()
    }

    fn label(&self) -> String {
        match &self.id {
            Some(id) => format!("sample `{id}`"),
            None => "sample".to_string(),
        }
    }
}

pub(crate) fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Samples handed to a scorer: `top` should match the explanation, `zero` and `decoy` should not.
#[derive(Debug, Clone, Serialize)]
pub struct SamplePartitions {
    pub top: Vec<ActivationSample>,
    pub zero: Vec<ActivationSample>,
    pub decoy: &'static [ActivationSample],
}

impl SamplePartitions {
    /// Partitions using the fixed decoy set.
    pub fn new(top: Vec<ActivationSample>, zero: Vec<ActivationSample>) -> Self {
        Self {
            top,
            zero,
            decoy: decoy_samples(),
        }
    }

    pub fn total(&self) -> usize {
        self.top.len() + self.zero.len() + self.decoy.len()
    }

    pub fn validate(&self) -> Result<()> {
        self.top
            .iter()
            .chain(self.zero.iter())
            .try_for_each(ActivationSample::validate)
    }

    /// `top` followed by `zero`, the set batched scoring services receive.
    pub fn feature_samples(&self) -> impl Iterator<Item = &ActivationSample> {
        self.top.iter().chain(self.zero.iter())
    }
}

/// How activation samples are encoded into the explainer prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExplanationStrategy {
    #[serde(rename = "oai_token-act-pair")]
    TokenActivationPair,
    #[serde(rename = "np_max-act-logits")]
    MaxLogit,
    #[serde(rename = "oai_attention-head")]
    AttentionPair,
}

impl ExplanationStrategy {
    pub const ALL: [ExplanationStrategy; 3] = [
        ExplanationStrategy::TokenActivationPair,
        ExplanationStrategy::MaxLogit,
        ExplanationStrategy::AttentionPair,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TokenActivationPair => "oai_token-act-pair",
            Self::MaxLogit => "np_max-act-logits",
            Self::AttentionPair => "oai_attention-head",
        }
    }
}

impl fmt::Display for ExplanationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What produced an explanation: a locally rendered prompt, or the scoring service's own
/// explainer run over the twenty strongest samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExplanationType {
    Prompt(ExplanationStrategy),
    ActsTop20,
}

impl ExplanationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prompt(strategy) => strategy.as_str(),
            Self::ActsTop20 => "eleuther_acts_top20",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        if name == Self::ActsTop20.as_str() {
            return Some(Self::ActsTop20);
        }
        ExplanationStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == name)
            .map(Self::Prompt)
    }
}

impl From<ExplanationStrategy> for ExplanationType {
    fn from(strategy: ExplanationStrategy) -> Self {
        Self::Prompt(strategy)
    }
}

impl fmt::Display for ExplanationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ExplanationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExplanationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::parse(&name)
            .ok_or_else(|| D::Error::custom(format!("unknown explanation type `{name}`")))
    }
}

/// A natural-language hypothesis of what a feature detects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationCandidate {
    pub description: String,
    pub strategy: ExplanationType,
    pub model_name: String,
}
