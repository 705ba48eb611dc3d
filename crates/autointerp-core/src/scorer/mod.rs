pub mod classifier;
pub mod embedding;
pub mod quantile;
pub mod recall;
pub mod service;
mod verdict;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::llm::{Credential, ModelDescriptor};
use crate::sample::SamplePartitions;

pub use classifier::{ClassifierRow, ClassifierScorer};
pub use embedding::{EmbeddingRow, EmbeddingScorer, EMBEDDING_MODEL_NAME};
pub use recall::{RecallBreakdown, RecallRow, RecallScorer};
pub use service::{ClassifierMode, RemoteScoringService, ScoringService};

/// Scoring method; the names are the persisted score-type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScorerType {
    #[serde(rename = "recall_alt")]
    Recall,
    #[serde(rename = "eleuther_fuzz")]
    Fuzz,
    #[serde(rename = "eleuther_recall")]
    Detection,
    #[serde(rename = "eleuther_embedding")]
    Embedding,
}

impl ScorerType {
    pub const ALL: [ScorerType; 4] = [
        ScorerType::Recall,
        ScorerType::Fuzz,
        ScorerType::Detection,
        ScorerType::Embedding,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recall => "recall_alt",
            Self::Fuzz => "eleuther_fuzz",
            Self::Detection => "eleuther_recall",
            Self::Embedding => "eleuther_embedding",
        }
    }
}

impl fmt::Display for ScorerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scorer-specific detail kept next to the aggregate value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum ScoreBreakdown {
    Recall(RecallBreakdown),
    Classifier(Vec<ClassifierRow>),
    Embedding(Vec<EmbeddingRow>),
}

impl ScoreBreakdown {
    pub fn row_count(&self) -> usize {
        match self {
            Self::Recall(rows) => rows.top.len() + rows.zero.len() + rows.decoy.len(),
            Self::Classifier(rows) => rows.len(),
            Self::Embedding(rows) => rows.len(),
        }
    }
}

/// One score for one explanation from one scorer and model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub value: f64,
    pub scorer_type: ScorerType,
    pub scorer_model: String,
    pub breakdown: ScoreBreakdown,
}

/// Turns an explanation plus sample partitions into a [`ScoreRecord`].
#[async_trait]
pub trait Scorer: Send + Sync {
    fn scorer_type(&self) -> ScorerType;

    async fn score(
        &self,
        explanation: &str,
        partitions: &SamplePartitions,
        model: &ModelDescriptor,
        credential: &Credential,
    ) -> Result<ScoreRecord>;
}
