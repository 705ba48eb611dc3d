use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::quantile::{invert_distance, sort_by_distance};
use super::service::{BareActivation, EmbeddingOutput, EmbeddingRequest, ScoringService};
use super::{ScoreBreakdown, ScoreRecord, Scorer, ScorerType};
use crate::error::Result;
use crate::llm::{Credential, ModelDescriptor};
use crate::sample::{ActivationSample, SamplePartitions};

/// The embedding model the scoring service runs; recorded as the scorer model.
pub const EMBEDDING_MODEL_NAME: &str = "stella_en_400m_v5";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRow {
    pub text: String,
    pub distance: f64,
    pub similarity: f64,
    pub tokens: Vec<String>,
    pub values: Vec<f64>,
}

impl EmbeddingRow {
    /// Attach the first sample whose token text equals the row text; empty tokens otherwise.
    fn associate(output: EmbeddingOutput, samples: &[&ActivationSample]) -> Self {
        let (tokens, values) = samples
            .iter()
            .find(|sample| sample.text() == output.text)
            .map(|sample| (sample.tokens.clone(), sample.values.clone()))
            .unwrap_or_default();
        Self {
            text: output.text,
            distance: invert_distance(output.distance),
            similarity: output.similarity,
            tokens,
            values,
        }
    }
}

pub struct EmbeddingScorer {
    service: Arc<dyn ScoringService>,
}

impl EmbeddingScorer {
    pub fn new(service: Arc<dyn ScoringService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Scorer for EmbeddingScorer {
    fn scorer_type(&self) -> ScorerType {
        ScorerType::Embedding
    }

    /// The model and credential are not used; the service owns its embedding model.
    #[instrument(skip_all, fields(samples = partitions.top.len() + partitions.zero.len()))]
    async fn score(
        &self,
        explanation: &str,
        partitions: &SamplePartitions,
        _model: &ModelDescriptor,
        _credential: &Credential,
    ) -> Result<ScoreRecord> {
        partitions.validate()?;
        let samples: Vec<&ActivationSample> = partitions.feature_samples().collect();
        let request = EmbeddingRequest {
            activations: samples.iter().copied().map(BareActivation::from).collect(),
            explanation: explanation.to_string(),
        };
        let response = self.service.embedding(&request).await?;

        let mut rows: Vec<EmbeddingRow> = response
            .breakdown
            .into_iter()
            .map(|output| EmbeddingRow::associate(output, &samples))
            .collect();
        let unmatched = rows.iter().filter(|row| row.tokens.is_empty()).count();
        sort_by_distance(&mut rows, |row| row.distance);
        debug!(rows = rows.len(), unmatched, score = response.score, "embedding scored");

        Ok(ScoreRecord {
            value: response.score,
            scorer_type: ScorerType::Embedding,
            scorer_model: EMBEDDING_MODEL_NAME.to_string(),
            breakdown: ScoreBreakdown::Embedding(rows),
        })
    }
}
