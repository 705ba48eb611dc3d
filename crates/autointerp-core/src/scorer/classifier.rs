//! Fuzz and detection scoring through the batched scoring service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::quantile::{invert_distance, sort_by_distance};
use super::service::{
    BareActivation, ClassifierMode, ClassifierOutput, FuzzDetectionRequest, ScoringService,
};
use super::{ScoreBreakdown, ScoreRecord, Scorer, ScorerType};
use crate::error::{AutointerpError, Result};
use crate::llm::{Credential, ModelDescriptor};
use crate::sample::SamplePartitions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRow {
    pub text: String,
    pub str_tokens: Vec<String>,
    pub activations: Vec<f64>,
    /// Inverted quantile distance, `-1` for excluded samples.
    pub distance: f64,
    pub ground_truth: bool,
    pub prediction: bool,
    pub highlighted: bool,
    pub correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

impl ClassifierRow {
    /// `None` for rows the service could not judge.
    fn from_output(output: ClassifierOutput) -> Option<Self> {
        let prediction = output.prediction?;
        Some(Self {
            text: output.str_tokens.concat(),
            str_tokens: output.str_tokens,
            activations: output.activations,
            distance: invert_distance(output.distance),
            ground_truth: output.ground_truth,
            prediction,
            highlighted: output.highlighted,
            correct: output.correct,
            probability: output.probability,
        })
    }
}

pub struct ClassifierScorer {
    mode: ClassifierMode,
    service: Arc<dyn ScoringService>,
}

impl ClassifierScorer {
    pub fn fuzz(service: Arc<dyn ScoringService>) -> Self {
        Self {
            mode: ClassifierMode::Fuzz,
            service,
        }
    }

    pub fn detection(service: Arc<dyn ScoringService>) -> Self {
        Self {
            mode: ClassifierMode::Detection,
            service,
        }
    }

    pub fn mode(&self) -> ClassifierMode {
        self.mode
    }
}

#[async_trait]
impl Scorer for ClassifierScorer {
    fn scorer_type(&self) -> ScorerType {
        match self.mode {
            ClassifierMode::Fuzz => ScorerType::Fuzz,
            ClassifierMode::Detection => ScorerType::Detection,
        }
    }

    #[instrument(skip_all, fields(mode = ?self.mode, model = %model.name))]
    async fn score(
        &self,
        explanation: &str,
        partitions: &SamplePartitions,
        model: &ModelDescriptor,
        credential: &Credential,
    ) -> Result<ScoreRecord> {
        if !credential.kind().is_aggregator() {
            return Err(AutointerpError::credential("OpenRouter"));
        }
        let aggregator_id = model.aggregator_id.clone().ok_or_else(|| {
            AutointerpError::unsupported(format!(
                "model `{}` has no OpenRouter id for {} scoring",
                model.name,
                self.scorer_type()
            ))
        })?;
        partitions.validate()?;

        let request = FuzzDetectionRequest {
            mode: self.mode,
            activations: partitions.feature_samples().map(BareActivation::from).collect(),
            explanation: explanation.to_string(),
            model: aggregator_id,
            openrouter_key: credential.key().to_string(),
        };
        let response = self.service.fuzz_detection(&request).await?;

        let received = response.breakdown.len();
        let mut rows: Vec<ClassifierRow> = response
            .breakdown
            .into_iter()
            .filter_map(ClassifierRow::from_output)
            .collect();
        sort_by_distance(&mut rows, |row| row.distance);
        debug!(received, kept = rows.len(), score = response.score, "classifier scored");

        Ok(ScoreRecord {
            value: response.score,
            scorer_type: self.scorer_type(),
            scorer_model: model.name.clone(),
            breakdown: ScoreBreakdown::Classifier(rows),
        })
    }
}
