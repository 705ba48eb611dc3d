//! Explanations written by the scoring service's own explainer from a feature's strongest samples.

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{AutointerpError, Result};
use crate::explainer::non_empty;
use crate::llm::{Credential, ModelDescriptor};
use crate::sample::{ActivationSample, ExplanationCandidate, ExplanationType};
use crate::scorer::service::{BareActivation, ExplainRequest, ScoringService};
use crate::select::{strongest_samples, REMOTE_EXPLAIN_LIMIT};

pub struct RemoteExplainer {
    service: Arc<dyn ScoringService>,
}

impl RemoteExplainer {
    pub fn new(service: Arc<dyn ScoringService>) -> Self {
        Self { service }
    }

    /// Explain the feature behind `pool`. Only an aggregator key and a model with an
    /// aggregator id are accepted, since the service calls the model through the aggregator.
    #[instrument(skip_all, fields(model = %model.name, pool = pool.len()))]
    pub async fn explain(
        &self,
        pool: &[ActivationSample],
        model: &ModelDescriptor,
        credential: &Credential,
    ) -> Result<ExplanationCandidate> {
        if !credential.kind().is_aggregator() {
            return Err(AutointerpError::credential("OpenRouter"));
        }
        let aggregator_id = model.aggregator_id.clone().ok_or_else(|| {
            AutointerpError::unsupported(format!(
                "model `{}` has no OpenRouter id for {} explanations",
                model.name,
                ExplanationType::ActsTop20
            ))
        })?;

        let samples = strongest_samples(pool, REMOTE_EXPLAIN_LIMIT);
        if samples.is_empty() {
            return Err(AutointerpError::InvalidSample {
                detail: "no activations found for this feature".into(),
            });
        }
        samples.iter().try_for_each(ActivationSample::validate)?;

        let request = ExplainRequest {
            activations: samples.iter().map(BareActivation::from).collect(),
            openrouter_key: credential.key().to_string(),
            model: aggregator_id,
        };
        let response = self.service.explain_default(&request).await?;
        debug!(samples = request.activations.len(), "service explanation received");

        Ok(ExplanationCandidate {
            description: non_empty(&response.explanation)?,
            strategy: ExplanationType::ActsTop20,
            model_name: model.name.clone(),
        })
    }
}
