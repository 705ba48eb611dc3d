//! Score orchestration: at most one score per (scorer type, scorer model) and explanation.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::error::{AutointerpError, Result};
use crate::llm::{Credential, ModelDescriptor};
use crate::sample::{ExplanationCandidate, SamplePartitions};
use crate::scorer::{ScoreRecord, Scorer, ScorerType, EMBEDDING_MODEL_NAME};

/// Persistence for score records, keyed by explanation id.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn scores_for(&self, explanation_id: &str) -> Result<Vec<ScoreRecord>>;

    /// Store `record` unless the explanation already holds one for the same scorer type and
    /// model, in which case nothing changes and `DuplicateScore` is returned.
    async fn insert_if_absent(&self, explanation_id: &str, record: ScoreRecord) -> Result<()>;
}

fn find_duplicate(
    records: &[ScoreRecord],
    scorer_type: ScorerType,
    scorer_model: &str,
) -> Option<AutointerpError> {
    records
        .iter()
        .any(|r| r.scorer_type == scorer_type && r.scorer_model == scorer_model)
        .then(|| AutointerpError::DuplicateScore {
            scorer_type,
            scorer_model: scorer_model.to_string(),
        })
}

#[derive(Debug, Default)]
pub struct InMemoryScoreStore {
    records: RwLock<HashMap<String, Vec<ScoreRecord>>>,
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScoreStore for InMemoryScoreStore {
    async fn scores_for(&self, explanation_id: &str) -> Result<Vec<ScoreRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(explanation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_if_absent(&self, explanation_id: &str, record: ScoreRecord) -> Result<()> {
        let mut records = self.records.write().await;
        let stored = records.entry(explanation_id.to_string()).or_default();
        if let Some(err) = find_duplicate(stored, record.scorer_type, &record.scorer_model) {
            return Err(err);
        }
        stored.push(record);
        Ok(())
    }
}

/// What to score an explanation with.
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub scorer_type: ScorerType,
    pub model: ModelDescriptor,
    pub credential: Credential,
    pub partitions: SamplePartitions,
}

impl ScoreRequest {
    /// The model name the resulting record will carry.
    pub fn scorer_model(&self) -> &str {
        match self.scorer_type {
            ScorerType::Embedding => EMBEDDING_MODEL_NAME,
            _ => &self.model.name,
        }
    }
}

pub struct ScoreAggregator<S> {
    store: S,
    scorers: BTreeMap<ScorerType, Arc<dyn Scorer>>,
}

impl<S: ScoreStore> ScoreAggregator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            scorers: BTreeMap::new(),
        }
    }

    /// Register a scorer under its own type, replacing any earlier one.
    pub fn register(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorers.insert(scorer.scorer_type(), scorer);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registered(&self) -> impl Iterator<Item = ScorerType> + '_ {
        self.scorers.keys().copied()
    }

    /// Score `candidate` and persist the record. Nothing is stored when scoring fails.
    #[instrument(
        skip(self, candidate, request),
        fields(scorer = %request.scorer_type, model = %request.scorer_model())
    )]
    pub async fn score(
        &self,
        explanation_id: &str,
        candidate: &ExplanationCandidate,
        request: &ScoreRequest,
    ) -> Result<ScoreRecord> {
        let scorer_model = request.scorer_model();
        let existing = self.store.scores_for(explanation_id).await?;
        if let Some(err) = find_duplicate(&existing, request.scorer_type, scorer_model) {
            return Err(err);
        }

        let scorer = self.scorers.get(&request.scorer_type).ok_or_else(|| {
            AutointerpError::unsupported(format!(
                "no scorer registered for `{}`",
                request.scorer_type
            ))
        })?;

        let record = scorer
            .score(
                &candidate.description,
                &request.partitions,
                &request.model,
                &request.credential,
            )
            .await?;
        // A concurrent request for the same pair may have finished while this one was scoring.
        self.store
            .insert_if_absent(explanation_id, record.clone())
            .await?;
        info!(value = record.value, "score recorded");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::KeyKind;
    use crate::sample::ExplanationStrategy;
    use crate::scorer::{RecallBreakdown, ScoreBreakdown};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingScorer {
        kind: ScorerType,
        calls: AtomicUsize,
        fail: bool,
        delay: Option<std::time::Duration>,
    }

    impl CountingScorer {
        fn new(kind: ScorerType) -> Arc<Self> {
            Arc::new(Self {
                kind,
                calls: AtomicUsize::new(0),
                fail: false,
                delay: None,
            })
        }

        fn slow(kind: ScorerType, millis: u64) -> Arc<Self> {
            Arc::new(Self {
                kind,
                calls: AtomicUsize::new(0),
                fail: false,
                delay: Some(std::time::Duration::from_millis(millis)),
            })
        }

        fn failing(kind: ScorerType) -> Arc<Self> {
            Arc::new(Self {
                kind,
                calls: AtomicUsize::new(0),
                fail: true,
                delay: None,
            })
        }
    }

    #[async_trait]
    impl Scorer for CountingScorer {
        fn scorer_type(&self) -> ScorerType {
            self.kind
        }

        async fn score(
            &self,
            _explanation: &str,
            _partitions: &SamplePartitions,
            model: &ModelDescriptor,
            _credential: &Credential,
        ) -> Result<ScoreRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(AutointerpError::status(
                    "scoring service",
                    reqwest::StatusCode::SERVICE_UNAVAILABLE,
                ));
            }
            let scorer_model = match self.kind {
                ScorerType::Embedding => EMBEDDING_MODEL_NAME.to_string(),
                _ => model.name.clone(),
            };
            Ok(ScoreRecord {
                value: 0.75,
                scorer_type: self.kind,
                scorer_model,
                breakdown: ScoreBreakdown::Recall(RecallBreakdown::default()),
            })
        }
    }

    fn candidate() -> ExplanationCandidate {
        ExplanationCandidate {
            description: "cats".into(),
            strategy: ExplanationStrategy::TokenActivationPair.into(),
            model_name: "gpt-4o".into(),
        }
    }

    fn request(scorer_type: ScorerType, model: &str) -> ScoreRequest {
        ScoreRequest {
            scorer_type,
            model: ModelDescriptor::new(model),
            credential: Credential::new(KeyKind::OpenAi, "k"),
            partitions: SamplePartitions::new(Vec::new(), Vec::new()),
        }
    }

    #[tokio::test]
    async fn second_score_for_same_pair_is_duplicate() {
        let recall = CountingScorer::new(ScorerType::Recall);
        let aggregator = ScoreAggregator::new(InMemoryScoreStore::new()).register(recall.clone());

        let first = aggregator
            .score("e1", &candidate(), &request(ScorerType::Recall, "gpt-4o-mini"))
            .await
            .unwrap();
        assert_eq!(first.value, 0.75);

        let err = aggregator
            .score("e1", &candidate(), &request(ScorerType::Recall, "gpt-4o-mini"))
            .await
            .unwrap_err();
        assert!(matches!(err, AutointerpError::DuplicateScore { .. }));
        assert_eq!(recall.calls.load(Ordering::SeqCst), 1);
        assert_eq!(aggregator.store().scores_for("e1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_scores_for_same_pair_store_one_record() {
        let recall = CountingScorer::slow(ScorerType::Recall, 50);
        let aggregator = ScoreAggregator::new(InMemoryScoreStore::new()).register(recall.clone());
        let candidate = candidate();
        let request = request(ScorerType::Recall, "gpt-4o-mini");

        let (a, b) = tokio::join!(
            aggregator.score("e1", &candidate, &request),
            aggregator.score("e1", &candidate, &request),
        );
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(AutointerpError::DuplicateScore { .. })))
                .count(),
            1
        );
        assert_eq!(recall.calls.load(Ordering::SeqCst), 2);
        assert_eq!(aggregator.store().scores_for("e1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn store_rejects_duplicate_insert() {
        let store = InMemoryScoreStore::new();
        let record = ScoreRecord {
            value: 0.5,
            scorer_type: ScorerType::Fuzz,
            scorer_model: "gpt-4o-mini".into(),
            breakdown: ScoreBreakdown::Classifier(Vec::new()),
        };
        store.insert_if_absent("e1", record.clone()).await.unwrap();
        let err = store.insert_if_absent("e1", record.clone()).await.unwrap_err();
        assert!(matches!(err, AutointerpError::DuplicateScore { scorer_type: ScorerType::Fuzz, .. }));
        store.insert_if_absent("e2", record).await.unwrap();
        assert_eq!(store.scores_for("e1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn other_model_or_explanation_is_not_duplicate() {
        let aggregator = ScoreAggregator::new(InMemoryScoreStore::new())
            .register(CountingScorer::new(ScorerType::Recall));
        for (id, model) in [("e1", "gpt-4o-mini"), ("e1", "claude-3-haiku"), ("e2", "gpt-4o-mini")] {
            aggregator
                .score(id, &candidate(), &request(ScorerType::Recall, model))
                .await
                .unwrap();
        }
        assert_eq!(aggregator.store().scores_for("e1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn embedding_duplicates_ignore_requested_model() {
        let aggregator = ScoreAggregator::new(InMemoryScoreStore::new())
            .register(CountingScorer::new(ScorerType::Embedding));
        aggregator
            .score("e1", &candidate(), &request(ScorerType::Embedding, "a"))
            .await
            .unwrap();
        let err = aggregator
            .score("e1", &candidate(), &request(ScorerType::Embedding, "b"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AutointerpError::DuplicateScore { ref scorer_model, .. } if scorer_model == EMBEDDING_MODEL_NAME
        ));
    }

    #[tokio::test]
    async fn failed_scoring_persists_nothing() {
        let aggregator = ScoreAggregator::new(InMemoryScoreStore::new())
            .register(CountingScorer::failing(ScorerType::Fuzz));
        let err = aggregator
            .score("e1", &candidate(), &request(ScorerType::Fuzz, "gpt-4o-mini"))
            .await
            .unwrap_err();
        assert!(err.is_provider());
        assert!(aggregator.store().scores_for("e1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unregistered_type_is_unsupported() {
        let aggregator = ScoreAggregator::new(InMemoryScoreStore::new())
            .register(CountingScorer::new(ScorerType::Recall));
        assert_eq!(aggregator.registered().collect::<Vec<_>>(), vec![ScorerType::Recall]);
        let err = aggregator
            .score("e1", &candidate(), &request(ScorerType::Detection, "gpt-4o-mini"))
            .await
            .unwrap_err();
        assert!(matches!(err, AutointerpError::UnsupportedCombination { .. }));
    }
}
