//! Recall scoring: one LLM judgment per sample, run concurrently.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::verdict::{parse_verdict, JudgeVerdict};
use super::{ScoreBreakdown, ScoreRecord, Scorer, ScorerType};
use crate::error::{AutointerpError, Result};
use crate::llm::{BackendConnector, ChatBackend, CompletionParams, Credential, ModelDescriptor};
use crate::prompt::judge;
use crate::sample::{ActivationSample, SamplePartitions};

const REASON_EMPTY: &str = "Errored";
const REASON_MALFORMED: &str = "Invalid JSON response";
const REASON_FAILED: &str = "Error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub tokens: Vec<String>,
    pub values: Vec<f64>,
    #[serde(rename = "match")]
    pub matched: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecallBreakdown {
    pub top: Vec<RecallRow>,
    pub zero: Vec<RecallRow>,
    pub decoy: Vec<RecallRow>,
}

impl RecallBreakdown {
    /// Judgments that agree with the partition's expectation.
    pub fn correct(&self) -> usize {
        self.top.iter().filter(|row| row.matched).count()
            + self
                .zero
                .iter()
                .chain(self.decoy.iter())
                .filter(|row| !row.matched)
                .count()
    }

    pub fn total(&self) -> usize {
        self.top.len() + self.zero.len() + self.decoy.len()
    }

    pub fn score(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.correct() as f64 / total as f64,
        }
    }
}

/// One judged sample plus the transport error, if the call never produced a response.
struct Judgment {
    verdict: JudgeVerdict,
    failure: Option<AutointerpError>,
}

pub struct RecallScorer {
    connector: Arc<dyn BackendConnector>,
}

impl RecallScorer {
    pub fn new(connector: Arc<dyn BackendConnector>) -> Self {
        Self { connector }
    }

    /// Score against a backend the caller already holds.
    pub async fn score_with(
        &self,
        backend: &dyn ChatBackend,
        explanation: &str,
        partitions: &SamplePartitions,
        model: &ModelDescriptor,
    ) -> Result<ScoreRecord> {
        partitions.validate()?;

        let samples: Vec<&ActivationSample> = partitions
            .top
            .iter()
            .chain(partitions.zero.iter())
            .chain(partitions.decoy.iter())
            .collect();
        let mut judgments = join_all(
            samples
                .iter()
                .map(|sample| judge_or_default(backend, sample, explanation)),
        )
        .await;

        if !judgments.is_empty() && judgments.iter().all(|j| j.failure.is_some()) {
            warn!(calls = judgments.len(), "every recall judgment failed");
            if let Some(err) = judgments.swap_remove(0).failure {
                return Err(err);
            }
        }

        let mut rows = samples
            .iter()
            .zip(judgments)
            .map(|(sample, judgment)| RecallRow {
                id: sample.id.clone(),
                tokens: sample.tokens.clone(),
                values: sample.values.clone(),
                matched: judgment.verdict.matched,
                reason: judgment.verdict.reason,
            });
        let breakdown = RecallBreakdown {
            top: rows.by_ref().take(partitions.top.len()).collect(),
            zero: rows.by_ref().take(partitions.zero.len()).collect(),
            decoy: rows.collect(),
        };

        let value = breakdown.score();
        debug!(
            correct = breakdown.correct(),
            total = breakdown.total(),
            value,
            "recall scored"
        );
        Ok(ScoreRecord {
            value,
            scorer_type: ScorerType::Recall,
            scorer_model: model.name.clone(),
            breakdown: ScoreBreakdown::Recall(breakdown),
        })
    }
}

#[async_trait]
impl Scorer for RecallScorer {
    fn scorer_type(&self) -> ScorerType {
        ScorerType::Recall
    }

    #[instrument(skip_all, fields(model = %model.name, samples = partitions.total()))]
    async fn score(
        &self,
        explanation: &str,
        partitions: &SamplePartitions,
        model: &ModelDescriptor,
        credential: &Credential,
    ) -> Result<ScoreRecord> {
        let backend = self.connector.connect(model, credential)?;
        self.score_with(backend.as_ref(), explanation, partitions, model)
            .await
    }
}

/// Ask the judge about one sample. Any failure becomes a negative judgment.
async fn judge_or_default(
    backend: &dyn ChatBackend,
    sample: &ActivationSample,
    explanation: &str,
) -> Judgment {
    let conversation = judge::render(sample, explanation);
    let reply = backend
        .send(&conversation.system, &conversation.turns, &CompletionParams::judge())
        .await;

    match reply {
        Ok(content) if content.trim().is_empty() => negative(REASON_EMPTY, None),
        Ok(content) => match parse_verdict(&content) {
            Ok(verdict) => Judgment {
                verdict,
                failure: None,
            },
            Err(err) => {
                debug!(error = %err, "judge reply was not valid JSON");
                negative(REASON_MALFORMED, None)
            }
        },
        Err(err) => {
            warn!(error = %err, "judge call failed");
            negative(REASON_FAILED, Some(err))
        }
    }
}

fn negative(reason: &str, failure: Option<AutointerpError>) -> Judgment {
    Judgment {
        verdict: JudgeVerdict {
            matched: false,
            reason: reason.to_string(),
        },
        failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoy::decoy_samples;
    use crate::llm::{KeyKind, Provider};
    use crate::prompt::Turn;
    use proptest::prelude::*;

    /// Replies by looking at the tokens of the sample in the open turn.
    struct StubJudge {
        reply: Box<dyn Fn(&str) -> Result<String> + Send + Sync>,
    }

    #[async_trait]
    impl ChatBackend for StubJudge {
        fn provider(&self) -> Provider {
            Provider::OpenAi
        }

        async fn send(
            &self,
            _system: &str,
            turns: &[Turn],
            params: &CompletionParams,
        ) -> Result<String> {
            assert!(params.json_response);
            let open = turns.last().map(|turn| turn.content.as_str()).unwrap_or("");
            (self.reply)(open)
        }
    }

    struct StubConnector(Arc<StubJudge>);

    impl BackendConnector for StubConnector {
        fn connect(
            &self,
            _model: &ModelDescriptor,
            _credential: &Credential,
        ) -> Result<Arc<dyn ChatBackend>> {
            Ok(self.0.clone())
        }
    }

    fn judge(reply: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Arc<StubJudge> {
        Arc::new(StubJudge {
            reply: Box::new(reply),
        })
    }

    fn sample(id: &str, word: &str) -> ActivationSample {
        ActivationSample::new(vec![" the".into(), word.into()], vec![0.0, 5.0])
            .unwrap()
            .with_id(id)
    }

    /// Two cat samples on top, one dog sample in zero. The explanation never names a cat so
    /// the stub only sees sample tokens.
    fn partitions() -> SamplePartitions {
        SamplePartitions::new(
            vec![sample("t1", " cat"), sample("t2", " kitten")],
            vec![sample("z1", " dog")],
        )
    }

    fn cat_judge(open: &str) -> Result<String> {
        let matched = open.contains("cat") || open.contains("kitten");
        Ok(format!(r#"{{"match": {matched}, "reason": "checked"}}"#))
    }

    async fn score(stub: Arc<StubJudge>, partitions: &SamplePartitions) -> Result<ScoreRecord> {
        RecallScorer::new(Arc::new(StubConnector(stub)))
            .score(
                "felines",
                partitions,
                &ModelDescriptor::new("gpt-4o-mini"),
                &Credential::new(KeyKind::OpenAi, "k"),
            )
            .await
    }

    fn breakdown(record: &ScoreRecord) -> &RecallBreakdown {
        match &record.breakdown {
            ScoreBreakdown::Recall(rows) => rows,
            other => panic!("unexpected breakdown {other:?}"),
        }
    }

    #[tokio::test]
    async fn perfect_judgments_score_one() {
        let partitions = partitions();
        assert_eq!(partitions.decoy.len(), 5);
        let record = score(judge(cat_judge), &partitions).await.unwrap();
        assert_eq!(record.value, 1.0);
        assert_eq!(record.scorer_type, ScorerType::Recall);
        assert_eq!(record.scorer_model, "gpt-4o-mini");
        let rows = breakdown(&record);
        assert_eq!(rows.total(), 8);
        assert_eq!(rows.top[0].id.as_deref(), Some("t1"));
        assert_eq!(rows.zero[0].tokens, vec![" the", " dog"]);
    }

    #[tokio::test]
    async fn one_wrong_decoy_scores_seven_eighths() {
        let flagged = decoy_samples()[2].tokens[5].clone();
        let stub = judge(move |open| {
            if open.contains(flagged.trim()) {
                Ok(r#"{"match": true, "reason": "looks related"}"#.into())
            } else {
                cat_judge(open)
            }
        });
        let record = score(stub, &partitions()).await.unwrap();
        assert_eq!(record.value, 0.875);
        let rows = breakdown(&record);
        assert!(rows.decoy[2].matched);
        assert_eq!(rows.decoy[2].id, decoy_samples()[2].id);
        assert_eq!(rows.decoy.iter().filter(|row| row.matched).count(), 1);
    }

    #[tokio::test]
    async fn malformed_and_empty_replies_are_negative() {
        let stub = judge(|open| {
            if open.contains("kitten") {
                Ok("sure, it matches".into())
            } else if open.contains("cat") {
                Ok(String::new())
            } else {
                cat_judge(open)
            }
        });
        let record = score(stub, &partitions()).await.unwrap();
        let rows = breakdown(&record);
        assert!(!rows.top[0].matched);
        assert_eq!(rows.top[0].reason, REASON_EMPTY);
        assert!(!rows.top[1].matched);
        assert_eq!(rows.top[1].reason, REASON_MALFORMED);
        assert_eq!(record.value, 6.0 / 8.0);
    }

    #[tokio::test]
    async fn single_transport_failure_is_downgraded() {
        let stub = judge(|open| {
            if open.contains("dog") {
                Err(AutointerpError::status(
                    "OpenAI",
                    reqwest::StatusCode::BAD_GATEWAY,
                ))
            } else {
                cat_judge(open)
            }
        });
        let record = score(stub, &partitions()).await.unwrap();
        let rows = breakdown(&record);
        assert_eq!(rows.zero[0].reason, REASON_FAILED);
        assert_eq!(record.value, 1.0);
    }

    #[tokio::test]
    async fn all_transport_failures_raise_provider_error() {
        let stub = judge(|_| {
            Err(AutointerpError::status(
                "OpenAI",
                reqwest::StatusCode::UNAUTHORIZED,
            ))
        });
        let err = score(stub, &partitions()).await.unwrap_err();
        assert!(matches!(err, AutointerpError::Provider { status: Some(401), .. }));
    }

    #[tokio::test]
    async fn decoys_alone_give_defined_score() {
        let partitions = SamplePartitions::new(Vec::new(), Vec::new());
        let record = score(judge(cat_judge), &partitions).await.unwrap();
        assert_eq!(breakdown(&record).total(), 5);
        assert_eq!(record.value, 1.0);
    }

    #[tokio::test]
    async fn invalid_partition_is_rejected_before_judging() {
        let mut partitions = partitions();
        partitions.zero[0].values.pop();
        let stub = judge(|open| panic!("judged a sample of an invalid partition: {open}"));
        let err = score(stub, &partitions).await.unwrap_err();
        assert!(matches!(err, AutointerpError::InvalidSample { .. }));
    }

    proptest! {
        #[test]
        fn score_stays_in_unit_interval(
            top in proptest::collection::vec(any::<bool>(), 0..6),
            zero in proptest::collection::vec(any::<bool>(), 0..6),
            decoy in proptest::collection::vec(any::<bool>(), 0..6),
        ) {
            let row = |matched: &bool| RecallRow {
                id: None,
                tokens: Vec::new(),
                values: Vec::new(),
                matched: *matched,
                reason: String::new(),
            };
            let breakdown = RecallBreakdown {
                top: top.iter().map(row).collect(),
                zero: zero.iter().map(row).collect(),
                decoy: decoy.iter().map(row).collect(),
            };
            let value = breakdown.score();
            prop_assert!((0.0..=1.0).contains(&value));
            let perfect = top.iter().all(|m| *m) && zero.iter().chain(decoy.iter()).all(|m| !*m);
            if breakdown.total() > 0 {
                prop_assert_eq!(value == 1.0, perfect);
            }
        }
    }
}
