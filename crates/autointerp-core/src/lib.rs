pub mod aggregator;
pub mod decoy;
pub mod error;
pub mod explainer;
pub mod llm;
pub mod prompt;
pub mod remote_explainer;
pub mod report;
pub mod sample;
pub mod scorer;
pub mod select;

pub use aggregator::{InMemoryScoreStore, ScoreAggregator, ScoreRequest, ScoreStore};
pub use error::{AutointerpError, Result};
pub use explainer::Explainer;
pub use llm::{
    BackendConnector, ChatBackend, ClientSettings, Credential, Credentials, HttpConnector,
    KeyKind, ModelCatalog, ModelDescriptor,
};
pub use prompt::{Conversation, ExplainerInput, Role, Turn};
pub use remote_explainer::RemoteExplainer;
pub use report::{render_score, OutputFormat};
pub use sample::{
    ActivationSample, ExplanationCandidate, ExplanationStrategy, ExplanationType, SamplePartitions,
};
pub use scorer::{
    ClassifierScorer, EmbeddingScorer, RecallScorer, RemoteScoringService, ScoreBreakdown,
    ScoreRecord, Scorer, ScorerType, ScoringService,
};
