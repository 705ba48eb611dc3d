//! Explainer gateway: render the strategy's prompt, send it to one backend, clean the reply.

use aho_corasick::AhoCorasick;
use anyhow::Context;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::{AutointerpError, Result};
use crate::llm::{
    BackendConnector, ChatBackend, CompletionParams, Credential, ModelCatalog, ModelDescriptor,
};
use crate::prompt::{self, ExplainerInput};
use crate::sample::{ExplanationCandidate, ExplanationStrategy};

const EXPLANATION_MARKER: &str = "explanation:";
const SCAFFOLD_MARKERS: [&str; 5] = ["method 1", "method 2", "method 3", "method 4", "method 5"];

/// Case-insensitive matchers for the max-logit reply format.
#[derive(Debug, Clone)]
struct ReplyCleaner {
    marker: AhoCorasick,
    scaffold: AhoCorasick,
}

impl ReplyCleaner {
    fn new() -> anyhow::Result<Self> {
        let marker = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build([EXPLANATION_MARKER])
            .context("failed to build explanation marker automaton")?;
        let scaffold = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(SCAFFOLD_MARKERS)
            .context("failed to build scaffold marker automaton")?;
        Ok(Self { marker, scaffold })
    }

    /// Strip a trailing period, keep what follows the last `Explanation:` marker, refuse
    /// method-numbering leftovers.
    fn max_logit(&self, raw: &str) -> Result<String> {
        let mut text = raw.trim();
        text = text.strip_suffix('.').unwrap_or(text);
        if let Some(last) = self.marker.find_iter(text).last() {
            text = &text[last.end()..];
        }
        if let Some(found) = self.scaffold.find(text) {
            let marker = SCAFFOLD_MARKERS[found.pattern().as_usize()];
            warn!(marker, "max-logit reply still contains method scaffolding");
            return Err(AutointerpError::ScaffoldLeak {
                marker: marker.to_string(),
            });
        }
        non_empty(text)
    }
}

pub(crate) fn non_empty(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AutointerpError::EmptyExplanation);
    }
    Ok(text.to_string())
}

/// Generates [`ExplanationCandidate`]s. Holds no per-call state; credentials and models are
/// passed to every call.
pub struct Explainer {
    connector: Arc<dyn BackendConnector>,
    catalog: Arc<ModelCatalog>,
    cleaner: ReplyCleaner,
}

impl Explainer {
    pub fn new(
        connector: Arc<dyn BackendConnector>,
        catalog: Arc<ModelCatalog>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            connector,
            catalog,
            cleaner: ReplyCleaner::new()?,
        })
    }

    /// Connect to the backend for `model` and generate one explanation.
    #[instrument(skip(self, input, model, credential), fields(model = %model.name))]
    pub async fn generate(
        &self,
        strategy: ExplanationStrategy,
        input: &ExplainerInput,
        model: &ModelDescriptor,
        credential: &Credential,
    ) -> Result<ExplanationCandidate> {
        if !self.catalog.capabilities(&model.name).supports(strategy) {
            return Err(AutointerpError::unsupported(format!(
                "model `{}` does not support the `{strategy}` strategy",
                model.name
            )));
        }
        let backend = self.connector.connect(model, credential)?;
        self.generate_with(backend.as_ref(), strategy, input, model)
            .await
    }

    /// Generate with a backend the caller already holds.
    pub async fn generate_with(
        &self,
        backend: &dyn ChatBackend,
        strategy: ExplanationStrategy,
        input: &ExplainerInput,
        model: &ModelDescriptor,
    ) -> Result<ExplanationCandidate> {
        if input.samples.is_empty() {
            return Err(AutointerpError::InvalidSample {
                detail: "no samples to explain".into(),
            });
        }
        input
            .samples
            .iter()
            .try_for_each(|sample| sample.validate())?;

        let mut conversation = prompt::render(strategy, input);
        if self.catalog.is_reasoning(&model.name) {
            debug!("appending reasoning directive");
            conversation.append_to_last_turn(prompt::reasoning_directive(strategy));
        }

        let params = CompletionParams::explanation(strategy, backend.provider());
        let raw = backend
            .send(&conversation.system, &conversation.turns, &params)
            .await?;
        debug!(chars = raw.len(), "received explanation");

        let description = self.postprocess(strategy, &raw)?;
        Ok(ExplanationCandidate {
            description,
            strategy: strategy.into(),
            model_name: model.name.clone(),
        })
    }

    /// Turn a raw completion into the explanation text.
    pub fn postprocess(&self, strategy: ExplanationStrategy, raw: &str) -> Result<String> {
        match strategy {
            ExplanationStrategy::MaxLogit => self.cleaner.max_logit(raw),
            ExplanationStrategy::TokenActivationPair | ExplanationStrategy::AttentionPair => {
                non_empty(raw)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{KeyKind, Provider};
    use crate::prompt::{Role, Turn};
    use crate::sample::ActivationSample;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedBackend {
        provider: Provider,
        reply: String,
        seen: Mutex<Vec<(String, Vec<Turn>, CompletionParams)>>,
    }

    impl ScriptedBackend {
        fn new(provider: Provider, reply: &str) -> Self {
            Self {
                provider,
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn send(
            &self,
            system: &str,
            turns: &[Turn],
            params: &CompletionParams,
        ) -> Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push((system.to_string(), turns.to_vec(), params.clone()));
            Ok(self.reply.clone())
        }
    }

    struct ScriptedConnector(Arc<ScriptedBackend>);

    impl BackendConnector for ScriptedConnector {
        fn connect(
            &self,
            _model: &ModelDescriptor,
            _credential: &Credential,
        ) -> Result<Arc<dyn ChatBackend>> {
            Ok(self.0.clone())
        }
    }

    fn explainer(backend: Arc<ScriptedBackend>) -> Explainer {
        Explainer::new(
            Arc::new(ScriptedConnector(backend)),
            ModelCatalog::builtin().unwrap(),
        )
        .unwrap()
    }

    fn input() -> ExplainerInput {
        ExplainerInput::new(vec![ActivationSample::new(
            vec!["the".into(), " cat".into()],
            vec![0.0, 10.0],
        )
        .unwrap()])
    }

    fn cleaner() -> ReplyCleaner {
        ReplyCleaner::new().unwrap()
    }

    #[test]
    fn max_logit_keeps_text_after_last_marker() {
        let raw = "Method 1 fails.\nMethod 2 succeeds: they start with w. Explanation: say \"w\" words.";
        assert_eq!(cleaner().max_logit(raw).unwrap(), "say \"w\" words");
    }

    #[test]
    fn max_logit_marker_is_case_insensitive() {
        assert_eq!(cleaner().max_logit("so the explanation: fruits").unwrap(), "fruits");
        assert_eq!(cleaner().max_logit("EXPLANATION:   4 ").unwrap(), "4");
    }

    #[test]
    fn max_logit_rejects_method_leak() {
        let err = cleaner()
            .max_logit("Method 3 succeeds: the number four")
            .unwrap_err();
        assert!(matches!(err, AutointerpError::ScaffoldLeak { ref marker } if marker == "method 3"));
    }

    #[test]
    fn max_logit_empty_after_marker_is_error() {
        let err = cleaner().max_logit("Explanation: .").unwrap_err();
        assert!(matches!(err, AutointerpError::EmptyExplanation));
    }

    #[tokio::test]
    async fn reasoning_models_get_directive_on_open_turn() {
        let backend = Arc::new(ScriptedBackend::new(Provider::OpenAi, " cats"));
        let explainer = explainer(backend.clone());
        let candidate = explainer
            .generate(
                ExplanationStrategy::TokenActivationPair,
                &input(),
                &ModelDescriptor::new("o3-mini"),
                &Credential::new(KeyKind::OpenAi, "k"),
            )
            .await
            .unwrap();
        assert_eq!(candidate.description, "cats");
        assert_eq!(candidate.model_name, "o3-mini");

        let seen = backend.seen.lock().unwrap();
        let (_, turns, params) = &seen[0];
        let last = turns.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last
            .content
            .ends_with(prompt::reasoning_directive(ExplanationStrategy::TokenActivationPair)));
        assert_eq!(params.max_tokens, Some(4096));
    }

    #[tokio::test]
    async fn plain_models_get_unmodified_prompt() {
        let backend = Arc::new(ScriptedBackend::new(Provider::Anthropic, "cats"));
        let explainer = explainer(backend.clone());
        explainer
            .generate_with(
                backend.as_ref(),
                ExplanationStrategy::TokenActivationPair,
                &input(),
                &ModelDescriptor::new("claude-3-haiku"),
            )
            .await
            .unwrap();
        let seen = backend.seen.lock().unwrap();
        let expected = prompt::render(ExplanationStrategy::TokenActivationPair, &input());
        assert_eq!(seen[0].1, expected.turns);
        assert_eq!(seen[0].2.max_tokens, Some(60));
    }

    #[tokio::test]
    async fn empty_reply_is_empty_explanation() {
        let backend = Arc::new(ScriptedBackend::new(Provider::OpenRouter, "   "));
        let err = explainer(backend.clone())
            .generate_with(
                backend.as_ref(),
                ExplanationStrategy::AttentionPair,
                &input(),
                &ModelDescriptor::new("llama"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AutointerpError::EmptyExplanation));
    }

    #[tokio::test]
    async fn invalid_samples_never_reach_backend() {
        let backend = Arc::new(ScriptedBackend::new(Provider::OpenAi, "cats"));
        let bad = ExplainerInput::new(vec![ActivationSample {
            id: None,
            tokens: vec!["a".into()],
            values: vec![],
            dfa_values: None,
            dfa_target_index: None,
        }]);
        let err = explainer(backend.clone())
            .generate_with(
                backend.as_ref(),
                ExplanationStrategy::TokenActivationPair,
                &bad,
                &ModelDescriptor::new("gpt-4o"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AutointerpError::InvalidSample { .. }));
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn attention_target_past_the_sample_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new(Provider::OpenAi, "cats"));
        let sample = ActivationSample::new(vec!["a".into(), "b".into()], vec![0.0, 1.0])
            .unwrap()
            .with_attention(vec![0.5, 0.5], 5);
        let err = explainer(backend.clone())
            .generate_with(
                backend.as_ref(),
                ExplanationStrategy::AttentionPair,
                &ExplainerInput::new(vec![sample]),
                &ModelDescriptor::new("gpt-4o"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AutointerpError::InvalidSample { .. }));
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn catalog_strategy_restriction_is_unsupported() {
        let catalog = ModelCatalog::from_yaml(
            "- pattern: '^gpt'\n  vendor: openai\n  strategies: [oai_token-act-pair]\n",
        )
        .unwrap();
        let backend = Arc::new(ScriptedBackend::new(Provider::OpenAi, "cats"));
        let explainer = Explainer::new(
            Arc::new(ScriptedConnector(backend.clone())),
            Arc::new(catalog),
        )
        .unwrap();
        let err = explainer
            .generate(
                ExplanationStrategy::AttentionPair,
                &input(),
                &ModelDescriptor::new("gpt-4o"),
                &Credential::new(KeyKind::OpenAi, "k"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AutointerpError::UnsupportedCombination { .. }));
        assert!(backend.seen.lock().unwrap().is_empty());
    }
}
