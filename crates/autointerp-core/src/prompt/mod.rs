//! Few-shot conversation templates for the explainer and the recall judge.
//!
//! Every renderer here is a pure function of its input: no clocks, no randomness, no I/O.

pub mod attention;
pub mod judge;
pub mod max_logit;
pub mod token_activation;

use serde::{Deserialize, Serialize};

use crate::sample::{ActivationSample, ExplanationStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A system message plus alternating turns ending with an open user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub system: String,
    pub turns: Vec<Turn>,
}

impl Conversation {
    pub(crate) fn from_exemplars(
        system: &str,
        exemplars: impl IntoIterator<Item = (String, String)>,
        open_turn: String,
    ) -> Self {
        let mut turns = Vec::new();
        for (user, assistant) in exemplars {
            turns.push(Turn::user(user));
            turns.push(Turn::assistant(assistant));
        }
        turns.push(Turn::user(open_turn));
        Self {
            system: system.to_string(),
            turns,
        }
    }

    /// Append text to the final (open) turn.
    pub fn append_to_last_turn(&mut self, text: &str) {
        if let Some(last) = self.turns.last_mut() {
            last.content.push('\n');
            last.content.push_str(text);
        }
    }
}

/// Everything the explainer templates read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainerInput {
    pub samples: Vec<ActivationSample>,
    /// Top positive logit words of the feature; only the max-logit strategy reads them.
    #[serde(default)]
    pub top_logits: Vec<String>,
}

impl ExplainerInput {
    pub fn new(samples: Vec<ActivationSample>) -> Self {
        Self {
            samples,
            top_logits: Vec::new(),
        }
    }

    pub fn with_top_logits(mut self, top_logits: Vec<String>) -> Self {
        self.top_logits = top_logits;
        self
    }
}

/// Render the explainer conversation for `strategy`.
pub fn render(strategy: ExplanationStrategy, input: &ExplainerInput) -> Conversation {
    match strategy {
        ExplanationStrategy::TokenActivationPair => token_activation::render(&input.samples),
        ExplanationStrategy::MaxLogit => max_logit::render(&input.samples, &input.top_logits),
        ExplanationStrategy::AttentionPair => attention::render(&input.samples),
    }
}

/// Instruction appended to the open turn for reasoning models, which otherwise restate the
/// completion scaffold in their answer.
pub fn reasoning_directive(strategy: ExplanationStrategy) -> &'static str {
    match strategy {
        ExplanationStrategy::TokenActivationPair => token_activation::REASONING_DIRECTIVE,
        ExplanationStrategy::MaxLogit => max_logit::REASONING_DIRECTIVE,
        ExplanationStrategy::AttentionPair => attention::REASONING_DIRECTIVE,
    }
}
