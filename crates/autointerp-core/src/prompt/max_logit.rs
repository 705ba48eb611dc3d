//! Max-activation/logit template. The explainer sees four parallel lists derived from the
//! samples and walks a numbered decision procedure over them.

use serde::Serialize;

use super::Conversation;
use crate::sample::ActivationSample;

/// Tokens kept on each side of the max-activating token in `TOP_ACTIVATING_TEXTS`.
pub const CONTEXT_RADIUS: usize = 24;

const SYSTEM: &str = r#"You are explaining the behavior of a neuron in a neural network. Your response should be a very concise explanation (1-6 words) that captures what the neuron detects or predicts by finding patterns in lists.

To determine the explanation, you are given four lists:

- MAX_ACTIVATING_TOKENS, which are the top activating tokens in the top activating texts.
- TOKENS_AFTER_MAX_ACTIVATING_TOKEN, which are the tokens immediately after the max activating token.
- TOP_POSITIVE_LOGITS, which are the most likely words or tokens associated with this neuron.
- TOP_ACTIVATING_TEXTS, which are top activating texts.

You should look for a pattern by trying the following methods in order. Once you find a pattern, stop and return that pattern. Do not proceed to the later methods.
Method 1: Look at MAX_ACTIVATING_TOKENS. If they share something specific in common, or are all the same token or a variation of the same token (like different cases or conjugations), respond with that token.
Method 2: Look at TOKENS_AFTER_MAX_ACTIVATING_TOKEN. Try to find a specific pattern or similarity in all the tokens. A common pattern is that they all start with the same letter. If you find a pattern (like 's word', 'the ending -ing', 'number 8'), respond with 'say [the pattern]'. You can ignore uppercase/lowercase differences for this.
Method 3: Look at TOP_POSITIVE_LOGITS for similarities and describe it very briefly (1-3 words).
Method 4: Look at TOP_ACTIVATING_TEXTS and make a best guess by describing the broad theme or context, ignoring the max activating tokens.

Rules:
- Keep your explanation extremely concise (1-6 words, mostly 1-3 words).
- Do not add unnecessary phrases like "words related to", "concepts related to", or "variations of the word".
- Do not mention "tokens" or "patterns" in your explanation.
- The explanation should be specific. For example, "unique words" is not a specific enough pattern, nor is "foreign words".
- Remember to use the 'say [the pattern]' when using Method 2 above (pattern found in TOKENS_AFTER_MAX_ACTIVATING_TOKEN).
- If you absolutely cannot make any guesses, return the first token in MAX_ACTIVATING_TOKENS.

Respond by going through each method number until you find one that helps you find an explanation for what this neuron is detecting or predicting. If a method does not help you find an explanation, briefly explain why it does not, then go on to the next method.
Finally, end your response with the method number you used, the reason for your explanation, and then the explanation."#;

pub(crate) const REASONING_DIRECTIVE: &str = "After working through the methods, finish with a single line of the form \"Explanation: <explanation>\". Do not repeat the lists or the neuron heading.";

/// The four lists shown to the explainer, one entry per sample except `top_logits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaxLogitViews {
    pub tokens_after_max: Vec<String>,
    pub max_activating_tokens: Vec<String>,
    pub top_logits: Vec<String>,
    pub top_texts: Vec<String>,
}

impl MaxLogitViews {
    pub fn derive(samples: &[ActivationSample], top_logits: &[String]) -> Self {
        let mut views = Self {
            tokens_after_max: Vec::with_capacity(samples.len()),
            max_activating_tokens: Vec::with_capacity(samples.len()),
            top_logits: top_logits.iter().map(|l| clean_logit(l)).collect(),
            top_texts: Vec::with_capacity(samples.len()),
        };
        for sample in samples {
            let Some(max) = sample.max_index() else {
                continue;
            };
            views
                .max_activating_tokens
                .push(clean_token(&sample.tokens[max]));
            views.tokens_after_max.push(
                sample
                    .tokens
                    .get(max + 1)
                    .map(|t| clean_token(t))
                    .unwrap_or_default(),
            );
            let start = max.saturating_sub(CONTEXT_RADIUS);
            let end = (max + CONTEXT_RADIUS + 1).min(sample.tokens.len());
            views
                .top_texts
                .push(sample.tokens[start..end].concat().replace('\n', "  "));
        }
        views
    }
}

struct Exemplar {
    tokens_after_max: &'static [&'static str],
    max_activating_tokens: &'static [&'static str],
    top_logits: &'static [&'static str],
    top_texts: &'static [&'static str],
    answer: &'static str,
}

static EXEMPLARS: [Exemplar; 4] = [
    Exemplar {
        tokens_after_max: &["was", "watching"],
        max_activating_tokens: &["She", "enjoy"],
        top_logits: &[
            "walking", "WA", "waiting", "was", "we", "WHAM", "wish", "win", "wake", "whisper",
        ],
        top_texts: &[
            "She was taking a nap when her phone started ringing.",
            "I enjoy watching movies with my family.",
        ],
        answer: "Method 1 fails: MAX_ACTIVATING_TOKENS (She, enjoy) are not similar tokens.\nMethod 2 succeeds: All TOKENS_AFTER_MAX_ACTIVATING_TOKEN have a pattern in common: they all start with \"w\". Explanation: say \"w\" words",
    },
    Exemplar {
        tokens_after_max: &["are", ","],
        max_activating_tokens: &["banana", "blueberries"],
        top_logits: &[
            "apple", "orange", "pineapple", "watermelon", "kiwi", "peach", "pear", "grape",
            "cherry", "plum",
        ],
        top_texts: &[
            "The apple and banana are delicious foods that provide essential vitamins and nutrients.",
            "I enjoy eating fresh strawberries, blueberries, and mangoes during the summer months.",
        ],
        answer: "Method 1 succeeds: All MAX_ACTIVATING_TOKENS (banana, blueberries) are fruits. Explanation: fruits",
    },
    Exemplar {
        tokens_after_max: &["warm", "the"],
        max_activating_tokens: &["and", "And"],
        top_logits: &[
            "elephant", "guitar", "mountain", "bicycle", "ocean", "telescope", "candle",
            "umbrella", "tornado", "butterfly",
        ],
        top_texts: &[
            "It was a beautiful day outside with clear skies and warm sunshine.",
            "And the garden has roses and tulips and daisies and sunflowers blooming together.",
        ],
        answer: "Method 1 succeeds: All MAX_ACTIVATING_TOKENS are the word \"and\". Explanation: and",
    },
    Exemplar {
        tokens_after_max: &["was", "places"],
        max_activating_tokens: &["war", "some"],
        top_logits: &[
            "4", "four", "fourth", "4th", "IV", "Four", "FOUR", "~4", "4.0", "quartet",
        ],
        top_texts: &[
            "the civil war was a major topic in history class .",
            "seasons of the year are winter , spring , summer , and fall or autumn in some places .",
        ],
        answer: "Method 1 fails: MAX_ACTIVATING_TOKENS (war, some) are not all the same token.\nMethod 2 fails: TOKENS_AFTER_MAX_ACTIVATING_TOKEN (was, places) are not all similar tokens and don't have a text pattern in common.\nMethod 3 succeeds: All TOP_POSITIVE_LOGITS are the number 4. Explanation: 4",
    },
];

const OPEN_NEURON: usize = 5;

pub fn render(samples: &[ActivationSample], top_logits: &[String]) -> Conversation {
    let exemplars = EXEMPLARS.iter().enumerate().map(|(idx, exemplar)| {
        let sections = [
            exemplar.tokens_after_max.join("\n"),
            exemplar.max_activating_tokens.join("\n"),
            exemplar.top_logits.join("\n"),
            exemplar.top_texts.join("\n"),
        ];
        (render_neuron(idx + 1, &sections), exemplar.answer.to_string())
    });

    let views = MaxLogitViews::derive(samples, top_logits);
    let sections = [
        views.tokens_after_max.join("\n"),
        views.max_activating_tokens.join("\n"),
        views.top_logits.join("\n"),
        views.top_texts.join("\n"),
    ];
    Conversation::from_exemplars(SYSTEM, exemplars, render_neuron(OPEN_NEURON, &sections))
}

const SECTION_TAGS: [&str; 4] = [
    "TOKENS_AFTER_MAX_ACTIVATING_TOKEN",
    "MAX_ACTIVATING_TOKENS",
    "TOP_POSITIVE_LOGITS",
    "TOP_ACTIVATING_TEXTS",
];

fn render_neuron(neuron: usize, sections: &[String; 4]) -> String {
    let mut out = format!("\n\nNeuron {neuron}\n");
    for (tag, body) in SECTION_TAGS.iter().zip(sections) {
        out.push_str(&format!("\n<{tag}>\n\n{body}\n\n</{tag}>\n\n"));
    }
    out.push_str(&format!("\nExplanation of neuron {neuron} behavior: "));
    out
}

fn clean_token(token: &str) -> String {
    token.replace('\n', "").trim().to_string()
}

/// Logit words arrive in SentencePiece form; `▁` marks a leading space.
fn clean_logit(logit: &str) -> String {
    logit.replace('▁', " ").replace('\n', "").trim().to_string()
}
