//! Recall judge conversation: one sample and one explanation in, `{"match", "reason"}` out.

use serde::Serialize;

use super::Conversation;
use crate::sample::ActivationSample;

const SYSTEM: &str = r#"We're studying neurons in a neural network. Each neuron looks for some particular thing in a short document. Look at the parts of the document the neuron activates, and tell me if the explanation accurately explains what the neuron is looking for.

The activation format is in JSON. A neuron finding what it's looking for is represented by a non-zero activation value. The higher the activation value, the stronger the match.

Only respond with in JSON with the format {"match": true, "reason": [reason why it matches]} or {"match": false, "reason": [reason why it doesn't match] }."#;

#[derive(Debug, Serialize)]
struct JudgeRow<'a> {
    token: String,
    activation: &'a f64,
}

#[derive(Debug, Serialize)]
struct JudgePayload<'a> {
    activations: Vec<JudgeRow<'a>>,
    explanation: &'a str,
}

struct Exemplar {
    tokens: &'static [&'static str],
    values: &'static [f64],
    explanation: &'static str,
    answer: &'static str,
}

static EXEMPLARS: [Exemplar; 2] = [
    Exemplar {
        tokens: &[
            " in", " the", " art", " of", " impossible", " disappearing", "/", "re", "app",
            "earing", " acts",
        ],
        values: &[0.0, 0.0, 0.0, 0.0, 0.0, 6.0, 0.0, 5.0, 8.0, 8.0, 0.0],
        explanation: "words about disappearing and reappearing",
        answer: r#"{"match": true, "reason": "the tokens disappearing and the combined tokens re, app, earing, which form the word reappearing, match the explanation."}"#,
    },
    Exemplar {
        tokens: &[
            " with", " handheld", " cameras", " and", " apparently", " no", " movie", " lights",
            " by",
        ],
        values: &[0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        explanation: "terms related to cats",
        answer: r#"{"match": false, "reason": "cameras has nothing to do with cats"}"#,
    },
];

/// JSON user message for one sample. `▁` in tokens is shown as a plain space.
pub fn payload<S: AsRef<str>>(tokens: &[S], values: &[f64], explanation: &str) -> String {
    let payload = JudgePayload {
        activations: tokens
            .iter()
            .zip(values)
            .map(|(token, activation)| JudgeRow {
                token: token.as_ref().replace('▁', " "),
                activation,
            })
            .collect(),
        explanation,
    };
    // a struct of strings and finite floats always serializes
    serde_json::to_string(&payload).unwrap_or_default()
}

pub fn render(sample: &ActivationSample, explanation: &str) -> Conversation {
    let exemplars = EXEMPLARS.iter().map(|exemplar| {
        (
            payload(exemplar.tokens, exemplar.values, exemplar.explanation),
            exemplar.answer.to_string(),
        )
    });
    Conversation::from_exemplars(
        SYSTEM,
        exemplars,
        payload(&sample.tokens, &sample.values, explanation),
    )
}
