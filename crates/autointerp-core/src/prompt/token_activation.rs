//! Token/activation-pair template: every sample is a `<start>`..`<end>` block of
//! `token<TAB>value` rows. Values are expected to be pre-scaled to 0..=10 by the caller.

use std::fmt::Write;

use super::Conversation;
use crate::sample::ActivationSample;

const SYSTEM: &str = "We're studying neurons in a neural network. Each neuron looks for some particular thing in a short document. Look at the parts of the document the neuron activates for and summarize in a single sentence what the neuron is looking for. Don't list examples of words.

The activation format is token<tab>activation. Activation values range from 0 to 10. A neuron finding what it's looking for is represented by a non-zero activation value. The higher the activation value, the stronger the match.";

pub(crate) const REASONING_DIRECTIVE: &str = "Only respond with the explanation itself, which should not be a full sentence, just the completion of \"the main thing...\" sentence. Do NOT include the whole phrase \"Explanation of neuron 4 behavior: the main thing this neuron does is find...\". Do not mention \"this neuron...\".";

type ExemplarBlock = &'static [(&'static str, u8)];

struct Exemplar {
    blocks: &'static [ExemplarBlock],
    show_nonzero: bool,
    answer: &'static str,
}

static EXEMPLARS: [Exemplar; 3] = [
    Exemplar {
        blocks: &[
            &[
                ("t", 0), ("urt", 0), ("ur", 0), ("ro", 0), (" is", 0), (" fab", 0),
                ("ulously", 0), (" funny", 0), (" and", 0), (" over", 0), (" the", 0),
                (" top", 0), (" as", 0), (" a", 0), (" '", 0), ("very", 0), (" sneaky", 0),
                ("'", 1), (" but", 0), ("ler", 0), (" who", 0), (" excel", 0), ("s", 0),
                (" in", 0), (" the", 0), (" art", 0), (" of", 0), (" impossible", 0),
                (" disappearing", 6), ("/", 0), ("re", 0), ("app", 0), ("earing", 10),
                (" acts", 0),
            ],
            &[
                ("esc", 0), ("aping", 9), (" the", 4), (" studio", 0), (" ,", 0), (" pic", 0),
                ("col", 0), ("i", 0), (" is", 0), (" warm", 0), ("ly", 0), (" affecting", 3),
                (" and", 0), (" so", 0), (" is", 0), (" this", 0), (" ad", 0), ("roit", 0),
                ("ly", 0), (" minimalist", 0), (" movie", 0), (" .", 0),
            ],
        ],
        show_nonzero: true,
        answer: "present tense verbs ending in 'ing'.",
    },
    Exemplar {
        blocks: &[
            &[
                ("as", 0), (" sac", 0), ("char", 0), ("ine", 0), (" movies", 0), (" go", 0),
                (" ,", 0), (" this", 0), (" is", 0), (" likely", 0), (" to", 0), (" cause", 0),
                (" massive", 0), (" cardiac", 0), (" arrest", 10), (" if", 0), (" taken", 0),
                (" in", 0), (" large", 0), (" doses", 0), (" .", 0),
            ],
            &[
                ("shot", 0), (" perhaps", 0), (" '", 0), ("art", 0), ("istically", 0), ("'", 0),
                (" with", 0), (" handheld", 0), (" cameras", 0), (" and", 0),
                (" apparently", 0), (" no", 0), (" movie", 0), (" lights", 0), (" by", 0),
                (" jo", 0), ("aquin", 0), (" b", 0), ("aca", 0), ("-", 0), ("as", 0), ("ay", 0),
                (" ,", 0), (" the", 0), (" low", 0), ("-", 0), ("budget", 0),
                (" production", 0), (" swings", 0), (" annoy", 0), ("ingly", 0),
                (" between", 0), (" vert", 0), ("igo", 9), (" and", 0), (" opacity", 0),
                (" .", 0),
            ],
        ],
        show_nonzero: true,
        answer: "words related to physical medical conditions.",
    },
    Exemplar {
        blocks: &[
            &[
                ("the", 0), (" sense", 0), (" of", 0), (" together", 3), ("ness", 7), (" in", 0),
                (" our", 0), (" town", 1), (" is", 0), (" strong", 0), (" .", 0),
            ],
            &[
                ("a", 0), (" buoy", 0), ("ant", 0), (" romantic", 0), (" comedy", 0),
                (" about", 0), (" friendship", 0), (" ,", 0), (" love", 0), (" ,", 0),
                (" and", 0), (" the", 0), (" truth", 0), (" that", 0), (" we", 2), ("'re", 4),
                (" all", 3), (" in", 7), (" this", 10), (" together", 5), (" .", 0),
            ],
        ],
        show_nonzero: false,
        answer: "phrases related to community.",
    },
];

const OPEN_NEURON: usize = 4;

pub fn render(samples: &[ActivationSample]) -> Conversation {
    let exemplars = EXEMPLARS.iter().enumerate().map(|(idx, exemplar)| {
        (render_exemplar(idx + 1, exemplar), exemplar.answer.to_string())
    });

    let mut open = format!("\n\nNeuron {OPEN_NEURON}\nActivations:");
    for sample in samples {
        open.push_str(&block(
            sample
                .tokens
                .iter()
                .map(String::as_str)
                .zip(sample.values.iter().map(|v| format_value(*v))),
        ));
    }
    open.push_str(&completion_cue(OPEN_NEURON));

    Conversation::from_exemplars(SYSTEM, exemplars, open)
}

fn render_exemplar(neuron: usize, exemplar: &Exemplar) -> String {
    let mut out = format!("\n\nNeuron {neuron}\nActivations:");
    for rows in exemplar.blocks {
        out.push_str(&block(rows.iter().map(|(t, v)| (*t, v.to_string()))));
    }
    if exemplar.show_nonzero {
        out.push_str("\n\nSame activations, but with all zeros filtered out:");
        for rows in exemplar.blocks {
            out.push_str(&block(
                rows.iter()
                    .filter(|(_, v)| *v != 0)
                    .map(|(t, v)| (*t, v.to_string())),
            ));
        }
    }
    out.push_str(&completion_cue(neuron));
    out
}

fn completion_cue(neuron: usize) -> String {
    format!("\n\nExplanation of neuron {neuron} behavior: the main thing this neuron does is find")
}

/// One `<start>`..`<end>` block, prefixed by a newline.
pub(crate) fn block<'a>(rows: impl Iterator<Item = (&'a str, String)>) -> String {
    let mut out = String::from("\n<start>");
    for (token, value) in rows {
        // writing to a String cannot fail
        let _ = write!(out, "\n{token}\t{value}");
    }
    out.push_str("\n<end>");
    out
}

/// Integral values print without a fractional part so pre-scaled activations read as `10`, not `10.0`.
pub(crate) fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Role;

    fn sample(tokens: &[&str], values: &[f64]) -> ActivationSample {
        ActivationSample::new(
            tokens.iter().map(|t| t.to_string()).collect(),
            values.to_vec(),
        )
        .unwrap()
    }

    fn open_turn(samples: &[ActivationSample]) -> String {
        render(samples).turns.last().unwrap().content.clone()
    }

    #[test]
    fn one_block_per_sample_with_its_own_rows() {
        let samples = vec![
            sample(&["the", " cat"], &[0.0, 10.0]),
            sample(&[" sat", " on", " mat"], &[2.0, 0.0, 5.5]),
        ];
        let open = open_turn(&samples);
        assert_eq!(open.matches("<start>").count(), 2);
        assert_eq!(open.matches("<end>").count(), 2);
        assert!(open.contains("<start>\nthe\t0\n cat\t10\n<end>"));
        assert!(open.contains("<start>\n sat\t2\n on\t0\n mat\t5.5\n<end>"));
    }

    #[test]
    fn open_turn_addresses_the_fourth_neuron() {
        let open = open_turn(&[sample(&["a"], &[1.0])]);
        assert!(open.starts_with("\n\nNeuron 4\nActivations:"));
        assert!(open.ends_with("Explanation of neuron 4 behavior: the main thing this neuron does is find"));
    }

    #[test]
    fn exemplars_include_filtered_sections() {
        let conversation = render(&[sample(&["a"], &[1.0])]);
        assert_eq!(conversation.turns.len(), 7);
        let first = &conversation.turns[0];
        assert_eq!(first.role, Role::User);
        assert!(first.content.contains("Same activations, but with all zeros filtered out:"));
        assert!(first
            .content
            .contains("<start>\n'\t1\n disappearing\t6\nearing\t10\n<end>"));
        assert!(!conversation.turns[4]
            .content
            .contains("Same activations, but with all zeros filtered out:"));
        assert_eq!(conversation.turns[5].content, "phrases related to community.");
    }

    #[test]
    fn format_value_keeps_fractions() {
        assert_eq!(format_value(3.0), "3");
        assert_eq!(format_value(0.25), "0.25");
    }
}
