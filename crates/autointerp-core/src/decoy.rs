//! Fixed negative-control samples shared by every recall scoring run.
//!
//! The five samples and their synthetic values belong to the scoring protocol: changing them
//! changes every recall score, so they are kept verbatim rather than generated.

use once_cell::sync::Lazy;

use crate::sample::ActivationSample;

const DECOYS: [(&[&str], &[f64]); 5] = [
    (
        &[
            "Sources", ":", " Cowboys", "'", " Dak", " Prescott", " agrees", " to", " four",
            "-year", ",", " $", "136", "M", " deal",
        ],
        &[0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 8.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    ),
    (
        &[
            " The", " second", " element", " is", " the", " ", "1", "0", "-", "residue", " MT",
            "ase", "-", "Rd", "RP", " linker", " that", " overall", " exhibits", " low",
        ],
        &[
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0, 0.0,
            0.0, 0.0, 0.0,
        ],
    ),
    (
        &[
            "The", " effect", " of", " a", " good", " metabolic", " control", " in", " the",
            " natural", " history", " of", " diabetic", " retin", "opathy", " is", " discussed",
        ],
        &[
            0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        ],
    ),
    (
        &[
            "Category", ":", "Military", " history", " of", " the", " Soviet", " Union", " during",
            " World", " War", " II",
        ],
        &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0],
    ),
    (
        &[
            " Wells", " Fargo", " issued", " three", " Forms", " ", "1", "0", "9", "9", "-", "C",
            ",", " Cancellation", " of", " Debt", ", ", " to",
        ],
        &[
            0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0,
        ],
    ),
];

static DECOY_SAMPLES: Lazy<Vec<ActivationSample>> = Lazy::new(|| {
    DECOYS
        .iter()
        .enumerate()
        .map(|(idx, (tokens, values))| ActivationSample {
            id: Some(idx.to_string()),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            values: values.to_vec(),
            dfa_values: None,
            dfa_target_index: None,
        })
        .collect()
});

/// The process-wide decoy set; ids are the decoy's position (`"0"`..`"4"`).
pub fn decoy_samples() -> &'static [ActivationSample] {
    &DECOY_SAMPLES
}
