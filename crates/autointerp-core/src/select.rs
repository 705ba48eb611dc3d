//! Choosing which stored samples feed explanation and scoring.

use std::collections::HashMap;

use crate::sample::{ActivationSample, SamplePartitions};

pub const EXPLAIN_TOP_LIMIT: usize = 10;
pub const SCORE_TOP_LIMIT: usize = 20;
pub const SCORE_ZERO_LIMIT: usize = 5;
/// Samples sent to the scoring service's explainer.
pub const REMOTE_EXPLAIN_LIMIT: usize = 20;

/// Samples keyed by their token text; a later duplicate replaces an earlier one but keeps
/// the earlier position.
fn dedupe(pool: &[ActivationSample]) -> Vec<ActivationSample> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ActivationSample> = Vec::new();
    for sample in pool {
        match index.get(&sample.text()) {
            Some(&slot) => unique[slot] = sample.clone(),
            None => {
                index.insert(sample.text(), unique.len());
                unique.push(sample.clone());
            }
        }
    }
    unique
}

/// The `limit` most activating distinct samples, strongest first. Samples that never
/// activate are skipped.
pub fn top_samples(pool: &[ActivationSample], limit: usize) -> Vec<ActivationSample> {
    strongest_first(
        dedupe(pool)
            .into_iter()
            .filter(|sample| sample.max_value() > 0.0)
            .collect(),
        limit,
    )
}

/// The `limit` distinct samples with the highest peak, non-activating ones included.
pub fn strongest_samples(pool: &[ActivationSample], limit: usize) -> Vec<ActivationSample> {
    strongest_first(dedupe(pool), limit)
}

fn strongest_first(mut samples: Vec<ActivationSample>, limit: usize) -> Vec<ActivationSample> {
    samples.sort_by(|a, b| b.max_value().total_cmp(&a.max_value()));
    samples.truncate(limit);
    samples
}

/// Top samples plus up to `zero_limit` non-activating samples and the fixed decoys.
pub fn partitions_from_pool(
    pool: &[ActivationSample],
    top_limit: usize,
    zero_limit: usize,
) -> SamplePartitions {
    let zero = dedupe(pool)
        .into_iter()
        .filter(|sample| sample.max_value() <= 0.0)
        .take(zero_limit)
        .collect();
    SamplePartitions::new(top_samples(pool, top_limit), zero)
}
