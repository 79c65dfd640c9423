//! Synthetic rule sets for benchmarking.
//!
//! Each set draws how many rules it covers from a Zipf distribution over
//! ranks, scaled to `max_rules_per_set`, so that a few sets are large and
//! most are small. The rules it covers are picked uniformly.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::model::SetHasher;
use crate::ruleset::Rules;
use crate::settings::GeneratorSettings;

pub const DEFAULT_ZIPF_RANKS: usize = 300;
pub const DEFAULT_ZIPF_EXPONENT: f64 = 0.4;

/// Cumulative Zipf distribution over `ranks` ranks; the last value is 1.
pub fn zipf_cdf(ranks: usize, exponent: f64) -> Vec<f64> {
    let weights: Vec<f64> = (1..=ranks).map(|k| 1.0 / (k as f64).powf(exponent)).collect();
    let total: f64 = weights.iter().sum();
    let mut running = 0.0;
    let mut cdf: Vec<f64> = weights
        .iter()
        .map(|w| {
            running += w;
            running / total
        })
        .collect();
    if let Some(last) = cdf.last_mut() {
        *last = 1.0;
    }
    cdf
}

pub fn default_zipf() -> Vec<f64> {
    zipf_cdf(DEFAULT_ZIPF_RANKS, DEFAULT_ZIPF_EXPONENT)
}

/// Draws a 1-based rank: one past the number of entries not above a uniform draw.
pub fn sample_rank<R: Rng>(cdf: &[f64], rng: &mut R) -> usize {
    let draw: f64 = rng.gen_range(0.0..1.0);
    let rank = cdf.partition_point(|&p| p <= draw) + 1;
    rank.min(cdf.len())
}

/// Generates `num_rules` rules, deterministically for a given seed.
///
/// Rules that no set picked stay empty.
pub fn make_rules(settings: &GeneratorSettings, cdf: &[f64]) -> Rules {
    let mut rules: Rules = vec![Vec::new(); settings.num_rules];
    if settings.num_rules == 0 || cdf.is_empty() {
        return rules;
    }
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut picked: HashSet<usize, SetHasher> = HashSet::default();
    for set_id in 0..settings.num_sets {
        let rank = sample_rank(cdf, &mut rng);
        let rules_per_set =
            (rank as f64 / cdf.len() as f64 * settings.max_rules_per_set as f64) as usize;
        picked.clear();
        for _ in 0..rules_per_set {
            let rule = rng.gen_range(0..settings.num_rules);
            if picked.insert(rule) {
                rules[rule].push(set_id.to_string());
            }
        }
    }
    debug!(
        rules = settings.num_rules,
        sets = settings.num_sets,
        empty = rules.iter().filter(|r| r.is_empty()).count(),
        "generated rules"
    );
    rules
}
