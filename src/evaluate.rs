//! Timed comparison harness.
//!
//! The first rules of a rule set are covered from scratch by the greedy
//! engine. The remaining rules are then streamed one by one through the
//! online engine until the rules or the time budget run out.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{Span, error, info, info_span};

use crate::engine::CoverEngine;
use crate::error::{CoverError, Result};
use crate::greedy::GreedyCover;
use crate::online::{CoverStats, OnlineCover};
use crate::ruleset::{self, Rules};

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub seeded_rules: usize,
    pub online_rules: usize,
    pub register_secs: f64,
    pub greedy_secs: f64,
    pub online_secs: f64,
    pub online_rules_per_sec: f64,
    pub sane: bool,
    pub stats: CoverStats,
    pub cover: Vec<String>,
}

impl ComparisonReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct Evaluator {
    rules: Rules,
    span: Span,
}

impl Evaluator {
    /// Empty rules are dropped, as they can never be covered.
    pub fn new(rules: Rules) -> Self {
        Self {
            rules: rules.into_iter().filter(|r| !r.is_empty()).collect(),
            span: info_span!("evaluator"),
        }
    }
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ruleset::read_rules(path)?))
    }
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
    pub fn total_rules(&self) -> usize {
        self.rules.len()
    }

    /// Seeds with `start_rules` rules, then streams the rest within `budget`.
    ///
    /// Progress is logged every `stats_every` streamed rules, or never if it
    /// is zero.
    pub fn compare(
        &self,
        start_rules: usize,
        budget: Duration,
        stats_every: u64,
    ) -> Result<ComparisonReport> {
        let _entered = self.span.enter();
        let total = self.rules.len();
        if start_rules > total {
            error!(start_rules, total, "not enough rules to start with");
            return Err(CoverError::OutOfRange {
                requested: start_rules,
                available: total,
            });
        }

        let started = Instant::now();
        let mut greedy = GreedyCover::new();
        for rule in &self.rules[..start_rules] {
            greedy.register_rule(rule.iter().cloned())?;
        }
        let register_secs = started.elapsed().as_secs_f64();
        info!(rules = start_rules, secs = register_secs, "registered starting rules");

        let started = Instant::now();
        if start_rules > 0 {
            greedy.compute_cover()?;
        }
        let greedy_secs = started.elapsed().as_secs_f64();
        info!(
            cover = greedy.model().cover_len(),
            secs = greedy_secs,
            "computed greedy cover"
        );

        let mut online = OnlineCover::from_greedy(greedy);
        online.show_stats();
        let started = Instant::now();
        let mut online_rules = 0usize;
        for rule in &self.rules[start_rules..] {
            if started.elapsed() >= budget {
                info!(online_rules, "time budget used up");
                break;
            }
            online.register_rule(rule.iter().cloned())?;
            online.update_cover()?;
            online_rules += 1;
            if stats_every > 0 && online_rules as u64 % stats_every == 0 {
                info!(
                    online_rules,
                    secs = started.elapsed().as_secs_f64(),
                    "streaming progress"
                );
                online.show_stats();
            }
        }
        let online_secs = started.elapsed().as_secs_f64();
        let stats = online.show_stats();
        let sane = online.sanity_check();
        info!(online_rules, secs = online_secs, sane, "online phase done");

        Ok(ComparisonReport {
            seeded_rules: start_rules,
            online_rules,
            register_secs,
            greedy_secs,
            online_secs,
            online_rules_per_sec: if online_secs > 0.0 {
                online_rules as f64 / online_secs
            } else {
                0.0
            },
            sane,
            stats,
            cover: online.cover(),
        })
    }
}
