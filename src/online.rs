//! Lazy updates with greedy rebuilds when the cover drifts.
//!
//! After a full greedy computation every cover entry has claimed some share
//! of the rules that were uncovered when it was placed. The smallest share
//! seen over all rebuilds, `best_greedy_fraction`, bounds how far from
//! optimal the cover can be. Lazy updates keep the cover valid but can erode
//! those shares; once they fall too far behind the bound the model is handed
//! to a [`GreedyCover`] and back.

use std::mem;

use serde::Serialize;
use tracing::{Span, debug, error, info, info_span, warn};

use crate::engine::CoverEngine;
use crate::error::{CoverError, Result};
use crate::greedy::GreedyCover;
use crate::lazy::LazyCover;
use crate::model::{CoverModel, RuleId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverStats {
    pub rules: usize,
    pub sets: usize,
    pub cover_size: usize,
    pub updates: u64,
    pub rebuilds: u64,
    pub rebuild_rate: f64,
    pub best_greedy_fraction: f64,
    /// No cover can have fewer sets than this.
    pub optimal_lower_bound: f64,
    /// Size a cover within the greedy guarantee may reach.
    pub size_bound: f64,
}

#[derive(Debug)]
pub struct OnlineCover {
    lazy: LazyCover,
    adds: u64,
    updates: u64,
    rebuilds: u64,
    best_greedy_fraction: f64,
    span: Span,
}

impl Default for OnlineCover {
    fn default() -> Self {
        Self::new()
    }
}

impl OnlineCover {
    pub fn new() -> Self {
        Self {
            lazy: LazyCover::new(),
            adds: 0,
            updates: 0,
            rebuilds: 0,
            best_greedy_fraction: 1.0,
            span: info_span!("online_cover"),
        }
    }

    /// Continues from a greedy cover, using it as the first baseline.
    pub fn from_greedy(greedy: GreedyCover) -> Self {
        let model = greedy.into_model();
        let mut online = Self::new();
        match min_greedy_fraction(&model) {
            Some(fraction) => online.best_greedy_fraction = fraction,
            None => {
                let _entered = online.span.enter();
                debug!(
                    cover = model.cover_len(),
                    "greedy cover is empty, keeping best greedy fraction at 1.0"
                );
            }
        }
        online.lazy = LazyCover::from_model(model);
        online
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn best_greedy_fraction(&self) -> f64 {
        self.best_greedy_fraction
    }
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Recomputes the cover from scratch.
    pub fn rebuild(&mut self) -> Result<()> {
        let span = self.span.clone();
        let _entered = span.enter();

        let lazy_span = self.lazy.span().clone();
        let mut greedy = GreedyCover::from_model(mem::take(&mut self.lazy).into_model());
        let outcome = greedy.compute_cover();
        self.lazy = LazyCover::from_model(greedy.into_model()).with_span(lazy_span);
        outcome?;

        self.rebuilds += 1;
        if let Some(fraction) = min_greedy_fraction(self.lazy.model()) {
            if fraction < self.best_greedy_fraction {
                debug!(
                    from = self.best_greedy_fraction,
                    to = fraction,
                    "lowering best greedy fraction"
                );
                self.best_greedy_fraction = fraction;
            }
        }
        Ok(())
    }

    /// Whether the lazily maintained cover is still close enough to greedy.
    pub fn good_enough(&self) -> bool {
        if self.best_greedy_fraction >= 1.0 {
            return true;
        }
        let model = self.lazy.model();
        let sum: f64 = model.greedy_fractions().sum();
        let threshold = model.cover_len() as f64 * self.best_greedy_fraction / 2.0;
        sum > threshold
    }

    pub fn stats(&self) -> CoverStats {
        let model = self.lazy.model();
        let rules = model.num_rules();
        let best = self.best_greedy_fraction;
        let size_bound = if rules > 1 {
            2.0 * (rules as f64).ln() / best
        } else {
            0.0
        };
        CoverStats {
            rules,
            sets: model.num_sets(),
            cover_size: model.cover_len(),
            updates: self.updates,
            rebuilds: self.rebuilds,
            rebuild_rate: if self.updates == 0 {
                0.0
            } else {
                self.rebuilds as f64 / self.updates as f64
            },
            best_greedy_fraction: best,
            optimal_lower_bound: 1.0 / best,
            size_bound,
        }
    }

    /// Logs the current stats and hands them back.
    pub fn show_stats(&self) -> CoverStats {
        let stats = self.stats();
        let _entered = self.span.enter();
        info!(
            rules = stats.rules,
            sets = stats.sets,
            cover = stats.cover_size,
            optimal_lower_bound = stats.optimal_lower_bound,
            size_bound = stats.size_bound,
            updates = stats.updates,
            rebuilds = stats.rebuilds,
            rebuild_rate = stats.rebuild_rate,
            "cover stats"
        );
        stats
    }
}

fn min_greedy_fraction(model: &CoverModel) -> Option<f64> {
    model.greedy_fractions().fold(None, |min, f| match min {
        Some(m) if m <= f => Some(m),
        _ => Some(f),
    })
}

impl CoverEngine for OnlineCover {
    fn model(&self) -> &CoverModel {
        self.lazy.model()
    }
    fn into_model(self) -> CoverModel {
        self.lazy.into_model()
    }

    /// Registers a rule. Each rule must be followed by exactly one update.
    fn register_rule<I, S>(&mut self, covering_sets: I) -> Result<RuleId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let span = self.span.clone();
        let _entered = span.enter();
        if self.adds != self.updates {
            warn!(adds = self.adds, updates = self.updates, "update the cover before adding another rule");
            return Err(CoverError::InvalidCall(
                "The cover must be updated after each added rule".into(),
            ));
        }
        let rule = self.lazy.register_rule(covering_sets)?;
        self.adds += 1;
        Ok(rule)
    }

    fn update_cover(&mut self) -> Result<()> {
        let span = self.span.clone();
        let _entered = span.enter();
        if self.updates + 1 != self.adds {
            warn!(adds = self.adds, updates = self.updates, "add exactly one rule before each update");
            return Err(CoverError::InvalidCall(
                "Exactly one rule must be added before each update".into(),
            ));
        }
        self.updates += 1;
        if let Err(e) = self.lazy.update_cover() {
            warn!(error = %e, "lazy update failed, rebuilding");
            return self.rebuild();
        }
        if !self.good_enough() {
            debug!(updates = self.updates, "cover drifted, rebuilding");
            self.rebuild()?;
        }
        Ok(())
    }

    fn sanity_check(&self) -> bool {
        let _entered = self.span.enter();
        if self.adds != self.updates {
            warn!(adds = self.adds, updates = self.updates, "sanity check between an add and its update");
            return false;
        }
        match self.lazy.model().verify() {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "sanity check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // s0..s9 each cover one rule, so the greedy fractions run 1/10, 1/9, ..., 1/1
    fn singletons() -> OnlineCover {
        let mut online = OnlineCover::new();
        for i in 0..10 {
            online.register_rule([format!("s{}", i)]).unwrap();
            online.update_cover().unwrap();
        }
        online
    }

    #[test]
    fn good_enough_compares_against_half_the_baseline() {
        let mut online = singletons();
        assert!(online.good_enough(), "no baseline yet");

        // fractions sum to about 2.93
        online.best_greedy_fraction = 0.9;
        assert!(!online.good_enough(), "2.93 is below 10 * 0.9 / 2");
        online.best_greedy_fraction = 0.5;
        assert!(online.good_enough(), "2.93 is above 10 * 0.5 / 2");
    }

    #[test]
    fn drifted_cover_is_rebuilt_on_update() {
        let mut online = singletons();
        assert_eq!(online.rebuilds(), 0);
        online.best_greedy_fraction = 0.9;

        let all: Vec<String> = (0..10).map(|i| format!("s{}", i)).collect();
        online.register_rule(all).unwrap();
        assert!(!online.good_enough(), "lazy cover already behind the baseline");
        online.update_cover().expect("cover updated");

        assert_eq!(online.rebuilds(), 1);
        assert!(
            online.best_greedy_fraction() < 0.9,
            "baseline lowered to {}",
            online.best_greedy_fraction()
        );
        assert_eq!(online.cover().len(), 10);
        assert_eq!(online.cover()[0], "s9", "greater name wins the tie");
        assert!(online.sanity_check());
    }

    #[test]
    fn empty_greedy_leaves_no_baseline() {
        let online = OnlineCover::from_greedy(GreedyCover::new());
        assert_eq!(online.best_greedy_fraction(), 1.0);
        assert!(online.good_enough());
        assert!(online.sanity_check());
    }
}
