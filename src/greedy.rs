//! The from-scratch cover computation.
//!
//! Sets are kept in an [`IndexedHeap`] keyed by how many of their rules are
//! still uncovered. The set with the most uncovered rules is popped, appended
//! to the cover and allowed to claim those rules; every other set on a newly
//! claimed rule then has its key lowered by one. This is the classical greedy
//! approximation, within a factor of `1 + ln n` of the optimal cover.

use std::collections::HashMap;

use tracing::{Span, debug, error, info, info_span, trace, warn};

use crate::engine::CoverEngine;
use crate::error::{CoverError, Result};
use crate::heap::{Decrease, IndexedHeap};
use crate::model::{CoverEntry, CoverModel, RuleId, RuleProcessingInfo, SetHasher, SetProcessingInfo};

pub type KeyChanges = HashMap<String, u64, SetHasher>;

#[derive(Debug)]
pub struct GreedyCover {
    model: CoverModel,
    heap: IndexedHeap<String>,
    span: Span,
}

impl Default for GreedyCover {
    fn default() -> Self {
        Self::new()
    }
}

impl GreedyCover {
    pub fn new() -> Self {
        Self::from_model(CoverModel::new())
    }
    pub fn from_model(model: CoverModel) -> Self {
        Self {
            model,
            heap: IndexedHeap::new(),
            span: info_span!("greedy_cover"),
        }
    }
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Computes a cover of every registered rule, replacing the current one.
    pub fn compute_cover(&mut self) -> Result<()> {
        let span = self.span.clone();
        let _entered = span.enter();

        self.model.cover.clear();
        self.model.clear_processing_info();
        self.heap.clear();
        let num_rules = self.model.rules.len() as u64;
        if num_rules == 0 {
            warn!("no rules to cover");
            return Err(CoverError::EmptyInput("No rules have been registered".into()));
        }
        self.add_all_sets_to_heap();

        let mut num_covered = 0;
        while num_covered < num_rules {
            let Some((set_name, uncovered)) = self.heap.pop() else {
                error!(num_covered, num_rules, "ran out of sets before every rule was covered");
                return Err(CoverError::InconsistentState(format!(
                    "Only {} of {} rules could be covered",
                    num_covered, num_rules
                )));
            };
            trace!(set = %set_name, uncovered, "adding set to cover");
            self.model.cover.push(CoverEntry::Set(set_name.clone()));
            let key_changes = self.update_processing_info(&mut num_covered);
            self.update_sets_in_heap(&key_changes, &set_name);
        }
        info!(
            cover = self.model.cover.len(),
            rules = num_rules,
            sets = self.model.sets.len(),
            "computed cover"
        );
        Ok(())
    }

    fn add_all_sets_to_heap(&mut self) {
        self.heap = IndexedHeap::with_capacity(self.model.sets.len());
        for (name, set) in &self.model.sets {
            self.heap.push(name.clone(), set.len() as u64);
        }
    }

    /// Lets the last cover entry claim its uncovered rules.
    ///
    /// Returns, for every set on a newly claimed rule, by how much its count
    /// of uncovered rules dropped. The entry itself is counted too.
    pub(crate) fn update_processing_info(&mut self, num_covered: &mut u64) -> KeyChanges {
        let mut key_changes = KeyChanges::default();
        let Some(entry) = self.model.cover.last().cloned() else {
            warn!("cover is empty");
            return key_changes;
        };
        let Some(set) = self.model.sets.get(entry.name()) else {
            warn!(set = %entry, "set not in set infos");
            return key_changes;
        };
        if self.model.set_processing.contains_key(&entry) {
            warn!(set = %entry, "set already has processing info");
            return key_changes;
        }
        let num_rules = self.model.rules.len();
        if self.model.rule_processing.len() < num_rules {
            debug!(
                missing = num_rules - self.model.rule_processing.len(),
                "padding rule processing info"
            );
            self.model
                .rule_processing
                .resize(num_rules, RuleProcessingInfo::default());
        }
        let num_uncovered = (num_rules as u64).checked_sub(*num_covered).unwrap_or_else(|| {
            warn!(num_covered = *num_covered, num_rules, "more rules covered than exist");
            0
        });
        let mut processing = SetProcessingInfo::new(num_uncovered);
        for &rule in set.rules() {
            let Some(rule_processing) = self.model.rule_processing.get_mut(rule as usize) else {
                warn!(rule, "rule not in rule processing info");
                continue;
            };
            if rule_processing.is_covered() {
                continue;
            }
            *num_covered += 1;
            processing.add_rule(rule);
            rule_processing.first_covered_by = Some(entry.clone());
            for other in self.model.rules[rule as usize].sets() {
                *key_changes.entry(other.clone()).or_insert(0) += 1;
            }
        }
        self.model.set_processing.insert(entry, processing);
        key_changes
    }

    fn update_sets_in_heap(&mut self, key_changes: &KeyChanges, popped: &str) {
        for (set_name, &change) in key_changes {
            match self.heap.decrease_by(set_name, change) {
                Decrease::Applied(_) => {}
                Decrease::Missing if set_name == popped => {}
                Decrease::Missing => warn!(set = %set_name, "set no longer in heap"),
                Decrease::Underflow { current } => {
                    error!(set = %set_name, change, current, "key decrease larger than key")
                }
            }
        }
    }
}

impl CoverEngine for GreedyCover {
    fn model(&self) -> &CoverModel {
        &self.model
    }
    fn into_model(self) -> CoverModel {
        self.model
    }
    fn register_rule<I, S>(&mut self, covering_sets: I) -> Result<RuleId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let _entered = self.span.enter();
        self.model.register_rule(covering_sets)
    }
    fn update_cover(&mut self) -> Result<()> {
        self.compute_cover()
    }
}
