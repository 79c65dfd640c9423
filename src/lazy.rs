//! Single-rule cover updates.
//!
//! When a rule arrives, each set covering it is asked where it would sit in
//! the current cover if it were placed greedily given the entries ahead of
//! it. The set that would go furthest up is inserted there as a pending entry.
//! It steals the rules it covers from the entries behind it and gives up the
//! ones already claimed ahead of it. Entries left with nothing are dropped,
//! and the pending entry replaces any older occurrence of the same set.
//!
//! The search compares a candidate against the first cover entry and against
//! entries that cover its rules or the new rule only. That is a heuristic:
//! the cover stays valid, but may drift away from what a full greedy pass
//! would produce. [`crate::online::OnlineCover`] watches for that.

use std::collections::{HashMap, HashSet};

use roaring::RoaringTreemap;
use tracing::{Span, debug, error, info_span, trace, warn};

use crate::engine::CoverEngine;
use crate::error::{CoverError, Result};
use crate::model::{CoverEntry, CoverModel, RuleId, RuleProcessingInfo, SetHasher, SetProcessingInfo};

/// Where a candidate set would go in the cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Right before the entry at `position`, which had `before_uncovered`
    /// rules left to cover when it was placed.
    Before { position: usize, before_uncovered: u64 },
    Append,
}
impl Placement {
    pub fn before_uncovered(&self) -> u64 {
        match self {
            Placement::Before { before_uncovered, .. } => *before_uncovered,
            Placement::Append => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveUp {
    pub set: String,
    pub placement: Placement,
}

#[derive(Debug)]
pub struct LazyCover {
    model: CoverModel,
    cover_order: HashMap<CoverEntry, usize, SetHasher>,
    span: Span,
}

impl Default for LazyCover {
    fn default() -> Self {
        Self::new()
    }
}

impl LazyCover {
    pub fn new() -> Self {
        Self::from_model(CoverModel::new())
    }
    /// Takes over a model whose cover and processing info are consistent.
    pub fn from_model(model: CoverModel) -> Self {
        Self {
            model,
            cover_order: HashMap::default(),
            span: info_span!("lazy_cover"),
        }
    }
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Folds the most recently registered rule into the cover.
    pub fn update_after_new_rule(&mut self) -> Result<()> {
        let span = self.span.clone();
        let _entered = span.enter();

        let Some(last_rule) = self.model.last_rule() else {
            warn!("no rule to cover");
            return Err(CoverError::EmptyInput("No rules have been registered".into()));
        };
        self.make_cover_order();
        let best = self.best_set_to_move_up();
        let winner = match &best {
            Some(move_up) => self.insert_pending(move_up)?,
            None => self.first_entry_covering_last_rule().ok_or_else(|| {
                error!(rule = last_rule, "no cover entry covers the new rule");
                CoverError::NotFound(format!("No cover entry covers rule {}", last_rule))
            })?,
        };
        trace!(rule = last_rule, set = %winner, "new rule goes to");
        self.mark_last_rule(last_rule, &winner);
        if let Err(e) = self.update_cover_rules(&winner) {
            if winner.is_pending() {
                self.discard_pending(&winner, last_rule);
            }
            return Err(e);
        }
        let empty = self.fix_num_uncovered();
        self.clean_up_empty_entries(&empty);
        if best.is_some() {
            self.resolve_pending(&winner)?;
        }
        Ok(())
    }

    pub(crate) fn make_cover_order(&mut self) {
        self.cover_order.clear();
        for (position, entry) in self.model.cover.iter().enumerate() {
            self.cover_order.insert(entry.clone(), position);
        }
    }

    /// The set on the new rule that would be placed furthest up, if any.
    ///
    /// Ties go to the greater set name.
    pub(crate) fn best_set_to_move_up(&mut self) -> Option<MoveUp> {
        let last_rule = self.model.last_rule()?;
        let candidates = self.model.rules[last_rule as usize].sets().to_vec();
        let mut best: Option<MoveUp> = None;
        for set in candidates {
            let Some(placement) = self.where_would_set_go(&set) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some(current) => {
                    let (new, old) = (placement.before_uncovered(), current.placement.before_uncovered());
                    new > old || (new == old && set > current.set)
                }
            };
            if better {
                best = Some(MoveUp { set, placement });
            }
        }
        best
    }

    /// Where the set would be placed if the new rule was covered by it, or
    /// `None` if the entries ahead of it already cover everything it covers.
    pub(crate) fn where_would_set_go(&mut self, set_name: &str) -> Option<Placement> {
        let last_rule = self.model.last_rule()?;
        let Some(set) = self.model.sets.get(set_name) else {
            error!(set = set_name, "set not in set infos");
            return None;
        };

        let mut compared: Vec<CoverEntry> = Vec::new();
        if let Some(front) = self.model.cover.first() {
            compared.push(front.clone());
        }
        for &rule in set.rules() {
            match self
                .model
                .rule_processing
                .get(rule as usize)
                .and_then(RuleProcessingInfo::first_covered_by)
            {
                Some(owner) => compared.push(owner.clone()),
                None if rule == last_rule => {}
                None => error!(rule, set = set_name, "rule is not covered"),
            }
        }
        for other in self.model.rules[last_rule as usize].sets() {
            let entry = CoverEntry::Set(other.clone());
            if self.model.set_processing.contains_key(&entry) {
                compared.push(entry);
            }
        }
        let mut uncovered: RoaringTreemap = set.rules().iter().copied().collect();

        if self.cover_order.len() != self.model.cover.len() {
            debug!("cover order out of date, rebuilding it");
            self.make_cover_order();
        }
        if !self.sort_by_cover_order(&mut compared) {
            error!(set = set_name, "compared entries missing from cover order");
            return None;
        }
        compared.dedup();
        for other in &compared {
            if let Some(placement) = self.better_than_set(other, &mut uncovered) {
                return Some(placement);
            }
        }
        if uncovered.is_empty() {
            None
        } else {
            Some(Placement::Append)
        }
    }

    fn sort_by_cover_order(&self, entries: &mut [CoverEntry]) -> bool {
        if entries.iter().any(|e| !self.cover_order.contains_key(e)) {
            return false;
        }
        entries.sort_by_key(|e| self.cover_order.get(e).copied());
        true
    }

    /// Compares the candidate's remaining rules with what `other` claims.
    ///
    /// Returns the placement before `other` if the candidate would claim
    /// strictly more. Otherwise removes the rules `other` claims from
    /// `uncovered`, so that later comparisons only see what is left.
    pub(crate) fn better_than_set(
        &self,
        other: &CoverEntry,
        uncovered: &mut RoaringTreemap,
    ) -> Option<Placement> {
        let last_rule = self.model.last_rule()?;
        let Some(processing) = self.model.set_processing.get(other) else {
            error!(set = %other, "compared entry has no processing info");
            return None;
        };
        let other_has_last = self.model.rules[last_rule as usize].is_covered_by(other.name());
        let other_covers = processing.num_rules() + u64::from(other_has_last);
        if uncovered.len() > other_covers {
            let Some(&position) = self.cover_order.get(other) else {
                error!(set = %other, "compared entry not in cover order");
                return None;
            };
            return Some(Placement::Before {
                position,
                before_uncovered: processing.num_uncovered,
            });
        }
        if other_has_last {
            uncovered.remove(last_rule);
        }
        *uncovered -= &processing.covers_rules;
        None
    }

    /// Puts a pending copy of the candidate into the cover.
    pub(crate) fn insert_pending(&mut self, move_up: &MoveUp) -> Result<CoverEntry> {
        let last_rule = self
            .model
            .last_rule()
            .ok_or_else(|| CoverError::EmptyInput("No rules have been registered".into()))?;
        let set = self.model.sets.get(&move_up.set).ok_or_else(|| {
            error!(set = %move_up.set, "set not in set infos");
            CoverError::NotFound(format!("Set {} is not known", move_up.set))
        })?;
        let mut processing = SetProcessingInfo::default();
        for &rule in set.rules() {
            if rule != last_rule {
                processing.add_rule(rule);
            }
        }
        let entry = CoverEntry::Pending(move_up.set.clone());
        self.model.set_processing.insert(entry.clone(), processing);
        match move_up.placement {
            Placement::Before { position, .. } if position <= self.model.cover.len() => {
                self.model.cover.insert(position, entry.clone())
            }
            Placement::Before { position, .. } => {
                warn!(set = %entry, position, "placement past the end of the cover, appending");
                self.model.cover.push(entry.clone());
            }
            Placement::Append => self.model.cover.push(entry.clone()),
        }
        self.make_cover_order();
        Ok(entry)
    }

    /// Takes a pending entry back out, leaving the new rule uncovered.
    fn discard_pending(&mut self, pending: &CoverEntry, last_rule: RuleId) {
        warn!(set = %pending, "discarding pending entry");
        self.model.cover.retain(|entry| entry != pending);
        self.model.set_processing.remove(pending);
        if let Some(rule_processing) = self.model.rule_processing.get_mut(last_rule as usize) {
            if rule_processing.first_covered_by() == Some(pending) {
                rule_processing.first_covered_by = None;
            }
        }
        self.make_cover_order();
    }

    fn first_entry_covering_last_rule(&self) -> Option<CoverEntry> {
        let last_rule = self.model.last_rule()?;
        let rule = &self.model.rules[last_rule as usize];
        self.model
            .cover
            .iter()
            .find(|entry| rule.is_covered_by(entry.name()))
            .cloned()
    }

    fn mark_last_rule(&mut self, last_rule: RuleId, winner: &CoverEntry) {
        let needed = last_rule as usize + 1;
        if self.model.rule_processing.len() + 1 < needed {
            warn!(
                missing = needed - self.model.rule_processing.len(),
                "rules registered without an update in between"
            );
        }
        if self.model.rule_processing.len() < needed {
            self.model
                .rule_processing
                .resize(needed, RuleProcessingInfo::default());
        }
        self.model.rule_processing[last_rule as usize] = RuleProcessingInfo::covered_by(winner.clone());
    }

    /// Gives the winner the new rule, then settles ownership of its rules.
    ///
    /// Rules claimed by an entry ahead of the winner stay there. Rules claimed
    /// by an entry behind it move to the winner.
    pub(crate) fn update_cover_rules(&mut self, winner: &CoverEntry) -> Result<()> {
        let last_rule = self
            .model
            .last_rule()
            .ok_or_else(|| CoverError::EmptyInput("No rules have been registered".into()))?;
        let Some(&winner_position) = self.cover_order.get(winner) else {
            error!(set = %winner, "winner not in cover order");
            return Err(CoverError::NotFound(format!("Set {} is not in the cover", winner)));
        };
        let Some(mut claimed) = self.model.set_processing.remove(winner) else {
            error!(set = %winner, "winner has no processing info");
            return Err(CoverError::NotFound(format!(
                "Set {} has no processing info",
                winner
            )));
        };
        claimed.add_rule(last_rule);

        let rules: Vec<RuleId> = claimed.covers_rules.iter().collect();
        for rule in rules {
            let Some(rule_processing) = self.model.rule_processing.get_mut(rule as usize) else {
                error!(rule, "rule has no processing info");
                continue;
            };
            let Some(owner) = rule_processing.first_covered_by.clone() else {
                warn!(rule, set = %winner, "uncovered rule claimed by winner");
                rule_processing.first_covered_by = Some(winner.clone());
                continue;
            };
            if &owner == winner {
                continue;
            }
            let Some(&owner_position) = self.cover_order.get(&owner) else {
                error!(rule, set = %owner, "owner not in cover order");
                continue;
            };
            if owner_position < winner_position {
                claimed.remove_rule(rule);
                continue;
            }
            let Some(owner_processing) = self.model.set_processing.get_mut(&owner) else {
                error!(rule, set = %owner, "owner has no processing info");
                continue;
            };
            owner_processing.remove_rule(rule);
            rule_processing.first_covered_by = Some(winner.clone());
        }
        self.model.set_processing.insert(winner.clone(), claimed);
        Ok(())
    }

    /// Recounts `num_uncovered` down the cover, returning entries that claim nothing.
    pub(crate) fn fix_num_uncovered(&mut self) -> Vec<CoverEntry> {
        let mut num_uncovered = self.model.rules.len() as u64;
        let mut empty = Vec::new();
        for entry in &self.model.cover {
            let processing = self
                .model
                .set_processing
                .entry(entry.clone())
                .or_insert_with(|| {
                    warn!(set = %entry, "cover entry without processing info");
                    SetProcessingInfo::default()
                });
            processing.num_uncovered = num_uncovered;
            num_uncovered = num_uncovered.saturating_sub(processing.num_rules());
            if processing.num_rules() == 0 {
                empty.push(entry.clone());
            }
        }
        empty
    }

    fn clean_up_empty_entries(&mut self, empty: &[CoverEntry]) {
        if empty.is_empty() {
            return;
        }
        let empty: HashSet<&CoverEntry, SetHasher> = empty.iter().collect();
        for entry in &empty {
            debug!(set = %entry, "dropping empty cover entry");
            self.model.set_processing.remove(*entry);
        }
        self.model.cover.retain(|entry| !empty.contains(entry));
        self.make_cover_order();
    }

    /// Turns the pending entry into the real one.
    ///
    /// An older entry for the same set that survived cleanup is merged into
    /// the resolved entry.
    fn resolve_pending(&mut self, pending: &CoverEntry) -> Result<()> {
        let resolved = pending.resolved();
        let Some(mut processing) = self.model.set_processing.remove(pending) else {
            error!(set = %pending, "pending entry has no processing info");
            return Err(CoverError::InconsistentState(format!(
                "Pending entry {} has no processing info",
                pending
            )));
        };
        let remnant = self.model.set_processing.remove(&resolved);
        if let Some(remnant) = &remnant {
            debug!(set = %resolved, rules = remnant.num_rules(), "merging older entry");
            processing.covers_rules |= &remnant.covers_rules;
            self.model.cover.retain(|entry| entry != &resolved);
        }
        for entry in self.model.cover.iter_mut() {
            if entry == pending {
                *entry = resolved.clone();
            }
        }
        for rule in processing.covers_rules.iter() {
            if let Some(rule_processing) = self.model.rule_processing.get_mut(rule as usize) {
                rule_processing.first_covered_by = Some(resolved.clone());
            }
        }
        self.model.set_processing.insert(resolved, processing);
        if remnant.is_some() {
            self.fix_num_uncovered();
        }
        self.make_cover_order();
        Ok(())
    }
}

impl CoverEngine for LazyCover {
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
        self.update_after_new_rule()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Rules {dog}, {cat} covered as [cat, dog], then {dog, rain} arrives.
    fn cat_dog_then_rain(cover: [&str; 2]) -> LazyCover {
        let mut lazy = LazyCover::new();
        lazy.register_rule(["dog"]).unwrap();
        lazy.register_rule(["cat"]).unwrap();
        lazy.model.replace_cover(cover);
        lazy.register_rule(["dog", "rain"]).unwrap();
        lazy.make_cover_order();
        lazy
    }

    #[test]
    fn set_moves_before_entry_it_beats() {
        let mut lazy = cat_dog_then_rain(["cat", "dog"]);
        assert_eq!(
            lazy.where_would_set_go("dog"),
            Some(Placement::Before {
                position: 0,
                before_uncovered: 2
            })
        );
        assert_eq!(lazy.where_would_set_go("rain"), None);
    }

    #[test]
    fn front_entry_is_not_beaten() {
        let mut lazy = cat_dog_then_rain(["dog", "cat"]);
        assert_eq!(lazy.where_would_set_go("dog"), None);
        assert_eq!(lazy.where_would_set_go("rain"), None);
    }

    #[test]
    fn better_than_set_strips_claimed_rules() {
        let lazy = cat_dog_then_rain(["dog", "cat"]);
        // dog claims rule 0 and also covers the new rule 2
        let mut uncovered: RoaringTreemap = [0u64, 2].into_iter().collect();
        assert_eq!(
            lazy.better_than_set(&CoverEntry::Set("dog".into()), &mut uncovered),
            None
        );
        assert!(uncovered.is_empty());

        let mut uncovered: RoaringTreemap = [0u64, 1, 2].into_iter().collect();
        assert_eq!(
            lazy.better_than_set(&CoverEntry::Set("cat".into()), &mut uncovered),
            Some(Placement::Before {
                position: 1,
                before_uncovered: 1
            })
        );
        assert_eq!(uncovered.len(), 3);
    }

    #[test]
    fn best_set_to_move_up_sequence() {
        let mut lazy = LazyCover::new();
        lazy.register_rule(["dog"]).unwrap();
        assert_eq!(
            lazy.best_set_to_move_up(),
            Some(MoveUp {
                set: "dog".into(),
                placement: Placement::Append
            })
        );
        lazy.update_cover().unwrap();

        lazy.register_rule(["dog", "cat"]).unwrap();
        lazy.make_cover_order();
        assert_eq!(lazy.best_set_to_move_up(), None);
        lazy.update_cover().unwrap();

        lazy.register_rule(["rain"]).unwrap();
        lazy.make_cover_order();
        assert_eq!(
            lazy.best_set_to_move_up(),
            Some(MoveUp {
                set: "rain".into(),
                placement: Placement::Append
            })
        );
    }

    #[test]
    fn insert_pending_leaves_new_rule_out() {
        let mut lazy = cat_dog_then_rain(["dog", "cat"]);
        lazy.register_rule(["rain"]).unwrap();
        let move_up = MoveUp {
            set: "rain".into(),
            placement: Placement::Before {
                position: 0,
                before_uncovered: 2,
            },
        };
        let entry = lazy.insert_pending(&move_up).unwrap();
        assert_eq!(entry, CoverEntry::Pending("rain".into()));
        assert_eq!(lazy.model.cover[0], entry);
        assert_eq!(lazy.cover_order.get(&entry), Some(&0));
        let processing = lazy.model.set_processing.get(&entry).unwrap();
        assert_eq!(processing.rules().iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn winner_takes_rules_from_later_entries_only() {
        let mut lazy = LazyCover::new();
        lazy.register_rule(["cat", "dog"]).unwrap();
        lazy.register_rule(["dog", "jam"]).unwrap();
        lazy.register_rule(["jam"]).unwrap();
        lazy.model.replace_cover(["cat", "jam"]);
        lazy.register_rule(["dog"]).unwrap();
        let move_up = MoveUp {
            set: "dog".into(),
            placement: Placement::Before {
                position: 1,
                before_uncovered: 2,
            },
        };
        let winner = lazy.insert_pending(&move_up).unwrap();
        lazy.mark_last_rule(3, &winner);
        lazy.update_cover_rules(&winner).unwrap();

        let claimed: Vec<RuleId> = lazy.model.set_processing[&winner].rules().iter().collect();
        assert_eq!(claimed, vec![1, 3]);
        let jam = &lazy.model.set_processing[&CoverEntry::Set("jam".into())];
        assert_eq!(jam.rules().iter().collect::<Vec<_>>(), vec![2]);
        assert_eq!(lazy.model.first_covered_by(0), Some("cat"));
        assert_eq!(lazy.model.first_covered_by(1), Some("dog"));
    }

    #[test]
    fn discarded_pending_entry_leaves_cover_as_before() {
        let mut lazy = LazyCover::new();
        for rule in [vec!["dog"], vec!["dog", "cat"], vec!["rain"]] {
            lazy.register_rule(rule).unwrap();
            lazy.update_cover().unwrap();
        }
        let cover = lazy.model.cover();
        let sets = lazy.model.set_processing_infos();

        lazy.register_rule(["rain"]).unwrap();
        let move_up = MoveUp {
            set: "rain".into(),
            placement: Placement::Before {
                position: 0,
                before_uncovered: 4,
            },
        };
        let pending = lazy.insert_pending(&move_up).unwrap();
        lazy.mark_last_rule(3, &pending);
        lazy.discard_pending(&pending, 3);

        assert_eq!(lazy.model.cover(), cover);
        assert_eq!(lazy.model.set_processing_infos(), sets);
        assert_eq!(lazy.model.first_covered_by(3), None);
        assert!(lazy.cover_order.get(&pending).is_none());
        assert_eq!(lazy.cover_order.len(), lazy.model.cover_len());
    }

    #[test]
    fn fix_num_uncovered_reports_empty_entries() {
        let mut lazy = LazyCover::new();
        lazy.register_rule(["cat", "dog"]).unwrap();
        lazy.register_rule(["cat"]).unwrap();
        lazy.model.replace_cover(["cat", "dog"]);
        let empty = lazy.fix_num_uncovered();
        assert_eq!(empty, vec![CoverEntry::Set("dog".into())]);
        lazy.clean_up_empty_entries(&empty);
        assert_eq!(lazy.model.cover(), vec!["cat"]);
        assert!(lazy.model.set_processing("dog").is_none());
        assert!(lazy.cover_order.get(&CoverEntry::Set("dog".into())).is_none());
    }
}
