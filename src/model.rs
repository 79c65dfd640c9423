//! The shared cover model.
//!
//! A [`CoverModel`] owns everything the cover algorithms work on:
//! * the sets, each with the append-only list of rules it covers,
//! * the rules, each with the immutable list of sets covering it,
//! * the ordered cover,
//! * the processing state kept for cover entries and rules.
//!
//! The model carries no algorithm of its own beyond registering rules and
//! rebuilding processing state from the current cover order. Engines own a
//! model exclusively and hand it over by value when control moves between
//! them.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::BuildHasherDefault;

use roaring::RoaringTreemap;
use seahash::SeaHasher;
use tracing::{info, warn};

use crate::error::{CoverError, Result};

// ------------- Identities -------------
pub type RuleId = u64;

pub type SetHasher = BuildHasherDefault<SeaHasher>;

// ------------- Set -------------
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetInfo {
    all_rules: Vec<RuleId>, // only ever appended to, as new rules arrive
}
impl SetInfo {
    pub fn new() -> Self {
        Self {
            all_rules: Vec::new(),
        }
    }
    pub fn add_rule(&mut self, rule: RuleId) {
        self.all_rules.push(rule);
    }
    pub fn rules(&self) -> &[RuleId] {
        &self.all_rules
    }
    pub fn len(&self) -> usize {
        self.all_rules.len()
    }
    pub fn is_empty(&self) -> bool {
        self.all_rules.is_empty()
    }
}

// ------------- Rule -------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleInfo {
    all_sets: Vec<String>,
}
impl RuleInfo {
    pub fn new(all_sets: Vec<String>) -> Self {
        Self { all_sets }
    }
    // Only a getter, so that rules stay immutable after creation.
    pub fn sets(&self) -> &[String] {
        &self.all_sets
    }
    pub fn is_covered_by(&self, set_name: &str) -> bool {
        self.all_sets.iter().any(|s| s == set_name)
    }
}

// ------------- CoverEntry -------------
/// An element of the cover.
///
/// `Pending` marks the copy of a set that an incremental update is moving
/// up in the cover while the set itself may still sit further down. It is
/// resolved back into `Set` before the update returns.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CoverEntry {
    Set(String),
    Pending(String),
}
impl CoverEntry {
    pub fn name(&self) -> &str {
        match self {
            CoverEntry::Set(name) | CoverEntry::Pending(name) => name,
        }
    }
    pub fn is_pending(&self) -> bool {
        matches!(self, CoverEntry::Pending(_))
    }
    pub fn resolved(&self) -> CoverEntry {
        CoverEntry::Set(self.name().to_owned())
    }
}
impl fmt::Display for CoverEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CoverEntry::Set(name) => write!(f, "{}", name),
            CoverEntry::Pending(name) => write!(f, "{} (pending)", name),
        }
    }
}

// ------------- Processing -------------
#[derive(Clone, Debug, PartialEq)]
pub struct SetProcessingInfo {
    // rules this entry is the first in cover order to cover
    pub(crate) covers_rules: RoaringTreemap,
    // rules still uncovered just before this entry was placed in the cover
    pub(crate) num_uncovered: u64,
}
impl SetProcessingInfo {
    pub fn new(num_uncovered: u64) -> Self {
        Self {
            covers_rules: RoaringTreemap::new(),
            num_uncovered,
        }
    }
    pub fn add_rule(&mut self, rule: RuleId) {
        self.covers_rules.insert(rule);
    }
    pub fn remove_rule(&mut self, rule: RuleId) {
        self.covers_rules.remove(rule);
    }
    pub fn covers(&self, rule: RuleId) -> bool {
        self.covers_rules.contains(rule)
    }
    pub fn rules(&self) -> &RoaringTreemap {
        &self.covers_rules
    }
    pub fn num_rules(&self) -> u64 {
        self.covers_rules.len()
    }
    pub fn num_uncovered(&self) -> u64 {
        self.num_uncovered
    }
    /// Share of the then-uncovered rules this entry claimed.
    pub fn greedy_fraction(&self) -> Option<f64> {
        if self.num_uncovered == 0 {
            return None;
        }
        Some(self.num_rules() as f64 / self.num_uncovered as f64)
    }
}
impl Default for SetProcessingInfo {
    fn default() -> Self {
        Self::new(0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleProcessingInfo {
    pub(crate) first_covered_by: Option<CoverEntry>,
}
impl RuleProcessingInfo {
    pub fn covered_by(entry: CoverEntry) -> Self {
        Self {
            first_covered_by: Some(entry),
        }
    }
    pub fn first_covered_by(&self) -> Option<&CoverEntry> {
        self.first_covered_by.as_ref()
    }
    pub fn is_covered(&self) -> bool {
        self.first_covered_by.is_some()
    }
}

// ------------- CoverModel -------------
#[derive(Debug, Default)]
pub struct CoverModel {
    pub(crate) sets: HashMap<String, SetInfo, SetHasher>,
    pub(crate) rules: Vec<RuleInfo>,
    pub(crate) set_processing: HashMap<CoverEntry, SetProcessingInfo, SetHasher>,
    pub(crate) rule_processing: Vec<RuleProcessingInfo>,
    pub(crate) cover: Vec<CoverEntry>,
}

impl CoverModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule covered by the given sets and returns its id.
    ///
    /// Ids are dense and follow insertion order. Sets are created on first
    /// reference. A name repeated within one call is appended once per
    /// occurrence; callers are expected not to do that.
    pub fn register_rule<I, S>(&mut self, covering_sets: I) -> Result<RuleId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let all_sets: Vec<String> = covering_sets.into_iter().map(Into::into).collect();
        if all_sets.is_empty() {
            warn!("rule without any covering set ignored");
            return Err(CoverError::EmptyInput(
                "A rule needs at least one covering set".into(),
            ));
        }
        let rule = self.rules.len() as RuleId;
        for set_name in &all_sets {
            match self.sets.entry(set_name.clone()) {
                Entry::Occupied(mut e) => e.get_mut().add_rule(rule),
                Entry::Vacant(e) => e.insert(SetInfo::new()).add_rule(rule),
            }
        }
        self.rules.push(RuleInfo::new(all_sets));
        Ok(rule)
    }

    /// Rebuilds the processing state by walking the cover in order.
    ///
    /// Each rule is claimed by the first entry covering it, and every entry
    /// records how many rules were still uncovered when it was reached. The
    /// cover itself is left untouched.
    pub fn reset_processing_info(&mut self) {
        self.clear_processing_info();
        let mut num_uncovered = self.rules.len() as u64;
        if self.cover.is_empty() {
            warn!("cover is empty, every rule stays uncovered");
            return;
        }
        for entry in &self.cover {
            let Some(set) = self.sets.get(entry.name()) else {
                warn!(set = %entry, "set not in set infos");
                continue;
            };
            let processing = match self.set_processing.entry(entry.clone()) {
                Entry::Occupied(_) => {
                    info!(set = %entry, "duplicate in cover");
                    continue;
                }
                Entry::Vacant(e) => e.insert(SetProcessingInfo::new(num_uncovered)),
            };
            for &rule in set.rules() {
                let Some(rule_processing) = self.rule_processing.get_mut(rule as usize) else {
                    warn!(rule, "rule not in rule infos");
                    continue;
                };
                if rule_processing.is_covered() {
                    continue;
                }
                rule_processing.first_covered_by = Some(entry.clone());
                processing.add_rule(rule);
                num_uncovered -= 1;
            }
        }
    }

    /// Marks every rule uncovered and forgets all entry processing info.
    pub(crate) fn clear_processing_info(&mut self) {
        self.set_processing.clear();
        self.rule_processing = vec![RuleProcessingInfo::default(); self.rules.len()];
    }

    /// Replaces the cover with the given set order and rebuilds processing state.
    pub fn replace_cover<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cover = names.into_iter().map(|n| CoverEntry::Set(n.into())).collect();
        self.reset_processing_info();
    }

    // Read access
    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }
    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }
    pub fn cover_len(&self) -> usize {
        self.cover.len()
    }
    pub fn last_rule(&self) -> Option<RuleId> {
        self.rules.len().checked_sub(1).map(|r| r as RuleId)
    }
    pub fn cover(&self) -> Vec<String> {
        self.cover.iter().map(|e| e.name().to_owned()).collect()
    }
    pub fn cover_entries(&self) -> &[CoverEntry] {
        &self.cover
    }
    pub fn set_info(&self, name: &str) -> Option<&SetInfo> {
        self.sets.get(name)
    }
    pub fn rule_info(&self, rule: RuleId) -> Option<&RuleInfo> {
        self.rules.get(rule as usize)
    }
    pub fn set_processing(&self, name: &str) -> Option<&SetProcessingInfo> {
        self.set_processing.get(&CoverEntry::Set(name.to_owned()))
    }
    pub fn first_covered_by(&self, rule: RuleId) -> Option<&str> {
        self.rule_processing
            .get(rule as usize)
            .and_then(|rp| rp.first_covered_by())
            .map(CoverEntry::name)
    }

    // Snapshots, copied so callers never alias the live structures
    pub fn set_infos(&self) -> HashMap<String, SetInfo, SetHasher> {
        self.sets.clone()
    }
    pub fn rule_infos(&self) -> Vec<RuleInfo> {
        self.rules.clone()
    }
    pub fn set_processing_infos(&self) -> HashMap<String, SetProcessingInfo, SetHasher> {
        self.set_processing
            .iter()
            .map(|(entry, sp)| (entry.name().to_owned(), sp.clone()))
            .collect()
    }
    pub fn rule_processing_infos(&self) -> Vec<RuleProcessingInfo> {
        self.rule_processing.clone()
    }

    /// Greedy fractions of the current cover entries, in cover order.
    pub fn greedy_fractions(&self) -> impl Iterator<Item = f64> + '_ {
        self.cover
            .iter()
            .filter_map(|entry| self.set_processing.get(entry))
            .filter_map(SetProcessingInfo::greedy_fraction)
    }

    /// Checks that cover and processing state agree with each other.
    ///
    /// Every entry must be resolved, unique and have processing info whose
    /// `num_uncovered` matches a running recount. Every claimed rule must
    /// point back at its claiming entry, no rule may be claimed twice, and
    /// every rule must be claimed.
    pub fn verify(&self) -> Result<()> {
        let mut num_uncovered = self.rules.len() as u64;
        let mut claimed = RoaringTreemap::new();
        let mut seen: HashSet<&CoverEntry, SetHasher> = HashSet::default();
        for entry in &self.cover {
            if entry.is_pending() {
                return Err(CoverError::InconsistentState(format!(
                    "Cover entry {} was never resolved",
                    entry
                )));
            }
            if !seen.insert(entry) {
                return Err(CoverError::InconsistentState(format!(
                    "Set {} is in the cover twice",
                    entry
                )));
            }
            let processing = self.set_processing.get(entry).ok_or_else(|| {
                CoverError::InconsistentState(format!("Set {} has no processing info", entry))
            })?;
            if processing.num_uncovered != num_uncovered {
                return Err(CoverError::InconsistentState(format!(
                    "Set {} says {} uncovered rules, expected {}",
                    entry, processing.num_uncovered, num_uncovered
                )));
            }
            for rule in processing.covers_rules.iter() {
                let first = self
                    .rule_processing
                    .get(rule as usize)
                    .ok_or_else(|| {
                        CoverError::InconsistentState(format!(
                            "Rule {} in set {} has no processing info",
                            rule, entry
                        ))
                    })?
                    .first_covered_by();
                if first != Some(entry) {
                    return Err(CoverError::InconsistentState(format!(
                        "Rule {} is claimed by set {} but first covered by {}",
                        rule,
                        entry,
                        first.map_or_else(|| "nothing".to_owned(), ToString::to_string)
                    )));
                }
                if !claimed.insert(rule) {
                    return Err(CoverError::InconsistentState(format!(
                        "Rule {} is claimed twice",
                        rule
                    )));
                }
                num_uncovered -= 1;
            }
        }
        if claimed.len() != self.rules.len() as u64 {
            return Err(CoverError::InconsistentState(format!(
                "Only {} of {} rules are covered",
                claimed.len(),
                self.rules.len()
            )));
        }
        Ok(())
    }
}
