//! Rule sets in their text form: one rule per line, holding the
//! whitespace-separated names of the sets covering it.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::SetHasher;

pub type Rules = Vec<Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleSetSummary {
    pub rules: usize,
    pub sets: usize,
    pub max_sets_per_rule: usize,
    /// Sets by ascending number of rules, ties by name.
    pub rules_per_set: Vec<(String, usize)>,
}

pub fn parse_rules<R: BufRead>(reader: R) -> Result<Rules> {
    let mut rules = Rules::new();
    for line in reader.lines() {
        let line = line?;
        let sets: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
        if !sets.is_empty() {
            rules.push(sets);
        }
    }
    Ok(rules)
}

pub fn read_rules(path: impl AsRef<Path>) -> Result<Rules> {
    let path = path.as_ref();
    let rules = parse_rules(BufReader::new(File::open(path)?))?;
    debug!(path = %path.display(), rules = rules.len(), "read rules");
    Ok(rules)
}

/// Writes the non-empty rules to `path`, replacing whatever was there.
pub fn write_rules(rules: &[Vec<String>], path: impl AsRef<Path>) -> Result<RuleSetSummary> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    for rule in rules.iter().filter(|r| !r.is_empty()) {
        writeln!(writer, "{}", rule.join(" "))?;
    }
    writer.flush()?;
    let summary = summarize(rules);
    info!(
        path = %path.display(),
        rules = summary.rules,
        max_sets_per_rule = summary.max_sets_per_rule,
        "wrote rules"
    );
    Ok(summary)
}

/// Summarizes the non-empty rules.
pub fn summarize(rules: &[Vec<String>]) -> RuleSetSummary {
    let mut counts: HashMap<&str, usize, SetHasher> = HashMap::default();
    let mut summary = RuleSetSummary::default();
    for rule in rules.iter().filter(|r| !r.is_empty()) {
        summary.rules += 1;
        summary.max_sets_per_rule = summary.max_sets_per_rule.max(rule.len());
        for set in rule {
            *counts.entry(set.as_str()).or_insert(0) += 1;
        }
    }
    summary.sets = counts.len();
    let mut rules_per_set: Vec<(String, usize)> =
        counts.into_iter().map(|(s, n)| (s.to_owned(), n)).collect();
    rules_per_set.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    summary.rules_per_set = rules_per_set;
    summary
}
