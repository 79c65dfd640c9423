use setcover::engine::CoverEngine;
use setcover::error::CoverError;
use setcover::generate::{default_zipf, make_rules};
use setcover::greedy::GreedyCover;
use setcover::online::OnlineCover;
use setcover::settings::GeneratorSettings;

fn generated(num_rules: usize, num_sets: usize, seed: u64) -> Vec<Vec<String>> {
    let settings = GeneratorSettings {
        num_rules,
        num_sets,
        max_rules_per_set: 20,
        seed,
    };
    make_rules(&settings, &default_zipf())
        .into_iter()
        .filter(|r| !r.is_empty())
        .collect()
}

#[test]
fn follows_lazy_scenario() {
    let mut online = OnlineCover::new();
    for rule in [vec!["dog"], vec!["dog", "cat"], vec!["rain"], vec!["rain"], vec!["rain"]] {
        online.register_rule(rule).unwrap();
        online.update_cover().expect("cover updated");
        assert!(online.sanity_check());
    }
    assert_eq!(online.cover(), vec!["rain", "dog"]);
    assert_eq!(online.rebuilds(), 0, "no baseline, nothing to compare against");
}

#[test]
fn add_and_update_alternate() {
    let mut online = OnlineCover::new();
    assert!(matches!(online.update_cover(), Err(CoverError::InvalidCall(_))));

    online.register_rule(["dog"]).unwrap();
    assert!(!online.sanity_check(), "rule not yet folded in");
    let err = online.register_rule(["cat"]).unwrap_err();
    assert!(matches!(err, CoverError::InvalidCall(_)));
    assert_eq!(online.model().num_rules(), 1, "rejected rule left no trace");

    online.update_cover().unwrap();
    assert!(matches!(online.update_cover(), Err(CoverError::InvalidCall(_))));
    assert!(online.sanity_check());
}

#[test]
fn never_rebuilds_without_baseline() {
    let mut online = OnlineCover::new();
    for rule in generated(800, 300, 21) {
        online.register_rule(rule).unwrap();
        online.update_cover().unwrap();
    }
    assert!(online.good_enough());
    let stats = online.stats();
    assert_eq!(stats.rebuilds, 0);
    assert_eq!(stats.best_greedy_fraction, 1.0);
    assert!(online.sanity_check());
}

#[test]
fn seeded_from_greedy() {
    let rules = generated(1500, 600, 10);
    let (seed, rest) = rules.split_at(700);

    let mut greedy = GreedyCover::new();
    for rule in seed {
        greedy.register_rule(rule.iter().cloned()).unwrap();
    }
    greedy.compute_cover().unwrap();
    let greedy_size = greedy.model().cover_len();

    let mut online = OnlineCover::from_greedy(greedy);
    assert_eq!(online.cover().len(), greedy_size);
    assert!(online.best_greedy_fraction() <= 1.0);
    assert!(online.sanity_check());

    for rule in rest {
        online.register_rule(rule.iter().cloned()).unwrap();
        online.update_cover().expect("cover updated");
    }
    assert!(online.sanity_check());
    let stats = online.show_stats();
    assert_eq!(stats.rules, rules.len());
    assert_eq!(stats.updates as usize, rest.len());
    assert!(stats.optimal_lower_bound >= 1.0);
    assert!(stats.rebuild_rate <= 1.0);
}

#[test]
fn rebuild_lowers_the_baseline() {
    let mut online = OnlineCover::new();
    for rule in [vec!["a", "b"], vec!["b"], vec!["c"], vec!["a", "c"]] {
        online.register_rule(rule).unwrap();
        online.update_cover().unwrap();
    }
    online.rebuild().expect("rebuilt");
    assert_eq!(online.rebuilds(), 1);
    assert!(online.best_greedy_fraction() < 1.0);
    assert!(online.sanity_check());
    assert_eq!(online.stats().cover_size, online.cover().len());
}
