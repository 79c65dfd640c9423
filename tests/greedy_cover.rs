use roaring::RoaringTreemap;
use setcover::engine::CoverEngine;
use setcover::error::CoverError;
use setcover::generate::{default_zipf, make_rules};
use setcover::greedy::GreedyCover;
use setcover::settings::GeneratorSettings;

fn assert_partition(greedy: &GreedyCover) {
    let model = greedy.model();
    let mut union = RoaringTreemap::new();
    let mut claimed = 0;
    for set in model.cover() {
        let processing = model.set_processing(&set).expect("cover entry has processing info");
        claimed += processing.num_rules();
        union |= processing.rules();
    }
    assert_eq!(claimed, model.num_rules() as u64, "no rule claimed twice");
    assert_eq!(union.len(), model.num_rules() as u64, "every rule claimed");
}

#[test]
fn picks_largest_set_first() {
    let mut greedy = GreedyCover::new();
    greedy.register_rule(["cat", "dog"]).unwrap();
    greedy.register_rule(["cat"]).unwrap();
    greedy.compute_cover().expect("cover computed");
    assert_eq!(greedy.cover(), vec!["cat"]);

    greedy.register_rule(["jam"]).unwrap();
    greedy.update_cover().expect("cover recomputed");
    assert_eq!(greedy.cover(), vec!["cat", "jam"]);
    assert_eq!(greedy.model().first_covered_by(0), Some("cat"));
    assert_eq!(greedy.model().first_covered_by(2), Some("jam"));
    assert_eq!(greedy.model().set_processing("jam").unwrap().num_uncovered(), 1);
    assert!(greedy.sanity_check());
}

#[test]
fn greater_name_wins_ties() {
    let mut greedy = GreedyCover::new();
    greedy.register_rule(["cat", "dog"]).unwrap();
    greedy.compute_cover().unwrap();
    assert_eq!(greedy.cover(), vec!["dog"], "dog sorts after cat");
}

#[test]
fn no_rules_is_empty_input() {
    let mut greedy = GreedyCover::new();
    let err = greedy.compute_cover().unwrap_err();
    assert!(matches!(err, CoverError::EmptyInput(_)));
    assert!(greedy.cover().is_empty());
}

#[test]
fn generated_rules_are_partitioned() {
    let settings = GeneratorSettings {
        num_rules: 1500,
        num_sets: 600,
        max_rules_per_set: 20,
        seed: 10,
    };
    let mut greedy = GreedyCover::new();
    for rule in make_rules(&settings, &default_zipf()).into_iter().filter(|r| !r.is_empty()) {
        greedy.register_rule(rule).unwrap();
    }
    greedy.compute_cover().expect("cover computed");
    assert_partition(&greedy);
    assert!(greedy.sanity_check());
    assert!(greedy.model().cover_len() <= greedy.model().num_sets());
}

#[test]
fn recompute_gives_same_cover() {
    let mut greedy = GreedyCover::new();
    for rule in [vec!["a", "b"], vec!["b", "c"], vec!["c"], vec!["d", "a"], vec!["b"]] {
        greedy.register_rule(rule).unwrap();
    }
    greedy.compute_cover().unwrap();
    let first = greedy.cover();
    greedy.compute_cover().unwrap();
    assert_eq!(greedy.cover(), first);
    assert_partition(&greedy);
}
