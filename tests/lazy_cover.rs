use setcover::engine::CoverEngine;
use setcover::error::CoverError;
use setcover::generate::{default_zipf, make_rules};
use setcover::greedy::GreedyCover;
use setcover::lazy::LazyCover;
use setcover::settings::GeneratorSettings;

fn add(lazy: &mut LazyCover, sets: &[&str]) {
    lazy.register_rule(sets.iter().copied()).expect("rule registered");
    lazy.update_cover().expect("cover updated");
    assert!(lazy.sanity_check(), "cover consistent after {:?}", sets);
}

#[test]
fn rain_moves_to_front() {
    let mut lazy = LazyCover::new();
    add(&mut lazy, &["dog"]);
    assert_eq!(lazy.cover(), vec!["dog"]);

    add(&mut lazy, &["dog", "cat"]);
    assert_eq!(lazy.cover(), vec!["dog"]);

    add(&mut lazy, &["rain"]);
    assert_eq!(lazy.cover(), vec!["dog", "rain"]);
    let model = lazy.model();
    assert_eq!(model.first_covered_by(0), Some("dog"));
    assert_eq!(model.first_covered_by(1), Some("dog"));
    assert_eq!(model.first_covered_by(2), Some("rain"));

    add(&mut lazy, &["rain"]);
    assert_eq!(lazy.cover(), vec!["dog", "rain"], "rain ties with dog, dog stays first");

    add(&mut lazy, &["rain"]);
    assert_eq!(lazy.cover(), vec!["rain", "dog"]);
    let model = lazy.model();
    assert_eq!(model.set_processing("rain").unwrap().num_uncovered(), 5);
    assert_eq!(model.set_processing("dog").unwrap().num_uncovered(), 2);
}

#[test]
fn update_without_rules_is_empty_input() {
    let mut lazy = LazyCover::new();
    assert!(matches!(lazy.update_cover(), Err(CoverError::EmptyInput(_))));
}

#[test]
fn continues_from_greedy_cover() {
    let mut greedy = GreedyCover::new();
    greedy.register_rule(["cat", "dog"]).unwrap();
    greedy.register_rule(["cat"]).unwrap();
    greedy.compute_cover().unwrap();

    let mut lazy = LazyCover::from_model(greedy.into_model());
    add(&mut lazy, &["dog"]);
    add(&mut lazy, &["jam"]);
    assert_eq!(lazy.cover().len(), 3);
    assert_eq!(lazy.model().num_rules(), 4);
}

#[test]
fn generated_stream_stays_consistent() {
    let settings = GeneratorSettings {
        num_rules: 600,
        num_sets: 250,
        max_rules_per_set: 15,
        seed: 4,
    };
    let mut lazy = LazyCover::new();
    for rule in make_rules(&settings, &default_zipf()) {
        if rule.is_empty() {
            continue;
        }
        lazy.register_rule(rule).unwrap();
        lazy.update_cover().expect("cover updated");
        assert!(lazy.sanity_check());
    }
    let model = lazy.model();
    assert!(model.num_rules() > 0);
    assert!(model.cover_len() <= model.num_sets());
}
