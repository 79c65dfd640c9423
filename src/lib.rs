//! Setcover – keeps an approximately minimal set cover over a growing stream of rules.
//!
//! A *rule* is something that must be covered, and every rule arrives with
//! the names of the *sets* covering it. The *cover* is an ordered selection
//! of sets that together cover every rule seen so far:
//! * A [`model::RuleId`] is a dense integer assigned in arrival order.
//! * A [`model::SetInfo`] lists the rules a set covers, growing as rules arrive.
//! * A [`model::RuleInfo`] lists the sets covering a rule and never changes.
//! * Every rule is *first covered by* the earliest cover entry covering it,
//!   and each entry records the rules it claims this way in a
//!   [`model::SetProcessingInfo`].
//!
//! All of this is owned by a [`model::CoverModel`], which in turn is owned by
//! exactly one engine at a time. Engines hand the model over by value.
//!
//! ## Modules
//! * [`model`] – Sets, rules, the cover and its processing state.
//! * [`heap`] – Max priority queue with keyed decrease.
//! * [`engine`] – The [`engine::CoverEngine`] trait shared by the engines.
//! * [`greedy`] – Computes a cover from scratch, within `1 + ln n` of optimal.
//! * [`lazy`] – Folds a single new rule into an existing cover.
//! * [`online`] – Lazy updates, with greedy rebuilds when the cover drifts.
//! * [`ruleset`] – Reading and writing rule sets as text.
//! * [`generate`] – Synthetic, Zipf-sized rule sets.
//! * [`evaluate`] – Times a greedy start followed by online streaming.
//! * [`settings`] – Defaults, config file and environment.
//!
//! ## Engines
//! The [`greedy::GreedyCover`] is the reference: it always produces a cover
//! within the classical greedy guarantee, but starts over every time. The
//! [`lazy::LazyCover`] only moves the sets touched by the new rule, which is
//! fast but heuristic. The [`online::OnlineCover`] runs lazy updates and
//! compares the result against the best greedy cover it has seen, rebuilding
//! when the lazy cover falls too far behind.
//!
//! ## Quick Start
//! ```
//! use setcover::engine::CoverEngine;
//! use setcover::online::OnlineCover;
//! let mut online = OnlineCover::new();
//! for rule in [vec!["dog"], vec!["dog", "cat"], vec!["rain"]] {
//!     online.register_rule(rule).unwrap();
//!     online.update_cover().unwrap();
//! }
//! assert_eq!(online.cover(), vec!["dog", "rain"]);
//! assert!(online.sanity_check());
//! ```
//!
//! ## Logging
//! Engines log through `tracing`, each inside its own span which can be
//! replaced at construction (`with_span`). Installing a subscriber is left to
//! the binary.

pub mod engine;
pub mod error;
pub mod evaluate;
pub mod generate;
pub mod greedy;
pub mod heap;
pub mod lazy;
pub mod model;
pub mod online;
pub mod ruleset;
pub mod settings;
