//! Property tests for include/exclude field rules

use conservator::fields::FieldRequest;
use conservator::query::render_selection;
use conservator::schema::{DATASET, DATASET_FRAME};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "repository", "master"]).prop_map(str::to_string)
}

fn path() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..4).prop_map(|s| s.join("."))
}

/// (path, include?) rules in insertion order.
fn rules() -> impl Strategy<Value = Vec<(String, bool)>> {
    prop::collection::vec((path(), any::<bool>()), 0..6)
}

fn build(rules: &[(String, bool)]) -> FieldRequest {
    let mut request = FieldRequest::new();
    for (path, include) in rules {
        if *include {
            request.include(path).unwrap();
        } else {
            request.exclude(path).unwrap();
        }
    }
    request
}

proptest! {
    #[test]
    fn prop_queries_do_not_change_the_request(rules in rules(), probe in path()) {
        let request = build(&rules);
        let before = request.clone();
        let first = request.should_include_path(&probe);
        let all = request.should_include_all_subpaths(&probe);
        prop_assert_eq!(request.should_include_path(&probe), first);
        prop_assert_eq!(request.should_include_all_subpaths(&probe), all);
        prop_assert_eq!(request, before);
    }

    #[test]
    fn prop_latest_rule_wins_on_same_path(rules in rules(), target in path(), include in any::<bool>()) {
        let mut request = build(&rules);
        if include {
            request.include(&target).unwrap();
        } else {
            request.exclude(&target).unwrap();
        }
        // A wildcard never appears in generated rules, so the exact rule decides.
        prop_assert_eq!(request.should_include_path(&target) || !include, true);
        if !include {
            prop_assert!(!request.should_include_all_subpaths(&target));
        }
    }

    #[test]
    fn prop_more_specific_include_beats_exclude(parent in path(), child in segment(), include_first in any::<bool>()) {
        let nested = format!("{}.{}", parent, child);
        let mut request = FieldRequest::new();
        if include_first {
            request.include(&nested).unwrap();
            request.exclude(&parent).unwrap();
        } else {
            request.exclude(&parent).unwrap();
            request.include(&nested).unwrap();
        }
        prop_assert!(request.should_include_path(&nested));
        // The parent stays selected as a container of the include.
        prop_assert!(request.should_include_path(&parent));
        prop_assert!(!request.should_include_all_subpaths(&parent));
    }

    #[test]
    fn prop_include_selects_every_ancestor(target in path()) {
        let request = FieldRequest::create([target.as_str()]).unwrap();
        let segments: Vec<&str> = target.split('.').collect();
        for end in 1..=segments.len() {
            let prefix = segments[..end].join(".");
            prop_assert!(request.should_include_path(&prefix), "ancestor {} of {}", prefix, target);
        }
    }

    #[test]
    fn prop_rendering_is_deterministic(rules in rules()) {
        let request = build(&rules);
        prop_assert_eq!(
            render_selection(&DATASET, &request),
            render_selection(&DATASET, &request)
        );
        prop_assert_eq!(
            render_selection(&DATASET_FRAME, &request),
            render_selection(&DATASET_FRAME, &request.clone())
        );
    }
}

#[test]
fn test_merged_request_appends_rules_in_order() {
    let mut runner = proptest::test_runner::TestRunner::default();
    runner
        .run(&(rules(), rules(), path()), |(left, right, probe)| {
            let merged = build(&left).merged_with(&build(&right));
            let mut combined = left.clone();
            combined.extend(right.iter().cloned());
            let expected = build(&combined);
            prop_assert_eq!(
                merged.should_include_path(&probe),
                expected.should_include_path(&probe)
            );
            Ok(())
        })
        .unwrap();
}
