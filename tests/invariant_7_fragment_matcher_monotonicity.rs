use normalized_cache::{FragmentMatcher, Heuristic, MatchResult, PossibleTypes};
use std::collections::{HashMap, HashSet};

#[test]
fn anything_the_heuristic_matcher_accepts_the_introspection_matcher_also_accepts_when_typename_is_known() {
    let heuristic = Heuristic;

    let mut possible_types = HashMap::new();
    possible_types.insert("U".to_string(), HashSet::from(["A".to_string(), "B".to_string()]));
    let introspection = PossibleTypes::new(possible_types);

    let cases = [("U", "A"), ("U", "B"), ("A", "A")];
    for (condition, typename) in cases {
        let heuristic_result = heuristic.matches(condition, Some(typename));
        if !matches!(heuristic_result, MatchResult::NoMatch) {
            let introspection_result = introspection.matches(condition, Some(typename));
            assert!(
                !matches!(introspection_result, MatchResult::NoMatch),
                "introspection must accept ({condition}, {typename}) since the heuristic matcher did",
            );
        }
    }
}
