//! The fragment matcher.

use std::collections::{HashMap, HashSet};

/// The outcome of matching a fragment's type condition against a concrete typename.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchResult {
    Match,
    NoMatch,
    /// No possible-types information was available; the reader treats missing fields
    /// encountered under this fragment as tolerable rather than fatal.
    Heuristic,
}

/// Decides whether a fragment's type condition matches a concrete typename.
pub trait FragmentMatcher {
    fn matches(&self, type_condition: &str, actual_typename: Option<&str>) -> MatchResult;
}

/// The default matcher: without a possible-types map, equal typenames match and anything else
/// is `Heuristic`.
#[derive(Debug, Default)]
pub struct Heuristic;

impl FragmentMatcher for Heuristic {
    fn matches(&self, type_condition: &str, actual_typename: Option<&str>) -> MatchResult {
        match actual_typename {
            Some(typename) if typename == type_condition => MatchResult::Match,
            _ => MatchResult::Heuristic,
        }
    }
}

/// A matcher backed by an introspected `typename -> possible subtypes` map, giving definitive
/// answers for unions and interfaces, checking subtype inclusion transitively.
#[derive(Debug, Default)]
pub struct PossibleTypes(pub HashMap<String, HashSet<String>>);

impl PossibleTypes {
    pub fn new(map: HashMap<String, HashSet<String>>) -> Self {
        PossibleTypes(map)
    }

    fn includes(&self, type_condition: &str, typename: &str, seen: &mut HashSet<String>) -> bool {
        if type_condition == typename {
            return true;
        }
        if !seen.insert(type_condition.to_string()) {
            return false;
        }
        match self.0.get(type_condition) {
            Some(subtypes) => subtypes
                .iter()
                .any(|subtype| subtype == typename || self.includes(subtype, typename, seen)),
            None => false,
        }
    }
}

impl FragmentMatcher for PossibleTypes {
    fn matches(&self, type_condition: &str, actual_typename: Option<&str>) -> MatchResult {
        match actual_typename {
            Some(typename) => {
                if self.includes(type_condition, typename, &mut HashSet::new()) {
                    MatchResult::Match
                } else {
                    MatchResult::NoMatch
                }
            }
            None => MatchResult::Heuristic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_matches_equal_typenames_only() {
        let m = Heuristic;
        assert_eq!(m.matches("A", Some("A")), MatchResult::Match);
        assert_eq!(m.matches("U", Some("A")), MatchResult::Heuristic);
        assert_eq!(m.matches("U", None), MatchResult::Heuristic);
    }

    #[test]
    fn s5_possible_types_resolves_union_definitively() {
        let mut map = HashMap::new();
        map.insert("U".to_string(), HashSet::from(["A".to_string(), "B".to_string()]));
        let m = PossibleTypes::new(map);
        assert_eq!(m.matches("U", Some("A")), MatchResult::Match);
        assert_eq!(m.matches("U", Some("C")), MatchResult::NoMatch);
    }

    #[test]
    fn invariant_7_possible_types_accepts_everything_heuristic_does_when_typename_present() {
        let mut map = HashMap::new();
        map.insert("A".to_string(), HashSet::new());
        let introspected = PossibleTypes::new(map);
        let heuristic = Heuristic;
        assert_eq!(heuristic.matches("A", Some("A")), MatchResult::Match);
        assert_eq!(introspected.matches("A", Some("A")), MatchResult::Match);
    }

    #[test]
    fn transitive_subtype_inclusion_is_checked() {
        let mut map = HashMap::new();
        map.insert("Node".to_string(), HashSet::from(["Entity".to_string()]));
        map.insert("Entity".to_string(), HashSet::from(["A".to_string()]));
        let m = PossibleTypes::new(map);
        assert_eq!(m.matches("Node", Some("A")), MatchResult::Match);
    }
}
