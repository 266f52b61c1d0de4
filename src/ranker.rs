//! Lexical candidate ranking.
//!
//! Deliberately not semantic: each handler carries a trigger keyword set,
//! and the score is a weighted count of keywords found in the normalized
//! query. Ties (including the all-zero case) fall back to the registry's
//! static priority order so the result is reproducible and never depends
//! on map iteration order.

use crate::registry::HandlerRegistry;
use crate::types::{HandlerName, normalize_query};
use std::collections::HashSet;
use std::sync::Arc;

/// Weight applied per matched trigger keyword.
const KEYWORD_WEIGHT: u32 = 5;

/// Orders candidate handlers for a query.
#[derive(Clone)]
pub struct Ranker {
    registry: Arc<HandlerRegistry>,
}

impl Ranker {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Rank all registered handlers for `query`, excluding anything in
    /// `excluded`. Deterministic for identical (query, excluded, registry)
    /// triples. When no handler scores above zero the remaining registry is
    /// returned in static priority order, so the controller always has
    /// something left to try while candidates remain.
    pub fn rank(&self, query: &str, excluded: &HashSet<HandlerName>) -> Vec<HandlerName> {
        let normalized = normalize_query(query);

        let mut scored: Vec<(u32, usize, HandlerName)> = self
            .registry
            .names()
            .iter()
            .filter(|name| !excluded.contains(*name))
            .map(|name| {
                (
                    self.score(&normalized, name),
                    self.registry.priority(name),
                    name.clone(),
                )
            })
            .collect();

        // Primary: keyword score, descending. Secondary: static priority
        // index, ascending.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        scored.into_iter().map(|(_, _, name)| name).collect()
    }

    fn score(&self, normalized_query: &str, name: &HandlerName) -> u32 {
        let Some(handler) = self.registry.get(name) else {
            return 0;
        };

        let hits = handler
            .trigger_keywords()
            .iter()
            .filter(|kw| normalized_query.contains(&kw.to_lowercase()))
            .count() as u32;

        hits * KEYWORD_WEIGHT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerOutput;
    use crate::registry::testing::StaticHandler;
    use serde_json::json;

    fn registry() -> Arc<HandlerRegistry> {
        Arc::new(
            HandlerRegistry::new()
                .register_handler(StaticHandler::new(
                    "calc",
                    &["+", "*", "/", "calculate", "compute"],
                    HandlerOutput::success(json!(0)),
                ))
                .register_handler(StaticHandler::new(
                    "unit_convert",
                    &["km", "mile", "convert"],
                    HandlerOutput::success(json!(0)),
                ))
                .register_handler(StaticHandler::new(
                    "lookup_fact",
                    &["what is", "who is", "define"],
                    HandlerOutput::success(json!(0)),
                )),
        )
    }

    #[test]
    fn test_keyword_match_ranks_first() {
        let ranker = Ranker::new(registry());
        let ranked = ranker.rank("convert 10 miles to km", &HashSet::new());
        assert_eq!(ranked[0], HandlerName::new("unit_convert"));
    }

    #[test]
    fn test_arithmetic_query_prefers_calc() {
        let ranker = Ranker::new(registry());
        let ranked = ranker.rank("12*(3+4)/2", &HashSet::new());
        assert_eq!(ranked[0], HandlerName::new("calc"));
    }

    #[test]
    fn test_excluded_names_never_returned() {
        let ranker = Ranker::new(registry());
        let excluded: HashSet<_> = [HandlerName::new("unit_convert")].into_iter().collect();

        let ranked = ranker.rank("convert 10 miles to km", &excluded);
        assert!(!ranked.contains(&HandlerName::new("unit_convert")));
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_zero_score_falls_back_to_static_order() {
        let ranker = Ranker::new(registry());
        let ranked = ranker.rank("completely unrelated text", &HashSet::new());

        assert_eq!(
            ranked,
            vec![
                HandlerName::new("calc"),
                HandlerName::new("unit_convert"),
                HandlerName::new("lookup_fact"),
            ]
        );
    }

    #[test]
    fn test_deterministic_for_identical_inputs() {
        let ranker = Ranker::new(registry());
        let a = ranker.rank("what is python", &HashSet::new());
        let b = ranker.rank("what is python", &HashSet::new());
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_excluded_yields_empty() {
        let ranker = Ranker::new(registry());
        let excluded: HashSet<_> = registry().names().iter().cloned().collect();
        assert!(ranker.rank("anything", &excluded).is_empty());
    }
}
