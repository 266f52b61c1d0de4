//! Static fact lookup over a small in-memory topic table.

use crate::handlers::query_text;
use crate::registry::{Handler, HandlerOutput};
use serde_json::{Value, json};
use std::pin::Pin;

const FACTS: &[(&str, &str)] = &[
    (
        "rust",
        "Rust is a systems programming language focused on safety and performance.",
    ),
    (
        "python",
        "Python is a general-purpose programming language known for readability.",
    ),
    (
        "surrealdb",
        "SurrealDB is a multi-model database with an SQL-like query language.",
    ),
    (
        "tokio",
        "Tokio is an asynchronous runtime for the Rust programming language.",
    ),
];

pub struct LookupHandler;

impl Handler for LookupHandler {
    fn name(&self) -> &str {
        "lookup"
    }

    fn description(&self) -> &str {
        "Answers definition questions from a static fact table."
    }

    fn trigger_keywords(&self) -> &[&str] {
        &["what is", "who is", "define", "tell me about"]
    }

    fn invoke(
        &self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = HandlerOutput> + Send + '_>> {
        let output = match query_text(&input) {
            Some(query) => lookup(query),
            None => HandlerOutput::error("input is missing a `query` string"),
        };
        Box::pin(async move { output })
    }
}

fn lookup(query: &str) -> HandlerOutput {
    let lower = query.to_lowercase();
    for (topic, fact) in FACTS {
        if lower.contains(topic) {
            return HandlerOutput::success(json!(fact));
        }
    }
    HandlerOutput::error(format!("no fact found for query: {}", query))
}
