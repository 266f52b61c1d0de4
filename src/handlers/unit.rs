//! Unit conversion handler. Deliberately narrow: kilometres and miles
//! only, matching the reference deployment.

use crate::handlers::query_text;
use crate::registry::{Handler, HandlerOutput};
use serde_json::{Value, json};
use std::pin::Pin;

const KM_PER_MILE: f64 = 1.0 / 0.621371;

pub struct UnitConvertHandler;

impl Handler for UnitConvertHandler {
    fn name(&self) -> &str {
        "unit_convert"
    }

    fn description(&self) -> &str {
        "Converts between kilometres and miles."
    }

    fn trigger_keywords(&self) -> &[&str] {
        &["km", "mile", "kilometre", "kilometer", "convert"]
    }

    fn invoke(
        &self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = HandlerOutput> + Send + '_>> {
        let output = match query_text(&input) {
            Some(query) => convert(query),
            None => HandlerOutput::error("input is missing a `query` string"),
        };
        Box::pin(async move { output })
    }
}

fn convert(query: &str) -> HandlerOutput {
    let lower = query.to_lowercase();

    let Some((value, number_at)) = first_number(&lower) else {
        return HandlerOutput::error("no numeric value found in query");
    };

    let km_at = lower.find("km").or_else(|| lower.find("kilomet"));
    let mile_at = lower.find("mile");
    let (Some(km_at), Some(mile_at)) = (km_at, mile_at) else {
        return HandlerOutput::error("unsupported units (expected km and miles)");
    };

    // The unit written closest to the number is the source; the other
    // one is the target.
    let (converted, unit_label) = if km_at.abs_diff(number_at) <= mile_at.abs_diff(number_at) {
        (value / KM_PER_MILE, "miles")
    } else {
        (value * KM_PER_MILE, "km")
    };

    HandlerOutput::success(json!(format!("{:.3} {}", converted, unit_label)))
}

/// First number in the text, with the byte offset where it starts.
fn first_number(text: &str) -> Option<(f64, usize)> {
    let mut current = String::new();
    let mut start = 0;
    for (at, ch) in text
        .char_indices()
        .chain(std::iter::once((text.len(), '\u{0}')))
    {
        if ch.is_ascii_digit() || (ch == '.' && !current.is_empty()) {
            if current.is_empty() {
                start = at;
            }
            current.push(ch);
        } else if !current.is_empty() {
            if let Ok(value) = current.trim_end_matches('.').parse() {
                return Some((value, start));
            }
            current.clear();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_miles_to_km() {
        let output = UnitConvertHandler
            .invoke(json!({"query": "convert 10 miles to km"}))
            .await;
        match output {
            HandlerOutput::Success { result } => {
                let text = result.as_str().unwrap();
                assert!(text.starts_with("16.09"), "got {}", text);
                assert!(text.ends_with("km"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_km_to_miles() {
        let output = UnitConvertHandler
            .invoke(json!({"query": "how many miles is 5 km?"}))
            .await;
        match output {
            HandlerOutput::Success { result } => {
                let text = result.as_str().unwrap();
                assert!(text.starts_with("3.10"), "got {}", text);
                assert!(text.ends_with("miles"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_units_error() {
        let output = UnitConvertHandler
            .invoke(json!({"query": "convert 3 cups to litres"}))
            .await;
        assert!(!output.is_success());
    }

    #[test]
    fn test_first_number_parses_decimals() {
        assert_eq!(first_number("about 12.5 km away"), Some((12.5, 6)));
        assert_eq!(first_number("no digits"), None);
    }
}
