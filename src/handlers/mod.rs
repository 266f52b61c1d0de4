//! Built-in demo capabilities.
//!
//! Three narrow handlers matching the reference deployment: arithmetic
//! evaluation, km/miles conversion, and a small fact table. They exist so
//! the CLI and the end-to-end tests exercise the resolution loop against
//! real invocations; production deployments register their own handlers.

mod calc;
mod lookup;
mod unit;

pub use calc::CalcHandler;
pub use lookup::LookupHandler;
pub use unit::UnitConvertHandler;

use crate::registry::HandlerRegistry;

/// Registry with all built-in handlers. Registration order is the static
/// priority order: arithmetic first, conversion second, lookup last.
pub fn builtin_registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .register_handler(CalcHandler)
        .register_handler(UnitConvertHandler)
        .register_handler(LookupHandler)
}

/// Pull the query text out of a structured handler input.
pub(crate) fn query_text(input: &serde_json::Value) -> Option<&str> {
    input.get("query").and_then(|v| v.as_str())
}
