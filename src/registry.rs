//! Handler registry: the read-only mapping from stable handler names to
//! invocable capabilities.
//!
//! Provides a `Handler` trait for implementing capabilities and a
//! `HandlerRegistry` for registering and looking them up. The registry is
//! frozen after startup and shared freely across concurrent resolutions;
//! registration order doubles as the static priority table the ranker
//! uses to break ties.

use crate::types::HandlerName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

/// Outcome of one handler invocation, in the wire shape every capability
/// must speak: a `status` tag plus either a `result` or an `error_message`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandlerOutput {
    Success { result: Value },
    Error { error_message: String },
}

impl HandlerOutput {
    pub fn success(result: Value) -> Self {
        Self::Success { result }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error_message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Trait for invocable capabilities ("tools").
///
/// Each handler declares its name, a description, the trigger keywords the
/// ranker scores against, and an invoke method with a fixed signature.
/// Invocations are real calls with externally visible effects; the resolver
/// never deduplicates or retries them individually.
pub trait Handler: Send + Sync {
    /// Stable identifier, unique within a registry (e.g., "calc").
    fn name(&self) -> &str;

    /// Human-readable description of what this handler does.
    fn description(&self) -> &str;

    /// Keywords whose presence in a normalized query suggests this handler.
    fn trigger_keywords(&self) -> &[&str];

    /// Invoke the capability with a structured input.
    fn invoke(
        &self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = HandlerOutput> + Send + '_>>;
}

/// Registry for managing handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerName, Arc<dyn Handler>>,
    /// Registration order; earlier entries rank higher on ties.
    order: Vec<HandlerName>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, builder-style. Re-registering a name replaces
    /// the handler but keeps its original priority slot.
    pub fn register(mut self, handler: Arc<dyn Handler>) -> Self {
        let name = HandlerName::new(handler.name());
        if self.handlers.insert(name.clone(), handler).is_none() {
            self.order.push(name);
        }
        self
    }

    /// Register a handler from a concrete type.
    pub fn register_handler<T: Handler + 'static>(self, handler: T) -> Self {
        self.register(Arc::new(handler))
    }

    /// Get a handler by name.
    pub fn get(&self, name: &HandlerName) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    /// Check if a handler with the given name is registered.
    pub fn contains(&self, name: &HandlerName) -> bool {
        self.handlers.contains_key(name)
    }

    /// Handler names in static priority order (registration order).
    pub fn names(&self) -> &[HandlerName] {
        &self.order
    }

    /// Static priority of a handler: its registration index. Unknown names
    /// sort last.
    pub fn priority(&self, name: &HandlerName) -> usize {
        self.order
            .iter()
            .position(|n| n == name)
            .unwrap_or(usize::MAX)
    }

    /// Return the number of registered handlers.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Return `true` if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
