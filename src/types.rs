//! NewType wrappers and query normalization for the resolver.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing a raw query where a derived cache key is expected).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Stable handler identifier as registered in the `HandlerRegistry`.
    ///
    /// This is the name the ranker orders, the cache persists, and the
    /// verdict protocol reports in its `tool` field. Two handlers never
    /// share a name within one registry.
    HandlerName
);

newtype_string!(
    /// Hex-encoded SHA-256 digest of a normalized query.
    ///
    /// Cache keys are derived, never constructed from raw user text, so
    /// that equal queries (modulo case and whitespace) always map to the
    /// same persisted entry across process restarts.
    CacheKey
);

/// Normalize a raw query: lowercase and collapse all whitespace runs to a
/// single space. The normalized form is what gets hashed and what the
/// ranker scores against.
pub fn normalize_query(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Derive the cache key for a raw query.
pub fn cache_key(raw: &str) -> CacheKey {
    let normalized = normalize_query(raw);
    let digest = Sha256::digest(normalized.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use fmt::Write;
        // write! into a String cannot fail
        let _ = write!(hex, "{:02x}", byte);
    }
    CacheKey::new(hex)
}
