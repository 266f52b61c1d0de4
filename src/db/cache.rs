//! Persistent query → handler resolution cache.
//!
//! Keys are SHA-256 digests of the normalized query, so repeat queries that
//! differ only in case or whitespace hit the same entry. One row per key,
//! last write wins. The store is the only mutable state shared between
//! concurrent resolutions; SurrealDB gives each `get` a fully-written row
//! or nothing.

use crate::db::connection::Db;
use crate::types::{HandlerName, cache_key};
use anyhow::Result;
use tracing::warn;

/// SurrealDB-backed resolution cache.
#[derive(Clone)]
pub struct ResolutionCache {
    db: Db,
}

impl ResolutionCache {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Look up the handler recorded for this query.
    ///
    /// Returns `None` on a genuine miss *and* when the store is
    /// unavailable: a broken cache degrades the resolution to the ranking
    /// path, it never fails it.
    pub async fn get(&self, query: &str) -> Option<HandlerName> {
        let key = cache_key(query);

        let res = self
            .db
            .query("SELECT VALUE handler FROM type::thing('resolution_cache', $key)")
            .bind(("key", key.clone().into_inner()))
            .await;

        match res {
            Ok(mut res) => match res.take::<Option<String>>(0) {
                Ok(handler) => handler.map(HandlerName::new),
                Err(e) => {
                    warn!(key = %key, "failed to decode cache row, treating as miss: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!(key = %key, "cache lookup failed, treating as miss: {}", e);
                None
            }
        }
    }

    /// Record that `handler` resolved this query. Upsert by key, last write
    /// wins. The write is awaited before returning so a crash right after a
    /// successful resolution cannot lose the mapping.
    ///
    /// Errors are returned for the caller to log; a failed put must never
    /// fail the resolution that produced it.
    pub async fn put(&self, query: &str, handler: &HandlerName) -> Result<()> {
        let key = cache_key(query);

        self.db
            .query(
                r#"
                UPSERT type::thing('resolution_cache', $key)
                SET handler = $handler
                "#,
            )
            .bind(("key", key.into_inner()))
            .bind(("handler", handler.clone().into_inner()))
            .await?;

        Ok(())
    }
}
