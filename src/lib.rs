// Core modules
mod config;
mod db;
mod types;

// Resolution pipeline
mod controller;
mod executor;
pub mod handlers;
mod ranker;
mod registry;
mod verdict;

// Re-export key types and functions
pub use config::{ITERATION_CEILING, MAX_ATTEMPTS_CAP, ResolverConfig};
pub use controller::{CancelFlag, Outcome, ResolutionController, ResolveError, SolveResult};
pub use db::{DatabaseConfig, Db, ResolutionCache, create_connection, ensure_schema};
pub use executor::{AttemptRecord, BatchExecutor, BatchScope, ProbeBackend, SolveBackend};
pub use handlers::builtin_registry;
pub use ranker::Ranker;
pub use registry::{Handler, HandlerOutput, HandlerRegistry};
pub use types::{CacheKey, HandlerName, cache_key, normalize_query};
pub use verdict::{Verdict, VerdictParse, parse_verdict};

use anyhow::Result;
use std::sync::Arc;

/// Convenience function to create a fully configured resolver.
///
/// Connects to the database, ensures the cache schema, and wires the
/// given registry to a [`ProbeBackend`]-driven controller.
pub async fn create_resolver(
    db_config: DatabaseConfig,
    config: ResolverConfig,
    registry: HandlerRegistry,
) -> Result<Arc<ResolutionController>> {
    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;

    let registry = Arc::new(registry);
    let cache = ResolutionCache::new(db);
    let ranker = Ranker::new(registry.clone());
    let executor = BatchExecutor::new(
        registry.clone(),
        Arc::new(ProbeBackend),
        config.handler_timeout(),
        config.max_concurrency,
    );

    let controller = ResolutionController::new(cache, ranker, executor, registry, config)?;
    Ok(Arc::new(controller))
}
