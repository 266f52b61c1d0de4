//! The resolution state machine.
//!
//! One resolution walks INIT → CACHE_CHECK → {CACHED_ATTEMPT | RANK} →
//! BATCH_ATTEMPT → {SOLVED | CONTINUE | EXHAUSTED}: check the cache, fall
//! back to ranking, drive batched attempts, write the cache through on
//! success, and bound the whole loop twice over (the configured attempt
//! budget, plus a hard iteration ceiling that only a controller defect
//! could reach).
//!
//! Every recoverable condition is absorbed here: cache misses and
//! failures, handler errors, unparsable verdicts. The caller always gets a
//! well-formed `SolveResult`; the only error this module ever returns is
//! the ceiling fault.

use crate::config::{ITERATION_CEILING, MAX_ATTEMPTS_CAP, ResolverConfig};
use crate::db::ResolutionCache;
use crate::executor::{AttemptRecord, BatchExecutor};
use crate::ranker::Ranker;
use crate::registry::HandlerRegistry;
use crate::types::HandlerName;
use crate::verdict::VerdictParse;
use anyhow::Result;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

/// Faults that escape the resolution loop. Everything else degrades into a
/// normal `SolveResult`.
#[derive(Debug, Clone)]
pub enum ResolveError {
    /// The state machine ran more iterations than the hard ceiling allows.
    /// This is a controller defect, not a "no handler worked" outcome, and
    /// must be surfaced loudly.
    IterationCeiling { steps: u32 },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IterationCeiling { steps } => {
                write!(f, "resolution exceeded the iteration ceiling after {} steps", steps)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// How a resolution terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Solved,
    Exhausted,
    Cancelled,
}

/// Terminal output of a resolution.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub outcome: Outcome,
    pub solved: bool,
    pub handler: Option<HandlerName>,
    pub answer: String,
    /// Raw text of the last verdict seen, for diagnostics.
    pub raw_verdict: String,
    pub attempts: u32,
    /// Every handler invocation across all batches, append-only.
    pub log: Vec<AttemptRecord>,
}

/// Cooperative cancellation signal, checked between batches (never
/// mid-invocation).
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-resolution transient state, exclusively owned by one in-flight
/// resolution. Nothing here is shared between concurrent queries.
struct ResolutionState {
    attempts: u32,
    tried: HashSet<HandlerName>,
    log: Vec<AttemptRecord>,
    queue: VecDeque<Vec<HandlerName>>,
    last_raw: String,
}

impl ResolutionState {
    fn new() -> Self {
        Self {
            attempts: 0,
            tried: HashSet::new(),
            log: Vec::new(),
            queue: VecDeque::new(),
            last_raw: String::new(),
        }
    }

    fn exhaustion_report(&self) -> String {
        if self.log.is_empty() {
            return "no handler was available to try".to_string();
        }
        let lines: Vec<String> = self.log.iter().map(AttemptRecord::summary).collect();
        format!(
            "no handler resolved the query after {} attempt(s): {}",
            self.attempts,
            lines.join("; ")
        )
    }
}

/// Ties cache, ranker, and executor together. Cheap to share behind an
/// `Arc`; concurrent resolutions only ever share the cache and the
/// read-only registry.
pub struct ResolutionController {
    cache: ResolutionCache,
    ranker: Ranker,
    executor: BatchExecutor,
    registry: Arc<HandlerRegistry>,
    config: ResolverConfig,
}

impl ResolutionController {
    pub fn new(
        cache: ResolutionCache,
        ranker: Ranker,
        executor: BatchExecutor,
        registry: Arc<HandlerRegistry>,
        config: ResolverConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache,
            ranker,
            executor,
            registry,
            config,
        })
    }

    /// Resolve a query without external cancellation.
    pub async fn resolve(&self, query: &str) -> Result<SolveResult, ResolveError> {
        self.resolve_with(query, &CancelFlag::new()).await
    }

    /// Resolve a query, checking `cancel` at the top of every batch
    /// attempt.
    pub async fn resolve_with(
        &self,
        query: &str,
        cancel: &CancelFlag,
    ) -> Result<SolveResult, ResolveError> {
        let resolution_id = Uuid::new_v4();
        let mut state = ResolutionState::new();

        // CACHE_CHECK: a hit becomes a singleton batch; ranking is skipped
        // entirely unless that batch fails.
        if let Some(cached) = self.cache.get(query).await {
            if self.registry.contains(&cached) {
                info!(resolution = %resolution_id, handler = %cached, "cache hit");
                state.queue.push_back(vec![cached]);
            } else {
                warn!(
                    resolution = %resolution_id,
                    handler = %cached,
                    "cached handler is not registered, treating as a miss"
                );
            }
        }

        let mut steps: u32 = 0;
        loop {
            steps += 1;
            if steps > ITERATION_CEILING {
                return Err(ResolveError::IterationCeiling { steps });
            }

            if cancel.is_cancelled() {
                info!(resolution = %resolution_id, attempts = state.attempts, "resolution cancelled");
                return Ok(self.terminal(state, Outcome::Cancelled));
            }

            // RANK: refill the batch queue from a fresh ranking restricted
            // by the tried set. An empty ranking means every candidate has
            // been tried.
            let Some(batch) = state.queue.pop_front() else {
                let ranked = self.ranker.rank(query, &state.tried);
                if ranked.is_empty() {
                    return Ok(self.terminal(state, Outcome::Exhausted));
                }
                for chunk in ranked.chunks(self.config.batch_size) {
                    state.queue.push_back(chunk.to_vec());
                }
                continue;
            };

            if state.attempts >= self.config.max_attempts {
                info!(
                    resolution = %resolution_id,
                    attempts = state.attempts,
                    "attempt budget exhausted"
                );
                return Ok(self.terminal(state, Outcome::Exhausted));
            }

            // BATCH_ATTEMPT
            let outcome = self.executor.run(query, &batch).await;
            state.attempts += 1;
            state.log.extend(outcome.invocations);
            state.last_raw = outcome.raw;

            match outcome.verdict {
                VerdictParse::Parsed(v) if v.solved => {
                    if let Some(handler) = &v.handler {
                        if let Err(e) = self.cache.put(query, handler).await {
                            // The resolution already succeeded; a failed
                            // cache write only costs the next query its
                            // shortcut.
                            warn!(resolution = %resolution_id, "cache write failed: {}", e);
                        }
                        info!(
                            resolution = %resolution_id,
                            handler = %handler,
                            attempts = state.attempts,
                            "query solved"
                        );
                    } else {
                        info!(
                            resolution = %resolution_id,
                            attempts = state.attempts,
                            "query solved without a credited handler, skipping cache write"
                        );
                    }

                    return Ok(SolveResult {
                        outcome: Outcome::Solved,
                        solved: true,
                        handler: v.handler,
                        answer: v.answer,
                        raw_verdict: state.last_raw,
                        attempts: state.attempts,
                        log: state.log,
                    });
                }
                VerdictParse::Parsed(_) | VerdictParse::Unparsed => {
                    // CONTINUE: everything in this batch is spent.
                    for name in batch {
                        state.tried.insert(name);
                    }
                }
            }
        }
    }

    fn terminal(&self, state: ResolutionState, outcome: Outcome) -> SolveResult {
        let answer = match outcome {
            Outcome::Cancelled => {
                format!("resolution cancelled after {} attempt(s)", state.attempts)
            }
            _ => state.exhaustion_report(),
        };

        SolveResult {
            outcome,
            solved: false,
            handler: None,
            answer,
            raw_verdict: state.last_raw.clone(),
            attempts: state.attempts,
            log: state.log,
        }
    }
}
