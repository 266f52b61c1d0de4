//! Batched solving attempts.
//!
//! A `BatchExecutor` exposes exactly one batch of handlers to one solving
//! attempt. The attempt only ever sees a `BatchScope`, which holds nothing
//! but the batch's handlers, so invoking anything outside the batch is
//! structurally impossible. Within the scope, invocations run under a
//! bounded concurrency limit and an individual timeout; a timed-out or
//! failing handler is recorded and never aborts its siblings.
//!
//! The solving mechanism itself (normally a language-model call) sits
//! behind the `SolveBackend` trait and replies with free verdict text,
//! which is parsed here into a typed verdict.

use crate::registry::{Handler, HandlerOutput, HandlerRegistry};
use crate::types::HandlerName;
use crate::verdict::{VerdictParse, parse_verdict};
use anyhow::Result;
use serde_json::{Value, json};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::warn;

/// One handler invocation inside a batch: who ran, what came back, and how
/// long it took. Appended to the per-resolution attempt log; never mutated
/// after append.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub handler: HandlerName,
    pub output: HandlerOutput,
    pub elapsed_ms: u64,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl AttemptRecord {
    /// One-line summary for diagnostics and exhaustion reports.
    pub fn summary(&self) -> String {
        match &self.output {
            HandlerOutput::Success { .. } => format!("{}: success", self.handler),
            HandlerOutput::Error { error_message } => {
                format!("{}: error ({})", self.handler, error_message)
            }
        }
    }
}

/// The view of the registry a single solving attempt is allowed to see.
///
/// Holds only the batch's handlers. Every invocation goes through
/// [`BatchScope::invoke`], which enforces the concurrency bound and the
/// per-invocation timeout and records the outcome.
pub struct BatchScope {
    handlers: Vec<(HandlerName, Arc<dyn Handler>)>,
    semaphore: Semaphore,
    invocation_timeout: Duration,
    records: Mutex<Vec<AttemptRecord>>,
}

impl BatchScope {
    fn new(
        handlers: Vec<(HandlerName, Arc<dyn Handler>)>,
        max_concurrency: usize,
        invocation_timeout: Duration,
    ) -> Self {
        Self {
            handlers,
            semaphore: Semaphore::new(max_concurrency.max(1)),
            invocation_timeout,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Names exposed to this attempt, in batch order.
    pub fn names(&self) -> Vec<HandlerName> {
        self.handlers.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Batch-order position of a handler, if it is exposed here.
    pub fn position(&self, name: &HandlerName) -> Option<usize> {
        self.handlers.iter().position(|(n, _)| n == name)
    }

    /// Invoke an exposed handler. Requests for names outside the batch get
    /// an error output and are not recorded as invocations.
    pub async fn invoke(&self, name: &HandlerName, input: Value) -> HandlerOutput {
        let Some((_, handler)) = self.handlers.iter().find(|(n, _)| n == name) else {
            warn!(handler = %name, "attempt asked for a handler outside its batch");
            return HandlerOutput::error(format!("handler `{}` is not exposed to this attempt", name));
        };

        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return HandlerOutput::error("batch scope is shut down"),
        };

        let start = Instant::now();
        let output = match timeout(self.invocation_timeout, handler.invoke(input)).await {
            Ok(output) => output,
            Err(_) => HandlerOutput::error(format!(
                "handler `{}` timed out after {}ms",
                name,
                self.invocation_timeout.as_millis()
            )),
        };

        let record = AttemptRecord {
            handler: name.clone(),
            output: output.clone(),
            elapsed_ms: start.elapsed().as_millis() as u64,
            at: chrono::Utc::now(),
        };
        self.records.lock().await.push(record);

        output
    }

    async fn drain_records(&self) -> Vec<AttemptRecord> {
        std::mem::take(&mut *self.records.lock().await)
    }
}

/// The external solving mechanism: given a query and a scope of exposed
/// handlers, produce free verdict text following the protocol
/// (`SOLVED:true|false ... JSON:{"tool":...,"answer":...}`).
pub trait SolveBackend: Send + Sync {
    fn attempt(
        &self,
        query: String,
        scope: Arc<BatchScope>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

/// Default backend: probe every exposed handler with the query and credit
/// the first success in batch order.
///
/// Stands in for the model-driven attempt; the verdict text it emits is
/// exactly what the model is instructed to produce, so the parsing path is
/// identical either way.
pub struct ProbeBackend;

impl SolveBackend for ProbeBackend {
    fn attempt(
        &self,
        query: String,
        scope: Arc<BatchScope>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            let mut set = JoinSet::new();
            for name in scope.names() {
                let scope = scope.clone();
                let query = query.clone();
                set.spawn(async move {
                    let output = scope.invoke(&name, json!({ "query": query })).await;
                    (name, output)
                });
            }

            let mut outcomes: Vec<(HandlerName, HandlerOutput)> = Vec::new();
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(pair) => outcomes.push(pair),
                    Err(e) => warn!("handler probe task panicked: {}", e),
                }
            }

            // Join order is completion order; restore batch order so the
            // credited handler is deterministic.
            outcomes.sort_by_key(|(name, _)| scope.position(name).unwrap_or(usize::MAX));

            let winner = outcomes
                .iter()
                .find_map(|(name, output)| match output {
                    HandlerOutput::Success { result } => Some((name.clone(), result.clone())),
                    HandlerOutput::Error { .. } => None,
                });

            let payload = match winner {
                Some((name, result)) => {
                    let answer = match result {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    json!({ "tool": name.as_str(), "answer": answer })
                }
                None => {
                    let reasons: Vec<String> = outcomes
                        .iter()
                        .map(|(name, output)| match output {
                            HandlerOutput::Error { error_message } => {
                                format!("{}: {}", name, error_message)
                            }
                            HandlerOutput::Success { .. } => format!("{}: success", name),
                        })
                        .collect();
                    json!({ "tool": "none", "answer": reasons.join("; ") })
                }
            };

            let solved = payload["tool"] != json!("none");
            Ok(format!(
                "SOLVED:{} JSON:{}",
                solved,
                serde_json::to_string(&payload)?
            ))
        })
    }
}

/// Structured outcome of one batch attempt.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub verdict: VerdictParse,
    /// Raw verdict text, preserved even (especially) when unparsable.
    pub raw: String,
    /// Every handler invocation the attempt performed, in completion order.
    pub invocations: Vec<AttemptRecord>,
}

/// Runs one solving attempt per batch of candidate handlers.
pub struct BatchExecutor {
    registry: Arc<HandlerRegistry>,
    backend: Arc<dyn SolveBackend>,
    invocation_timeout: Duration,
    max_concurrency: usize,
}

impl BatchExecutor {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        backend: Arc<dyn SolveBackend>,
        invocation_timeout: Duration,
        max_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            backend,
            invocation_timeout,
            max_concurrency,
        }
    }

    /// Run one solving attempt with exactly the handlers in `batch`
    /// exposed. Backend failures and unparsable replies degrade to an
    /// unparsed verdict; they never escape as errors.
    pub async fn run(&self, query: &str, batch: &[HandlerName]) -> BatchOutcome {
        let mut handlers = Vec::with_capacity(batch.len());
        for name in batch {
            match self.registry.get(name) {
                Some(handler) => handlers.push((name.clone(), handler)),
                None => warn!(handler = %name, "batch names a handler missing from the registry"),
            }
        }

        let scope = Arc::new(BatchScope::new(
            handlers,
            self.max_concurrency,
            self.invocation_timeout,
        ));

        let raw = match self.backend.attempt(query.to_string(), scope.clone()).await {
            Ok(text) => text,
            Err(e) => {
                warn!("solve attempt failed: {}", e);
                String::new()
            }
        };

        let mut verdict = parse_verdict(&raw);

        // A verdict may only credit a handler that was actually exposed to
        // the attempt; anything else would poison the cache.
        if let VerdictParse::Parsed(v) = &mut verdict
            && let Some(handler) = &v.handler
            && scope.position(handler).is_none()
        {
            warn!(handler = %handler, "verdict credited a handler outside the batch, dropping it");
            v.handler = None;
        }

        BatchOutcome {
            verdict,
            raw,
            invocations: scope.drain_records().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::testing::StaticHandler;
    use crate::verdict::Verdict;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Handler that counts invocations, optionally sleeping first.
    struct CountingHandler {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        delay: Duration,
        output: HandlerOutput,
    }

    impl Handler for CountingHandler {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "counting test handler"
        }

        fn trigger_keywords(&self) -> &[&str] {
            &[]
        }

        fn invoke(
            &self,
            _input: Value,
        ) -> Pin<Box<dyn Future<Output = HandlerOutput> + Send + '_>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay;
            let output = self.output.clone();
            Box::pin(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                output
            })
        }
    }

    fn executor(registry: Arc<HandlerRegistry>, timeout_ms: u64) -> BatchExecutor {
        BatchExecutor::new(
            registry,
            Arc::new(ProbeBackend),
            Duration::from_millis(timeout_ms),
            2,
        )
    }

    #[tokio::test]
    async fn test_successful_handler_produces_solved_verdict() {
        let registry = Arc::new(HandlerRegistry::new().register_handler(StaticHandler::new(
            "calc",
            &[],
            HandlerOutput::success(json!("42")),
        )));
        let executor = executor(registry, 1000);

        let outcome = executor.run("12*(3+4)/2", &[HandlerName::new("calc")]).await;
        assert_eq!(
            outcome.verdict,
            VerdictParse::Parsed(Verdict {
                solved: true,
                handler: Some(HandlerName::new("calc")),
                answer: "42".to_string(),
            })
        );
        assert_eq!(outcome.invocations.len(), 1);
    }

    #[tokio::test]
    async fn test_handlers_outside_batch_are_never_invoked() {
        let inside_calls = Arc::new(AtomicUsize::new(0));
        let outside_calls = Arc::new(AtomicUsize::new(0));

        let registry = Arc::new(
            HandlerRegistry::new()
                .register_handler(CountingHandler {
                    name: "inside",
                    calls: inside_calls.clone(),
                    delay: Duration::ZERO,
                    output: HandlerOutput::error("nope"),
                })
                .register_handler(CountingHandler {
                    name: "outside",
                    calls: outside_calls.clone(),
                    delay: Duration::ZERO,
                    output: HandlerOutput::success(json!("tempting")),
                }),
        );
        let executor = executor(registry, 1000);

        let outcome = executor.run("q", &[HandlerName::new("inside")]).await;

        assert_eq!(inside_calls.load(Ordering::SeqCst), 1);
        assert_eq!(outside_calls.load(Ordering::SeqCst), 0);
        match outcome.verdict {
            VerdictParse::Parsed(v) => assert!(!v.solved),
            other => panic!("expected parsed verdict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_recorded_without_failing_sibling() {
        // Scenario: one handler hangs past its timeout while its batch
        // sibling succeeds; the batch verdict reflects the success and the
        // timeout shows up in the invocation log.
        let registry = Arc::new(
            HandlerRegistry::new()
                .register_handler(CountingHandler {
                    name: "slow",
                    calls: Arc::new(AtomicUsize::new(0)),
                    delay: Duration::from_secs(5),
                    output: HandlerOutput::success(json!("too late")),
                })
                .register_handler(StaticHandler::new(
                    "fast",
                    &[],
                    HandlerOutput::success(json!("done")),
                )),
        );
        let executor = executor(registry, 50);

        let outcome = executor
            .run("q", &[HandlerName::new("slow"), HandlerName::new("fast")])
            .await;

        match &outcome.verdict {
            VerdictParse::Parsed(v) => {
                assert!(v.solved);
                assert_eq!(v.handler, Some(HandlerName::new("fast")));
            }
            other => panic!("expected parsed verdict, got {:?}", other),
        }

        let slow = outcome
            .invocations
            .iter()
            .find(|r| r.handler == HandlerName::new("slow"))
            .expect("slow handler invocation recorded");
        match &slow.output {
            HandlerOutput::Error { error_message } => {
                assert!(error_message.contains("timed out"));
            }
            other => panic!("expected timeout error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_success_in_batch_order_wins() {
        let registry = Arc::new(
            HandlerRegistry::new()
                .register_handler(StaticHandler::new(
                    "first",
                    &[],
                    HandlerOutput::success(json!("a")),
                ))
                .register_handler(StaticHandler::new(
                    "second",
                    &[],
                    HandlerOutput::success(json!("b")),
                )),
        );
        let executor = executor(registry, 1000);

        let outcome = executor
            .run("q", &[HandlerName::new("first"), HandlerName::new("second")])
            .await;

        match outcome.verdict {
            VerdictParse::Parsed(v) => assert_eq!(v.handler, Some(HandlerName::new("first"))),
            other => panic!("expected parsed verdict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backend_without_json_marker_degrades_to_unparsed() {
        struct MarkerlessBackend;

        impl SolveBackend for MarkerlessBackend {
            fn attempt(
                &self,
                _query: String,
                _scope: Arc<BatchScope>,
            ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
                Box::pin(async { Ok("SOLVED:true but the payload never came".to_string()) })
            }
        }

        let registry = Arc::new(HandlerRegistry::new().register_handler(StaticHandler::new(
            "calc",
            &[],
            HandlerOutput::success(json!("42")),
        )));
        let executor = BatchExecutor::new(
            registry,
            Arc::new(MarkerlessBackend),
            Duration::from_millis(1000),
            2,
        );

        let outcome = executor.run("q", &[HandlerName::new("calc")]).await;
        assert_eq!(outcome.verdict, VerdictParse::Unparsed);
        assert!(outcome.raw.contains("SOLVED:true"));
    }

    #[tokio::test]
    async fn test_verdict_crediting_unexposed_handler_is_stripped() {
        struct LyingBackend;

        impl SolveBackend for LyingBackend {
            fn attempt(
                &self,
                _query: String,
                _scope: Arc<BatchScope>,
            ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
                Box::pin(async {
                    Ok(r#"SOLVED:true JSON:{"tool":"outside","answer":"x"}"#.to_string())
                })
            }
        }

        let registry = Arc::new(
            HandlerRegistry::new()
                .register_handler(StaticHandler::new(
                    "inside",
                    &[],
                    HandlerOutput::error("no"),
                ))
                .register_handler(StaticHandler::new(
                    "outside",
                    &[],
                    HandlerOutput::success(json!("x")),
                )),
        );
        let executor = BatchExecutor::new(
            registry,
            Arc::new(LyingBackend),
            Duration::from_millis(1000),
            2,
        );

        let outcome = executor.run("q", &[HandlerName::new("inside")]).await;
        match outcome.verdict {
            VerdictParse::Parsed(v) => {
                assert!(v.solved);
                assert_eq!(v.handler, None);
            }
            other => panic!("expected parsed verdict, got {:?}", other),
        }
    }
}
