//! Resolver configuration: attempt budget, batch size, and the per-batch
//! invocation limits. Supplied by the embedding application or the CLI;
//! every field has an env override so deployments can tune the loop
//! without code changes.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Hard ceiling on state-machine iterations per resolution, independent of
/// `max_attempts`. Reaching it indicates a controller defect, not a normal
/// "no handler worked" outcome: [`ResolverConfig::validate`] caps
/// `max_attempts` so that no legal configuration can run this many steps.
pub const ITERATION_CEILING: u32 = 64;

/// Largest `max_attempts` whose worst-case resolution stays under the
/// ceiling. The controller spends one iteration per batch attempt, at most
/// one refill iteration per attempt, plus a terminal check.
pub const MAX_ATTEMPTS_CAP: u32 = (ITERATION_CEILING - 2) / 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum number of batches evaluated per resolution. Floor of 2 so a
    /// failed cached attempt always leaves budget for at least one ranked
    /// batch; capped at [`MAX_ATTEMPTS_CAP`] so the resolution loop can
    /// never legally reach the iteration ceiling.
    pub max_attempts: u32,
    /// Number of handlers exposed to a single solving attempt. Small on
    /// purpose: the batch bounds the decision space and the context handed
    /// to the solver.
    pub batch_size: usize,
    /// Timeout for one handler invocation inside a batch, in milliseconds.
    pub handler_timeout_ms: u64,
    /// Concurrent handler invocations allowed within one batch.
    pub max_concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            batch_size: 2,
            handler_timeout_ms: 15_000,
            max_concurrency: 2,
        }
    }
}

impl ResolverConfig {
    /// Build a config from `RESOLVER_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse("RESOLVER_MAX_ATTEMPTS", defaults.max_attempts),
            batch_size: env_parse("RESOLVER_BATCH_SIZE", defaults.batch_size),
            handler_timeout_ms: env_parse("RESOLVER_HANDLER_TIMEOUT_MS", defaults.handler_timeout_ms),
            max_concurrency: env_parse("RESOLVER_MAX_CONCURRENCY", defaults.max_concurrency),
        }
    }

    /// Validate the invariants the controller depends on.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 2 {
            bail!("max_attempts must be at least 2, got {}", self.max_attempts);
        }
        if self.max_attempts > MAX_ATTEMPTS_CAP {
            bail!(
                "max_attempts must be at most {}, got {}",
                MAX_ATTEMPTS_CAP,
                self.max_attempts
            );
        }
        if self.batch_size < 1 {
            bail!("batch_size must be at least 1");
        }
        if self.max_concurrency < 1 || self.max_concurrency > 3 {
            bail!(
                "max_concurrency must be between 1 and 3, got {}",
                self.max_concurrency
            );
        }
        if self.handler_timeout_ms == 0 {
            bail!("handler_timeout_ms must be non-zero");
        }
        Ok(())
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ResolverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 8);
        assert_eq!(config.batch_size, 2);
    }

    #[test]
    fn test_rejects_single_attempt_budget() {
        let config = ResolverConfig {
            max_attempts: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_attempt_budget_that_could_overrun_the_loop() {
        // One step per attempt plus one per refill must fit under the
        // iteration ceiling; anything above the cap could trip it on a
        // large registry with batch_size 1.
        let config = ResolverConfig {
            max_attempts: 70,
            batch_size: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ResolverConfig {
            max_attempts: MAX_ATTEMPTS_CAP,
            batch_size: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(2 * MAX_ATTEMPTS_CAP + 2 <= ITERATION_CEILING);
    }

    #[test]
    fn test_rejects_empty_batch() {
        let config = ResolverConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_concurrency() {
        let config = ResolverConfig {
            max_concurrency: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_handler_timeout_duration() {
        let config = ResolverConfig {
            handler_timeout_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.handler_timeout(), Duration::from_millis(250));
    }
}
