//! Generic polling loop trait and runner.
//!
//! The loop owns the fixed-interval cadence and shutdown handling; the
//! processor owns what a single iteration does.

use async_trait::async_trait;
use rand::Rng;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::emit;
use crate::metrics::events::{IterationCompleted, IterationDuration, IterationResultType};

/// Result of a single processing iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationResult {
    /// Items were processed successfully.
    ProcessedItems,
    /// No items were available to process.
    NoItems,
    /// Shutdown was requested.
    Shutdown,
}

/// Trait for implementing a polling-based processor.
#[async_trait]
pub trait PollingProcessor {
    /// The state type prepared for each iteration.
    type State: Send;
    /// The error type for this processor.
    type Error: std::error::Error + Send;

    /// Prepare state for a processing iteration.
    ///
    /// Returns `None` if there's no work to do this time around.
    ///
    /// # Arguments
    /// * `cold_start` - True on the first iteration (for recovery logic)
    async fn prepare(&mut self, cold_start: bool) -> Result<Option<Self::State>, Self::Error>;

    /// Process the prepared state.
    async fn process(&mut self, state: Self::State) -> Result<IterationResult, Self::Error>;
}

/// Random delay in `[0, max_secs)` used to spread polls of co-located collectors.
pub fn random_jitter(max_secs: u64) -> Duration {
    if max_secs > 0 {
        Duration::from_millis(rand::rng().random_range(0..max_secs * 1000))
    } else {
        Duration::ZERO
    }
}

/// Run a polling loop with the given processor.
///
/// 1. Call `prepare()` (with `cold_start = true` on the first iteration)
/// 2. Call `process()` if there's work to do
/// 3. Wait for `poll_interval` plus jitter, or the shutdown signal
/// 4. Repeat until shutdown
///
/// The first error from `prepare` or `process` ends the loop and is returned
/// unchanged; the caller decides whether that is fatal. Shutdown observed
/// mid-iteration drops the in-flight future.
pub async fn run_polling_loop<P: PollingProcessor>(
    processor: &mut P,
    poll_interval: Duration,
    poll_jitter_secs: u64,
    shutdown: CancellationToken,
    name: &str,
) -> Result<(), P::Error> {
    let mut first_iteration = true;

    loop {
        let iteration_start = Instant::now();

        let state = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!(target = name, "Shutdown requested during preparation");
                return Ok(());
            }

            result = processor.prepare(first_iteration) => result?,
        };
        first_iteration = false;

        let result = match state {
            Some(s) => {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        info!(target = name, "Shutdown requested during processing");
                        IterationResult::Shutdown
                    }

                    result = processor.process(s) => result?,
                }
            }
            None => IterationResult::NoItems,
        };

        let result_type = match result {
            IterationResult::Shutdown => break,
            IterationResult::NoItems => IterationResultType::NoItems,
            IterationResult::ProcessedItems => IterationResultType::Processed,
        };

        emit!(IterationCompleted {
            result: result_type,
            target: name.to_string(),
        });
        emit!(IterationDuration {
            duration: iteration_start.elapsed(),
            target: name.to_string(),
        });

        let sleep_duration = poll_interval + random_jitter(poll_jitter_secs);
        debug!(
            target = name,
            sleep_ms = sleep_duration.as_millis() as u64,
            "Iteration complete, sleeping until next poll"
        );

        if shutdown
            .run_until_cancelled(tokio::time::sleep(sleep_duration))
            .await
            .is_none()
        {
            info!(target = name, "Shutdown requested during poll wait");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(display("iteration {iteration} failed"))]
    struct TestError {
        iteration: usize,
    }

    /// Counts iterations and optionally fails or cancels at a given one.
    struct CountingProcessor {
        prepared: Vec<bool>,
        processed: usize,
        fail_at: Option<usize>,
        cancel_at: usize,
        shutdown: CancellationToken,
    }

    impl CountingProcessor {
        fn new(cancel_at: usize, shutdown: CancellationToken) -> Self {
            Self {
                prepared: Vec::new(),
                processed: 0,
                fail_at: None,
                cancel_at,
                shutdown,
            }
        }
    }

    #[async_trait]
    impl PollingProcessor for CountingProcessor {
        type State = usize;
        type Error = TestError;

        async fn prepare(&mut self, cold_start: bool) -> Result<Option<usize>, TestError> {
            self.prepared.push(cold_start);
            Ok(Some(self.prepared.len()))
        }

        async fn process(&mut self, iteration: usize) -> Result<IterationResult, TestError> {
            if self.fail_at == Some(iteration) {
                return TestSnafu { iteration }.fail();
            }
            self.processed += 1;
            if iteration == self.cancel_at {
                self.shutdown.cancel();
            }
            Ok(IterationResult::ProcessedItems)
        }
    }

    #[test]
    fn test_random_jitter_zero() {
        assert_eq!(random_jitter(0), Duration::ZERO);
    }

    #[test]
    fn test_random_jitter_within_bounds() {
        for _ in 0..100 {
            assert!(random_jitter(2) < Duration::from_secs(2));
        }
    }

    #[tokio::test]
    async fn test_loop_runs_until_shutdown() {
        let shutdown = CancellationToken::new();
        let mut processor = CountingProcessor::new(3, shutdown.clone());

        run_polling_loop(&mut processor, Duration::from_millis(1), 0, shutdown, "test")
            .await
            .unwrap();

        assert_eq!(processor.processed, 3);
        assert_eq!(processor.prepared, vec![true, false, false]);
    }

    #[tokio::test]
    async fn test_loop_returns_first_error() {
        let shutdown = CancellationToken::new();
        let mut processor = CountingProcessor::new(10, shutdown.clone());
        processor.fail_at = Some(2);

        let err = run_polling_loop(&mut processor, Duration::from_millis(1), 0, shutdown, "test")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "iteration 2 failed");
        assert_eq!(processor.processed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_does_nothing() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let mut processor = CountingProcessor::new(10, shutdown.clone());

        run_polling_loop(&mut processor, Duration::from_secs(60), 0, shutdown, "test")
            .await
            .unwrap();

        assert!(processor.prepared.is_empty());
    }
}
