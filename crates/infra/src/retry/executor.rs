//! Resilient executor: exponential backoff with jitter around a single remote operation.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use cloudwatcher_core::{OperationFailure, OperationOutcome};

use super::policy::RetryPolicy;

/// Runs idempotent remote operations under a [`RetryPolicy`].
///
/// A returned failure and a panic inside an attempt are treated the same way: the
/// attempt failed. Success returns immediately. Once the retry bound is reached the
/// caller gets one aggregated failure naming the attempt count, with the last failure
/// attached as its cause.
///
/// Two optional refinements on top of uniform retry:
/// - `with_deadline`: an overall wall-clock cap across all attempts and waits
/// - `fail_fast_on_permanent`: stop immediately on `FailureKind::Permanent`
///
/// Validation failures are never retried.
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    policy: Arc<RetryPolicy>,
    deadline: Option<Duration>,
    fail_fast_on_permanent: bool,
}

impl Default for ResilientExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl ResilientExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            deadline: None,
            fail_fast_on_permanent: false,
        }
    }

    /// Bound the total latency of one `execute` call.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_optional_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn fail_fast_on_permanent(mut self, enabled: bool) -> Self {
        self.fail_fast_on_permanent = enabled;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Execute `op`, retrying failed attempts per the policy.
    ///
    /// `op` is invoked once per attempt and must be safe to repeat.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut op: F) -> OperationOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = OperationOutcome<T>>,
    {
        let deadline = self.deadline.map(|d| Instant::now() + d);
        let mut delay = self.policy.initial_delay();
        let mut retries: u32 = 0;

        loop {
            let attempt = retries + 1;

            let result = match deadline {
                Some(at) => match tokio::time::timeout_at(at, run_attempt(op())).await {
                    Ok(result) => result,
                    Err(_) => Err(OperationFailure::transient(format!(
                        "attempt {attempt} did not complete before the deadline"
                    ))),
                },
                None => run_attempt(op()).await,
            };

            let failure = match result {
                Ok(value) => {
                    if retries > 0 {
                        debug!(operation, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            if failure.is_validation() {
                return Err(failure);
            }

            if self.fail_fast_on_permanent && failure.is_permanent() {
                debug!(operation, attempt, error = %failure, "permanent failure, not retrying");
                return Err(failure);
            }

            if !self.policy.should_retry(retries) {
                error!(operation, attempts = attempt, error = %failure, "retries exhausted");
                return Err(exhausted(operation, attempt, retries, failure));
            }

            let wait = self.policy.jittered(delay, &mut rand::thread_rng());

            if let (Some(at), Some(cap)) = (deadline, self.deadline) {
                if Instant::now() + wait >= at {
                    warn!(operation, attempts = attempt, error = %failure, "retry deadline reached");
                    let message = format!(
                        "{operation} exceeded its {}ms deadline after {attempt} attempts: {}",
                        cap.as_millis(),
                        failure.message()
                    );
                    return Err(failure.wrap(message));
                }
            }

            warn!(
                operation,
                attempt,
                delay_ms = wait.as_millis() as u64,
                error = %failure,
                "attempt failed, retrying"
            );

            tokio::time::sleep(wait).await;
            delay = self.policy.next_delay(delay);
            retries += 1;
        }
    }
}

async fn run_attempt<T, Fut>(fut: Fut) -> OperationOutcome<T>
where
    Fut: Future<Output = OperationOutcome<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(OperationFailure::transient(format!(
            "operation panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn exhausted(operation: &str, attempts: u32, retries: u32, last: OperationFailure) -> OperationFailure {
    let message = format!(
        "{operation} failed after {attempts} attempts ({retries} retries): {}",
        last.message()
    );
    last.wrap(message)
}
