//! Retry and wait engine.
//!
//! Two call shapes are supported:
//! - *retry-when*: re-issue an operation while a classifier says its error is
//!   transient ([`retry_when`] and friends);
//! - *wait-until*: poll a read-only check until it reports a target state
//!   ([`Waiter::wait_until`], [`Waiter::wait_until_gone`]).
//!
//! Every call is bounded by a deadline. Terminal failures short-circuit the
//! remaining budget; a deadline without a terminal outcome yields
//! [`ReconcileError::TimedOut`] carrying the last observed state.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::error::{ErrorKind, ReconcileError, Result};

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Result of a single check.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    NotFound,
    /// Not there yet; the string describes the observed state.
    Retryable(String),
    Terminal(ReconcileError),
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => Outcome::Success(v),
            Err(e) => match e.kind() {
                ErrorKind::NotFound => Outcome::NotFound,
                ErrorKind::Retryable => Outcome::Retryable(e.to_string()),
                _ => Outcome::Terminal(e),
            },
        }
    }
}

/// Poll loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Polling,
    Succeeded,
    TimedOut,
    Failed,
}

/// What a waiter does when the check reports the resource absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundPolicy {
    /// Keep polling (resource not visible yet).
    Retry,
    /// Stop with [`ReconcileError::NotFound`].
    Fail,
}

/// A bounded poll loop over a read-only check.
#[derive(Debug, Clone)]
pub struct Waiter {
    target: String,
    timeout: Duration,
    interval: Duration,
    delay: Duration,
    not_found: NotFoundPolicy,
    not_found_checks: Option<u32>,
}

impl Waiter {
    /// `target` describes the awaited state in errors and logs.
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
            interval: DEFAULT_POLL_INTERVAL,
            delay: Duration::ZERO,
            not_found: NotFoundPolicy::Retry,
            not_found_checks: None,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sleep before the first poll.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn on_not_found(mut self, policy: NotFoundPolicy) -> Self {
        self.not_found = policy;
        self
    }

    /// Give up after this many consecutive not-found polls.
    pub fn not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = Some(checks);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll until the check succeeds.
    pub async fn wait_until<T, F, Fut>(&self, check: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        self.run(check, false)
            .await?
            .ok_or_else(|| ReconcileError::not_found(self.target.clone()))
    }

    /// Poll until the check reports the resource absent or in a target state.
    ///
    /// Returns the record if a target state was observed, `None` if it is gone.
    pub async fn wait_until_gone<T, F, Fut>(&self, check: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        self.run(check, true).await
    }

    async fn run<T, F, Fut>(&self, mut check: F, gone_is_success: bool) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut state = WaitState::Polling;
        let mut last_state = String::new();
        let mut attempts: u32 = 0;
        let mut not_found_streak: u32 = 0;

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        while state == WaitState::Polling {
            attempts += 1;
            match check().await {
                Outcome::Success(v) => {
                    state = WaitState::Succeeded;
                    debug!(target_state = %self.target, attempts, ?state, "wait finished");
                    return Ok(Some(v));
                }
                Outcome::NotFound if gone_is_success => {
                    state = WaitState::Succeeded;
                    debug!(target_state = %self.target, attempts, ?state, "resource gone");
                    return Ok(None);
                }
                Outcome::NotFound => {
                    not_found_streak += 1;
                    let exhausted = self
                        .not_found_checks
                        .is_some_and(|max| not_found_streak >= max);
                    if self.not_found == NotFoundPolicy::Fail || exhausted {
                        state = WaitState::Failed;
                        debug!(target_state = %self.target, attempts, ?state, "resource not found");
                        return Err(ReconcileError::NotFound(format!(
                            "while waiting for {} (after {} checks)",
                            self.target, not_found_streak
                        )));
                    }
                    last_state = "not found".to_string();
                }
                Outcome::Retryable(observed) => {
                    not_found_streak = 0;
                    last_state = observed;
                }
                Outcome::Terminal(err) => {
                    state = WaitState::Failed;
                    warn!(target_state = %self.target, attempts, ?state, "wait failed: {}", err);
                    return Err(err);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                state = WaitState::TimedOut;
            } else {
                debug!(
                    target_state = %self.target,
                    last_state = %last_state,
                    attempts,
                    "still waiting"
                );
                sleep(self.interval.min(deadline - now)).await;
            }
        }

        warn!(target_state = %self.target, attempts, ?state, "wait timed out");
        Err(ReconcileError::TimedOut {
            target: self.target.clone(),
            last_state,
            timeout: self.timeout,
        })
    }
}

/// Re-issue `op` while `retryable` classifies its error as transient.
///
/// [`ReconcileError::Retryable`] errors are always retried.
pub async fn retry_when<T, F, Fut, C>(
    timeout: Duration,
    interval: Duration,
    mut op: F,
    retryable: C,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    C: Fn(&ReconcileError) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let err = match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.kind() == ErrorKind::Retryable || retryable(&e) => e,
            Err(e) => return Err(e),
        };

        let now = Instant::now();
        if now >= deadline {
            warn!(attempts, "giving up after transient errors: {}", err);
            return Err(ReconcileError::TimedOut {
                target: "transient error to clear".to_string(),
                last_state: err.to_string(),
                timeout,
            });
        }
        debug!(attempts, "retrying after transient error: {}", err);
        sleep(interval.min(deadline - now)).await;
    }
}

/// Re-issue `op` only while it fails with [`ReconcileError::Retryable`].
pub async fn retry_transient<T, F, Fut>(timeout: Duration, interval: Duration, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(timeout, interval, op, |_| false).await
}

/// Retry while `op` reports not found.
pub async fn retry_when_not_found<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(timeout, interval, op, ReconcileError::is_not_found).await
}

/// Retry not-found only for a resource created in this invocation; otherwise call once.
pub async fn retry_when_new_resource_not_found<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    is_new: bool,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if is_new {
        retry_when_not_found(timeout, interval, op).await
    } else {
        op().await
    }
}

/// A record that exposes a remote lifecycle status.
pub trait Stateful {
    fn status(&self) -> &str;

    /// Remote explanation for the current status, if any.
    fn status_reason(&self) -> Option<&str> {
        None
    }
}

/// Status-driven check classification.
#[derive(Debug, Clone, Copy)]
pub struct StatusWait {
    pending: &'static [&'static str],
    target: &'static [&'static str],
}

impl StatusWait {
    pub const fn new(pending: &'static [&'static str], target: &'static [&'static str]) -> Self {
        Self { pending, target }
    }

    /// Target statuses reach [`Outcome::Success`], pending ones keep polling,
    /// anything else is terminal.
    pub fn classify<T: Stateful>(&self, refreshed: Result<T>) -> Outcome<T> {
        let record = match refreshed {
            Ok(record) => record,
            Err(e) => return Outcome::from(Err(e)),
        };

        let status = record.status();
        if self.target.contains(&status) {
            Outcome::Success(record)
        } else if self.pending.contains(&status) {
            Outcome::Retryable(status.to_string())
        } else {
            let reason = record
                .status_reason()
                .map(|r| format!(": {}", r))
                .unwrap_or_default();
            Outcome::Terminal(ReconcileError::terminal(format!(
                "unexpected state '{}', wanted target '{}'{}",
                status,
                self.target.join(", "),
                reason
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::ApiError;

    const INTERVAL: Duration = Duration::from_secs(10);

    #[derive(Debug)]
    struct Record(&'static str);

    impl Stateful for Record {
        fn status(&self) -> &str {
            self.0
        }

        fn status_reason(&self) -> Option<&str> {
            (self.0 == "FAILED").then_some("capacity exhausted")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_near_deadline() {
        let timeout = Duration::from_secs(120);
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let c = calls.clone();
        let err = Waiter::new("stable", timeout)
            .interval(INTERVAL)
            .wait_until(move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Outcome::<()>::Retryable("STABILIZING".to_string()) }
            })
            .await
            .unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= timeout, "returned early: {:?}", elapsed);
        assert!(elapsed <= timeout + INTERVAL, "returned late: {:?}", elapsed);
        match err {
            ReconcileError::TimedOut { last_state, .. } => assert_eq!(last_state, "STABILIZING"),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(calls.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_terminal_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let c = calls.clone();
        let err = Waiter::new("active", Duration::from_secs(3600))
            .interval(INTERVAL)
            .wait_until(move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Outcome::<()>::Terminal(ReconcileError::terminal("validation failed")) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Terminal);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_not_found_retried_then_success() {
        let mut polls = 0;
        let value = Waiter::new("created", Duration::from_secs(60))
            .interval(INTERVAL)
            .wait_until(|| {
                polls += 1;
                let n = polls;
                async move {
                    if n < 3 {
                        Outcome::NotFound
                    } else {
                        Outcome::Success(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_not_found_fail_policy() {
        let err = Waiter::new("created", Duration::from_secs(60))
            .on_not_found(NotFoundPolicy::Fail)
            .wait_until(|| async { Outcome::<()>::NotFound })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_not_found_checks_exhausted() {
        let mut polls = 0;
        let err = Waiter::new("created", Duration::from_secs(3600))
            .interval(INTERVAL)
            .not_found_checks(4)
            .wait_until(|| {
                polls += 1;
                async { Outcome::<()>::NotFound }
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(polls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_gone() {
        let mut polls = 0;
        let gone = Waiter::new("deleted", Duration::from_secs(60))
            .interval(INTERVAL)
            .wait_until_gone(|| {
                polls += 1;
                let n = polls;
                async move {
                    if n < 2 {
                        Outcome::<()>::Retryable("DELETING".to_string())
                    } else {
                        Outcome::NotFound
                    }
                }
            })
            .await
            .unwrap();
        assert!(gone.is_none());
        assert_eq!(polls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_before_first_poll() {
        let started = Instant::now();
        Waiter::new("ready", Duration::from_secs(60))
            .delay(Duration::from_secs(30))
            .wait_until(|| async { Outcome::Success(()) })
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_when_transient_then_success() {
        let mut attempts = 0;
        let value = retry_when(
            Duration::from_secs(60),
            INTERVAL,
            || {
                attempts += 1;
                let n = attempts;
                async move {
                    if n < 3 {
                        Err(ReconcileError::Remote(ApiError::new(
                            "ClusterNotFoundException",
                            "Cluster not found.",
                        )))
                    } else {
                        Ok("created")
                    }
                }
            },
            |e| e.code_equals(&["ClusterNotFoundException"]),
        )
        .await
        .unwrap();
        assert_eq!(value, "created");
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_when_permanent_error_not_retried() {
        let mut attempts = 0;
        let err = retry_when(
            Duration::from_secs(60),
            INTERVAL,
            || {
                attempts += 1;
                async {
                    Err::<(), _>(ReconcileError::Remote(ApiError::new(
                        "AccessDeniedException",
                        "denied",
                    )))
                }
            },
            |e| e.code_equals(&["ClusterNotFoundException"]),
        )
        .await
        .unwrap_err();
        assert!(err.code_equals(&["AccessDeniedException"]));
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_when_times_out() {
        let err = retry_when(
            Duration::from_secs(30),
            INTERVAL,
            || async {
                Err::<(), _>(ReconcileError::Retryable(ApiError::new(
                    "ThrottlingException",
                    "throttled",
                )))
            },
            |_| false,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_transient_only_retries_throttling() {
        let mut attempts = 0;
        let value = retry_transient(Duration::from_secs(60), INTERVAL, || {
            attempts += 1;
            let n = attempts;
            async move {
                if n < 3 {
                    Err(ReconcileError::Retryable(ApiError::new(
                        "ThrottlingException",
                        "Rate exceeded",
                    )))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);

        let mut attempts = 0;
        let err = retry_transient(Duration::from_secs(60), INTERVAL, || {
            attempts += 1;
            async { Err::<(), _>(ReconcileError::not_found("repository")) }
        })
        .await
        .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_when_new_resource_not_found() {
        let mut attempts = 0;
        let err = retry_when_new_resource_not_found(
            Duration::from_secs(120),
            INTERVAL,
            false,
            || {
                attempts += 1;
                async { Err::<(), _>(ReconcileError::not_found("repository")) }
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(attempts, 1);

        let mut attempts = 0;
        let value = retry_when_new_resource_not_found(
            Duration::from_secs(120),
            INTERVAL,
            true,
            || {
                attempts += 1;
                let n = attempts;
                async move {
                    if n == 1 {
                        Err(ReconcileError::not_found("repository"))
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn test_status_wait_classify() {
        let wait = StatusWait::new(&["CREATING", "PENDING"], &["CREATED"]);

        assert!(matches!(
            wait.classify(Ok(Record("CREATED"))),
            Outcome::Success(Record("CREATED"))
        ));
        assert!(matches!(
            wait.classify(Ok(Record("CREATING"))),
            Outcome::Retryable(s) if s == "CREATING"
        ));
        match wait.classify(Ok(Record("FAILED"))) {
            Outcome::Terminal(e) => {
                assert_eq!(
                    e.to_string(),
                    "unexpected state 'FAILED', wanted target 'CREATED': capacity exhausted"
                );
            }
            other => panic!("expected terminal, got {:?}", other),
        }
        assert!(matches!(
            wait.classify(Err::<Record, _>(ReconcileError::not_found("volume"))),
            Outcome::NotFound
        ));
    }
}
