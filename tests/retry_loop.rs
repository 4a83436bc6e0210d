//! Integration tests: the retry loop against scripted operations.
//!
//! Delays are in milliseconds so the whole file runs quickly.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use llm_retry::{
    AbortToken, ApiError, BackoffEvent, GiveUpEvent, RateLimitEvent, RetryConfig, RetryError,
    RetryLogger, RetryPolicy,
};

/// Records the structured events the loop reports.
#[derive(Default)]
struct Recorder {
    backoff_events: Mutex<Vec<BackoffEvent>>,
    give_up_events: Mutex<Vec<GiveUpEvent>>,
    rate_limit_events: Mutex<Vec<RateLimitEvent>>,
}

impl Recorder {
    fn backoffs(&self) -> usize {
        self.backoff_events.lock().unwrap().len()
    }

    fn give_ups(&self) -> usize {
        self.give_up_events.lock().unwrap().len()
    }

    fn waits(&self) -> Vec<Duration> {
        self.backoff_events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.wait)
            .collect()
    }
}

impl RetryLogger for Recorder {
    fn warn(&self, _message: &str) {}

    fn error(&self, _message: &str) {}

    fn on_backoff(&self, event: &BackoffEvent) {
        self.backoff_events.lock().unwrap().push(event.clone());
    }

    fn on_give_up(&self, event: &GiveUpEvent) {
        self.give_up_events.lock().unwrap().push(event.clone());
    }

    fn on_rate_limit(&self, event: &RateLimitEvent) {
        self.rate_limit_events.lock().unwrap().push(event.clone());
    }
}

fn config(max_attempts: u32) -> RetryConfig {
    RetryConfig::new(
        max_attempts,
        Duration::from_secs(30),
        Duration::from_millis(1),
        Duration::from_millis(8),
    )
    .unwrap()
}

fn policy(max_attempts: u32) -> (RetryPolicy, Arc<Recorder>) {
    let log = Arc::new(Recorder::default());
    (
        RetryPolicy::with_logger(config(max_attempts), log.clone()),
        log,
    )
}

fn unavailable() -> ApiError {
    ApiError::Status {
        code: 503,
        message: "service unavailable".into(),
    }
}

#[test]
fn succeeds_after_two_retryable_failures() {
    let (policy, log) = policy(5);
    let mut calls = 0;
    let result = policy.execute("complete", || {
        calls += 1;
        if calls <= 2 {
            Err(unavailable())
        } else {
            Ok("done")
        }
    });
    assert_eq!(result.unwrap(), "done");
    assert_eq!(calls, 3);
    assert_eq!(log.backoffs(), 2);
    assert_eq!(log.give_ups(), 0);
}

#[test]
fn gives_up_after_max_attempts_with_original_error() {
    let (policy, log) = policy(3);
    let mut calls = 0;
    let result: Result<(), ApiError> = policy.execute("complete", || {
        calls += 1;
        Err(ApiError::Transport(format!("connection reset #{calls}")))
    });
    match result {
        Err(ApiError::Transport(msg)) => assert_eq!(msg, "connection reset #3"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(calls, 3);

    assert_eq!(log.waits(), vec![Duration::from_millis(1), Duration::from_millis(2)]);
    let backoffs = log.backoff_events.lock().unwrap();
    let attempts: Vec<u32> = backoffs.iter().map(|e| e.attempt).collect();
    assert_eq!(attempts, vec![1, 2]);
    assert!(backoffs.iter().all(|e| e.operation == "complete"));
    assert_eq!(backoffs[0].failure, "connection error: connection reset #1");

    let give_ups = log.give_up_events.lock().unwrap();
    assert_eq!(give_ups.len(), 1);
    assert_eq!(give_ups[0].attempt, 3);
    assert_eq!(give_ups[0].operation, "complete");
    assert_eq!(give_ups[0].failure, "connection error: connection reset #3");
}

#[test]
fn performed_waits_follow_the_backoff_schedule() {
    let (policy, log) = policy(6);
    let result: Result<(), ApiError> = policy.execute("complete", || Err(unavailable()));
    assert!(result.is_err());
    let ms = Duration::from_millis;
    // 1, 2, 4, 8 then clamped at max_delay.
    assert_eq!(log.waits(), vec![ms(1), ms(2), ms(4), ms(8), ms(8)]);
    assert_eq!(log.give_up_events.lock().unwrap()[0].attempt, 6);
}

#[test]
fn last_wait_is_cut_to_remaining_elapsed_budget() {
    let log = Arc::new(Recorder::default());
    let cfg = RetryConfig::new(
        100,
        Duration::from_millis(150),
        Duration::from_millis(100),
        Duration::from_millis(100),
    )
    .unwrap();
    let policy = RetryPolicy::with_logger(cfg, log.clone());
    let result: Result<(), ApiError> = policy.execute("slow", || Err(unavailable()));
    assert!(result.is_err());

    let waits = log.waits();
    assert_eq!(waits.len(), 2, "waits: {waits:?}");
    // Nothing elapsed before the first wait, so it gets the full delay.
    assert_eq!(waits[0], Duration::from_millis(100));
    // The second would push past 150ms, so it is shortened.
    assert!(waits[1] < Duration::from_millis(50), "waits: {waits:?}");
    assert_eq!(log.give_ups(), 1);
    assert_eq!(log.give_up_events.lock().unwrap()[0].attempt, 3);
}

#[test]
fn non_retryable_propagates_immediately() {
    let (policy, log) = policy(5);
    let mut calls = 0;
    let result: Result<(), ApiError> = policy.execute("complete", || {
        calls += 1;
        Err(ApiError::Status {
            code: 401,
            message: "invalid api key".into(),
        })
    });
    assert!(matches!(result, Err(ApiError::Status { code: 401, .. })));
    assert_eq!(calls, 1);
    assert_eq!(log.backoffs(), 0);
    assert_eq!(log.give_ups(), 0);
}

#[test]
fn elapsed_budget_ends_loop_before_attempt_budget() {
    let log = Arc::new(Recorder::default());
    let cfg = RetryConfig::new(
        100,
        Duration::from_millis(30),
        Duration::from_millis(10),
        Duration::from_millis(10),
    )
    .unwrap();
    let policy = RetryPolicy::with_logger(cfg, log.clone());
    let mut calls = 0u32;
    let started = Instant::now();
    let result: Result<(), ApiError> = policy.execute("slow", || {
        calls += 1;
        Err(ApiError::Other("request timeout".into()))
    });
    assert!(result.is_err());
    assert!(calls < 100);
    assert_eq!(log.give_ups(), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn anyhow_errors_are_classified_through_context() {
    let (policy, log) = policy(2);
    let result: anyhow::Result<()> = policy.execute("chat", || {
        let inner: Result<(), ApiError> = Err(ApiError::Status {
            code: 429,
            message: "slow down".into(),
        });
        Ok(anyhow::Context::context(inner, "calling chat completions")?)
    });
    assert!(result.is_err());
    assert_eq!(log.backoffs(), 1);
    assert_eq!(log.give_ups(), 1);
    // Classified through the status code; the message only has the context.
    let rate_limits = log.rate_limit_events.lock().unwrap();
    assert_eq!(rate_limits.len(), 2);
    assert_eq!(rate_limits[0].failure, "calling chat completions");
}

#[test]
fn oversized_delays_do_not_panic_when_aborted() {
    let toml = r#"
        max_attempts = 5
        max_elapsed_secs = 1e19
        base_delay_secs = 1e19
        max_delay_secs = 1e19
    "#;
    let cfg = RetryConfig::from_toml_str(toml).unwrap();
    let policy = RetryPolicy::with_logger(cfg, Arc::new(Recorder::default()));
    let token = AbortToken::new();
    token.abort();
    let result: Result<(), RetryError<ApiError>> =
        policy.execute_cancellable("chat", || Err(ApiError::Other("timeout".into())), &token);
    assert!(result.unwrap_err().is_aborted());
}

#[test]
fn abort_during_wait_stops_retrying() {
    let log = Arc::new(Recorder::default());
    let cfg = RetryConfig::new(
        5,
        Duration::from_secs(60),
        Duration::from_secs(10),
        Duration::from_secs(10),
    )
    .unwrap();
    let policy = RetryPolicy::with_logger(cfg, log.clone());
    let token = AbortToken::new();
    let remote = token.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        remote.abort();
    });

    let mut calls = 0;
    let started = Instant::now();
    let result: Result<(), RetryError<ApiError>> = policy.execute_cancellable(
        "chat",
        || {
            calls += 1;
            Err(unavailable())
        },
        &token,
    );
    canceller.join().unwrap();

    match result {
        Err(RetryError::Aborted { attempts, last }) => {
            assert_eq!(attempts, 1);
            assert!(matches!(last, ApiError::Status { code: 503, .. }));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(calls, 1);
    assert_eq!(log.give_ups(), 0);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn cancellable_without_abort_reports_failed() {
    let (policy, _log) = policy(2);
    let result: Result<(), RetryError<ApiError>> =
        policy.execute_cancellable("chat", || Err(unavailable()), &AbortToken::new());
    assert!(matches!(result, Err(RetryError::Failed(_))));
}

#[test]
fn concurrent_invocations_do_not_share_state() {
    let (policy, log) = policy(3);
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let policy = policy.clone();
            thread::spawn(move || {
                let calls = AtomicU32::new(0);
                let result = policy.execute(&format!("worker-{i}"), || {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(unavailable())
                    } else {
                        Ok(i)
                    }
                });
                (result.unwrap(), calls.load(Ordering::SeqCst))
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let (value, calls) = handle.join().unwrap();
        assert_eq!(value, i);
        assert_eq!(calls, 2);
    }
    assert_eq!(log.backoffs(), 4);
    assert_eq!(log.give_ups(), 0);
}

#[tokio::test]
async fn async_loop_matches_blocking_loop() {
    let (policy, log) = policy(5);
    let calls = AtomicU32::new(0);
    let result = policy
        .execute_async("complete", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= 2 {
                    Err(ApiError::Other("Rate limit reached".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
    assert_eq!(result.unwrap(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(log.backoffs(), 2);
}

#[tokio::test]
async fn async_non_retryable_and_give_up() {
    let (policy, log) = policy(3);
    let calls = AtomicU32::new(0);
    let result: Result<(), ApiError> = policy
        .execute_async("complete", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::Other("bad request".into())) }
        })
        .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let result: Result<(), ApiError> = policy
        .execute_async("complete", || async { Err(unavailable()) })
        .await;
    assert!(result.is_err());
    assert_eq!(log.give_ups(), 1);
}

#[tokio::test]
async fn async_abort_during_wait() {
    let cfg = RetryConfig::new(
        5,
        Duration::from_secs(60),
        Duration::from_secs(10),
        Duration::from_secs(10),
    )
    .unwrap();
    let policy = RetryPolicy::with_logger(cfg, Arc::new(Recorder::default()));
    let token = AbortToken::new();
    let remote = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        remote.abort();
    });

    let result: Result<(), RetryError<ApiError>> = policy
        .execute_async_cancellable("chat", || async { Err(unavailable()) }, &token)
        .await;
    assert!(result.unwrap_err().is_aborted());
}
