//! Bounded retry for transient errors.
//!
//! The default policy is five attempts with a fixed 15 second pause, which
//! is what node bootstrap uses for runtime installation and image pulls.
//! Any error type can be retried; [`with_retry`] uses the [`Retryable`]
//! classification and [`with_retry_if`] takes an explicit predicate.

use crate::error::Error;
use std::fmt;
use std::thread;
use std::time::Duration;

/// Retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(15))
    }
}

impl RetryPolicy {
    /// Same delay between every attempt.
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// A policy that never retries.
    pub const fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }
}

/// Classification of errors worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an attempt failed and another will follow.
    ///
    /// # Arguments
    /// * `attempt` - Attempt that just failed (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay` - Pause before the next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &dyn fmt::Display, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &dyn fmt::Display, _delay: Duration) {}
}

/// Callback that reports retries through the `log` facade.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &dyn fmt::Display, delay: Duration) {
        log::warn!(
            "attempt {attempt}/{max_attempts} failed: {error}. Retrying in {}s...",
            delay.as_secs()
        );
    }
}

/// Execute an operation, retrying errors that classify as [`Retryable`].
///
/// Returns the first success, the first non-retryable error, or the error
/// of the last attempt once the budget is spent.
pub fn with_retry<T, E, F>(policy: &RetryPolicy, callback: Option<&dyn RetryCallback>, operation: F) -> Result<T, E>
where
    E: Retryable + fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    with_retry_if(policy, callback, E::is_retryable, operation)
}

/// Execute an operation, retrying errors for which `retryable` holds.
pub fn with_retry_if<T, E, P, F>(
    policy: &RetryPolicy,
    callback: Option<&dyn RetryCallback>,
    retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    E: fmt::Display,
    P: Fn(&E) -> bool,
    F: FnMut() -> Result<T, E>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if !retryable(&e) || attempt >= max_attempts {
                    return Err(e);
                }

                let delay = policy.delay;
                if let Some(cb) = callback {
                    cb.on_retry(attempt, max_attempts, &e, delay);
                }
                thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn network() -> Error {
        Error::Network {
            step: "install".to_string(),
            message: "timeout".to_string(),
        }
    }

    #[test]
    fn test_default_policy_is_fixed() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::fixed(5, Duration::from_secs(15)));
    }

    #[test]
    fn test_callback_sees_fixed_delay() {
        struct Delays(RefCell<Vec<Duration>>);
        impl RetryCallback for Delays {
            fn on_retry(&self, _: u32, _: u32, _: &dyn fmt::Display, delay: Duration) {
                self.0.borrow_mut().push(delay);
            }
        }

        let policy = RetryPolicy::fixed(4, Duration::from_millis(1));
        let delays = Delays(RefCell::new(Vec::new()));
        let _: Result<(), Error> = with_retry(&policy, Some(&delays), || Err(network()));

        assert_eq!(delays.0.into_inner(), vec![Duration::from_millis(1); 3]);
    }

    #[test]
    fn test_with_retry_success_first_try() {
        let result = with_retry(&RetryPolicy::no_retry(), None, || Ok::<_, Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_with_retry_non_retryable_error() {
        let policy = RetryPolicy::fixed(5, Duration::ZERO);
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<(), Error> = with_retry(&policy, None, || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(Error::Auth {
                message: "unauthorized".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_with_retry_eventual_success() {
        let policy = RetryPolicy::fixed(5, Duration::ZERO);
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry(&policy, None, || {
            let current = attempts_clone.get();
            attempts_clone.set(current + 1);
            if current < 2 { Err(network()) } else { Ok(42) }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_with_retry_all_attempts_fail() {
        let policy = RetryPolicy::fixed(5, Duration::ZERO);
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<(), Error> = with_retry(&policy, None, || {
            attempts_clone.set(attempts_clone.get() + 1);
            Err(network())
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 5);
    }

    #[test]
    fn test_with_retry_if_custom_predicate() {
        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        let attempts = Cell::new(0);

        let result: Result<(), String> = with_retry_if(
            &policy,
            None,
            |e: &String| e.starts_with("503"),
            || {
                attempts.set(attempts.get() + 1);
                Err("503 service unavailable".to_string())
            },
        );

        assert_eq!(result.unwrap_err(), "503 service unavailable");
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_callback_invoked() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingCallback(Arc<AtomicU32>);
        impl RetryCallback for CountingCallback {
            fn on_retry(&self, _: u32, _: u32, _: &dyn fmt::Display, _: Duration) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        let callback_count = Arc::new(AtomicU32::new(0));
        let callback = CountingCallback(callback_count.clone());

        let _: Result<(), Error> = with_retry(&policy, Some(&callback), || Err(network()));

        // Called between attempts only: not after the last one
        assert_eq!(callback_count.load(Ordering::SeqCst), 2);
    }
}
