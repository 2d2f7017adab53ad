//! Panic containment for user callbacks.
//!
//! Consumer, listener and exception-handler code supplied by the application
//! runs on the consumer work pool under `catch_unwind`. A panic there is
//! reported as [`CallbackError::Panicked`] and never takes down a worker or
//! the connection driver.

use std::{
    any::Any,
    fmt,
    future::Future,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Mutex, MutexGuard, PoisonError},
};

use futures::FutureExt;

use crate::{consumer::CallbackResult, exception::CallbackError};

/// Formats a panic payload when logged or displayed.
///
/// String payloads are shown as-is; any other payload is shown through its
/// `Debug` representation.
///
/// ```
/// use amqpframe::panic::format_panic;
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert_eq!(format_panic(Box::new(String::from("bang"))).to_string(), "bang");
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl PanicMessage {
    fn as_str(&self) -> Option<&str> {
        self.0
            .downcast_ref::<&'static str>()
            .copied()
            .or_else(|| self.0.downcast_ref::<String>().map(String::as_str))
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(message) => f.write_str(message),
            None => write!(f, "{:?}", self.0),
        }
    }
}

/// Create a [`PanicMessage`] for the given payload.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }

fn into_callback_error(outcome: Result<CallbackResult, Box<dyn Any + Send>>) -> Result<(), CallbackError> {
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(CallbackError::Failed(error)),
        Err(panic) => Err(CallbackError::Panicked(format_panic(panic).to_string())),
    }
}

/// Run a synchronous callback, converting failures and panics.
pub(crate) fn guard(callback: impl FnOnce() -> CallbackResult) -> Result<(), CallbackError> {
    into_callback_error(catch_unwind(AssertUnwindSafe(callback)))
}

/// Await an asynchronous callback, converting failures and panics.
pub(crate) async fn guard_async(
    callback: impl Future<Output = CallbackResult>,
) -> Result<(), CallbackError> {
    into_callback_error(AssertUnwindSafe(callback).catch_unwind().await)
}

/// Lock a mutex, recovering the guard if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_string_payload_uses_debug() {
        assert!(format_panic(Box::new(5_u32)).to_string().contains("Any"));
    }

    #[test]
    fn guard_reports_panics() {
        let outcome = guard(|| panic!("callback exploded"));
        assert!(matches!(
            outcome,
            Err(CallbackError::Panicked(message)) if message == "callback exploded"
        ));
    }

    #[test]
    fn guard_passes_failures_through() {
        let outcome = guard(|| Err("refused".into()));
        assert!(matches!(outcome, Err(CallbackError::Failed(e)) if e.to_string() == "refused"));
    }

    #[tokio::test]
    async fn guard_async_reports_panics() {
        let outcome = guard_async(async {
            let value: CallbackResult = panic!("async boom");
            value
        })
        .await;
        assert!(matches!(outcome, Err(CallbackError::Panicked(_))));
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let mutex = std::sync::Arc::new(Mutex::new(1));
        let clone = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().expect("lock");
            panic!("poison");
        })
        .join();
        assert_eq!(*lock(&mutex), 1);
    }
}
