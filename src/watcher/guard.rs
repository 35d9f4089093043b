//! Fault containment for public entry points
//!
//! A panic inside message handling, connect or release must not take the
//! delivery task or the supervisor down with it. [`contain`] runs an
//! operation, converts a panic into [`WatcherError::Internal`] and logs it
//! together with a backtrace.

use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::error::{Result, WatcherError};
use crate::watcher::logging::ComponentLog;

/// Run `fut`, turning a panic into a logged `Internal` error.
///
/// # Examples
///
/// ```
/// use s3_data_watcher::watcher::guard::contain;
/// use s3_data_watcher::watcher::logging::ComponentLog;
/// use s3_data_watcher::WatcherError;
///
/// # #[tokio::main]
/// # async fn main() {
/// fn parse(input: &str) -> Result<u32, WatcherError> {
///     panic!("bad input: {}", input)
/// }
///
/// let log = ComponentLog::new("example");
/// let result = contain(log, "parse", async { parse("x") }).await;
/// assert!(matches!(result, Err(WatcherError::Internal(_))));
/// # }
/// ```
pub async fn contain<F, T>(log: ComponentLog, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let backtrace = Backtrace::force_capture();
            tracing::error!(
                component = log.component(),
                operation = operation,
                panic = %message,
                "stacktrace from panic:\n{}",
                backtrace
            );
            Err(WatcherError::Internal(format!(
                "{} panicked: {}",
                operation, message
            )))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
