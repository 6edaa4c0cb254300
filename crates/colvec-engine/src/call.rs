//! Wrapping for calls into the embedding and storage adapters: optional
//! timeouts and error context.

use colvec_core::{ColvecError, ColvecResult};
use std::future::Future;
use std::time::Duration;

/// Which adapter a call goes to; decides how foreign errors are classified.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Adapter {
    Embedding,
    Storage,
}

/// Await an adapter call, bounded by `timeout` when set, and attach
/// `context` to any error it returns.
pub(crate) async fn bounded<T, C, F>(
    adapter: Adapter,
    timeout: Option<Duration>,
    context: C,
    fut: F,
) -> ColvecResult<T>
where
    C: FnOnce() -> String,
    F: Future<Output = ColvecResult<T>>,
{
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(ColvecError::Cancelled(format!(
                    "{}: timed out after {} ms",
                    context(),
                    limit.as_millis()
                )))
            }
        },
        None => fut.await,
    };
    outcome.map_err(|e| with_context(adapter, &context(), e))
}

/// Prefix an adapter error with operation context, keeping its category.
///
/// Errors that already carry a precise category pass through unchanged;
/// JSON and I/O failures are filed under the adapter that raised them.
pub(crate) fn with_context(adapter: Adapter, context: &str, err: ColvecError) -> ColvecError {
    match err {
        ColvecError::Embedding(msg) => ColvecError::Embedding(format!("{context}: {msg}")),
        ColvecError::Storage(msg) => ColvecError::Storage(format!("{context}: {msg}")),
        ColvecError::Cancelled(msg) => ColvecError::Cancelled(format!("{context}: {msg}")),
        ColvecError::ShapeMismatch {
            expected,
            found,
            context: inner,
        } => ColvecError::ShapeMismatch {
            expected,
            found,
            context: format!("{context}: {inner}"),
        },
        foreign @ (ColvecError::Json(_) | ColvecError::Io(_)) => match adapter {
            Adapter::Embedding => ColvecError::Embedding(format!("{context}: {foreign}")),
            Adapter::Storage => ColvecError::Storage(format!("{context}: {foreign}")),
        },
        other => other,
    }
}
