//! Per-operation structured logging.

use std::{future::Future, time::Instant};

use crate::error::ClientResult;

/// Runs one client operation and emits exactly one event describing it.
///
/// Successful operations log at `info`, failed ones at `warn`. Both carry `operation`,
/// `namespace`, `duration_ms` and `outcome` (`"ok"` or the error kind).
pub(crate) async fn instrument<R, F>(
    operation: &'static str,
    namespace: &str,
    operation_future: F,
) -> ClientResult<R>
where
    F: Future<Output = ClientResult<R>>,
{
    let started = Instant::now();
    let result = operation_future.await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match &result {
        Ok(_) => tracing::info!(
            operation,
            namespace,
            duration_ms,
            outcome = "ok",
            "operation completed",
        ),
        Err(err) => tracing::warn!(
            operation,
            namespace,
            duration_ms,
            outcome = err.kind().as_str(),
            error = %err,
            "operation failed",
        ),
    }

    result
}
