// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Supervision Utilities
//!
//! Supervised concurrent task execution with error logging and lifecycle
//! tracking. Prevents spawn-and-forget: every spawned task logs its start
//! and outcome, and the caller must await the returned handle.

use tokio::task::JoinHandle;
use tracing::{debug, error};

use claims_pipeline_domain::IngestError;

/// Result type alias for application operations.
pub type AppResult<T> = Result<T, IngestError>;

/// Spawns a supervised task with automatic error logging.
///
/// The returned `JoinHandle` must be awaited by the caller, normally via
/// [`join_supervised`].
pub fn spawn_supervised<F, T>(name: &'static str, fut: F) -> JoinHandle<AppResult<T>>
where
    F: std::future::Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    debug!(task = name, "task starting");

    tokio::spawn(async move {
        let result = fut.await;

        match &result {
            Ok(_) => debug!(task = name, "task completed successfully"),
            Err(e) => error!(task = name, error = ?e, "task failed"),
        }

        result
    })
}

/// Awaits a supervised task handle, converting panics into errors.
pub async fn join_supervised<T>(handle: JoinHandle<AppResult<T>>) -> AppResult<T> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(IngestError::internal(format!("task panicked: {e}"))),
        Err(e) => Err(IngestError::Cancelled(format!("task aborted: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_supervised_success() {
        let handle = spawn_supervised("ok-task", async { Ok(42) });
        assert_eq!(join_supervised(handle).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn spawn_supervised_error_propagates() {
        let handle = spawn_supervised("failing-task", async {
            Err::<(), _>(IngestError::internal("boom"))
        });
        assert!(join_supervised(handle).await.is_err());
    }

    #[tokio::test]
    async fn join_supervised_converts_panics() {
        let handle = spawn_supervised("panicking-task", async {
            panic!("deliberate test panic");
            #[allow(unreachable_code)]
            Ok(())
        });
        let err = join_supervised(handle).await.unwrap_err();
        assert!(matches!(err, IngestError::Internal(_)));
    }
}
