// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fixed-Delay Scheduler
//!
//! Runs a tick function on a fixed delay: the next delay starts only after
//! the previous tick finishes, so a slow tick never overlaps itself
//! (single-flight per task). Tick errors are logged and the schedule
//! continues.
//!
//! Schedulers are producers, so they stop at the *draining* phase of the
//! shutdown — fetch work must end while the worker pool is still emptying
//! the queue.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info};

use claims_pipeline_bootstrap::shutdown::ShutdownSignal;

use claims_pipeline_domain::IngestError;

/// Runs `tick` every `delay` until the shutdown signal starts draining.
/// The first tick runs immediately.
pub async fn run_fixed_delay<F, Fut>(name: &'static str, delay: Duration, shutdown: ShutdownSignal, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), IngestError>>,
{
    info!(task = name, ?delay, "scheduler started");
    loop {
        if shutdown.is_draining() {
            break;
        }

        debug!(task = name, "tick starting");
        match tick().await {
            Ok(()) => debug!(task = name, "tick completed"),
            Err(e) => error!(task = name, "tick failed: {e}"),
        }

        tokio::select! {
            _ = shutdown.draining() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    info!(task = name, "scheduler stopped");
}
