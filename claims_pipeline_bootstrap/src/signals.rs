// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Signal Handling
//!
//! Wires OS termination signals to the phased shutdown: the first
//! SIGTERM/SIGINT moves the process into the draining phase (fetch stops,
//! the work queue empties); the composition root decides when the drain is
//! over and advances to stopped. On non-Unix targets ctrl-c is the only
//! trigger.

use tracing::info;

use crate::shutdown::ShutdownController;

/// Spawns the signal listener. The returned handle resolves once a
/// termination signal has been observed and draining has begun.
pub fn install(controller: ShutdownController) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_termination().await;
        controller.begin_drain();
    })
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("failed to install SIGTERM handler: {e}");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("received ctrl-c");
    }
}
