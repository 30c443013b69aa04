// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Phased Shutdown
//!
//! Ingestion cannot stop in one step without losing work: files already
//! accepted into the bounded queue deserve to finish, but nothing new
//! should be fetched while they do. Shutdown therefore moves through
//! ordered phases:
//!
//! - **Running** — normal operation.
//! - **Draining** — entered on SIGTERM/SIGINT. Fetch adapters and
//!   schedulers stop producing; the worker pool keeps emptying the queue.
//! - **Stopped** — entered once the orchestrator's drain completes (or its
//!   deadline expires and the remainder is reported abandoned). Everything
//!   still running winds down.
//!
//! The phase lives in a tokio watch channel: one [`ShutdownController`]
//! advances it, any number of cloned [`ShutdownSignal`]s observe it. The
//! phase is monotone — it never moves backwards, and repeated advances are
//! no-ops — so late observers always see the furthest phase reached.

use tokio::sync::watch;

/// Where the process is in its shutdown lifecycle. Ordered; comparisons use
/// that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    Running,
    Draining,
    Stopped,
}

/// Creates a controller/signal pair starting in [`ShutdownPhase::Running`].
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (tx, rx) = watch::channel(ShutdownPhase::Running);
    (ShutdownController { tx }, ShutdownSignal { rx })
}

/// Advances the shutdown phase. Cloneable so the signal handler and the
/// composition root can both drive it.
#[derive(Clone)]
pub struct ShutdownController {
    tx: watch::Sender<ShutdownPhase>,
}

impl ShutdownController {
    /// Enters `Draining`: producers stop, the queue empties.
    pub fn begin_drain(&self) {
        self.advance(ShutdownPhase::Draining);
    }

    /// Enters `Stopped`: the drain is over, everything winds down.
    pub fn stop(&self) {
        self.advance(ShutdownPhase::Stopped);
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.tx.borrow()
    }

    /// A fresh observer of this controller's phase.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    fn advance(&self, target: ShutdownPhase) {
        self.tx.send_if_modified(|phase| {
            if *phase < target {
                tracing::info!(from = ?*phase, to = ?target, "shutdown phase advanced");
                *phase = target;
                true
            } else {
                false
            }
        });
    }
}

/// Observes the shutdown phase. Cheap to clone; handed to every scheduler
/// and worker.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<ShutdownPhase>,
}

impl ShutdownSignal {
    pub fn phase(&self) -> ShutdownPhase {
        *self.rx.borrow()
    }

    /// Producers check this: true from `Draining` onwards.
    pub fn is_draining(&self) -> bool {
        self.phase() >= ShutdownPhase::Draining
    }

    /// Workers check this: true only once the drain is over.
    pub fn is_stopped(&self) -> bool {
        self.phase() == ShutdownPhase::Stopped
    }

    /// Waits until the phase reaches `target`. Returns immediately when it
    /// already has. A dropped controller counts as `Stopped` — with nobody
    /// left to advance the phase, waiting further would hang forever.
    pub async fn reached(&self, target: ShutdownPhase) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|phase| *phase >= target).await;
    }

    /// Waits for the `Draining` phase.
    pub async fn draining(&self) {
        self.reached(ShutdownPhase::Draining).await;
    }

    /// Waits for the `Stopped` phase.
    pub async fn stopped(&self) {
        self.reached(ShutdownPhase::Stopped).await;
    }
}
