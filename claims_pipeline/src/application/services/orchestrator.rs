// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingestion Orchestrator
//!
//! Owns the bounded work queue and the worker pool. Fetch adapters enqueue
//! [`WorkItem`]s through [`Orchestrator::submit`], which fails fast with
//! `QueueFull` when capacity is exhausted — adapters are expected to check
//! [`Orchestrator::queue_available`] and pause when there is no headroom.
//!
//! Workers drain the queue FIFO with no priorities, run each item through
//! the pipeline, and never die on a single item. Shutdown closes the queue
//! to new submissions, waits for in-flight work up to the deadline, then
//! cancels the workers and reports what was completed vs abandoned.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use claims_pipeline_bootstrap::shutdown::{shutdown_channel, ShutdownController};
use claims_pipeline_domain::{IngestError, WorkItem};

use crate::application::services::pipeline::IngestionPipeline;
use crate::infrastructure::config::IngestionConfig;
use crate::infrastructure::metrics::IngestionMetrics;
use crate::infrastructure::runtime::supervisor::{join_supervised, spawn_supervised, AppResult};

/// What the queue drained to at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: u64,
    pub abandoned: u64,
}

pub struct Orchestrator {
    tx: mpsc::Sender<WorkItem>,
    workers: Mutex<Vec<tokio::task::JoinHandle<AppResult<()>>>>,
    /// The orchestrator's own shutdown phases. Independent from the
    /// process-wide signal: workers keep running through the global
    /// draining phase (they *are* the drain) and stop only when
    /// [`Orchestrator::shutdown`] advances this controller.
    control: ShutdownController,
    closed: AtomicBool,
    submitted: AtomicU64,
    processed: Arc<AtomicU64>,
    metrics: Arc<IngestionMetrics>,
}

impl Orchestrator {
    /// Launches the worker pool and returns the running orchestrator.
    pub fn start(
        config: &IngestionConfig,
        pipeline: Arc<IngestionPipeline>,
        metrics: Arc<IngestionMetrics>,
    ) -> Arc<Self> {
        let (control, signal) = shutdown_channel();
        let worker_count = config.workers.max(1);
        let item_deadline = Duration::from_millis(config.stage_timeout_ms.max(1));
        let (tx, rx) = mpsc::channel::<WorkItem>(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let processed = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let rx = rx.clone();
            let pipeline = pipeline.clone();
            let signal = signal.clone();
            let processed = processed.clone();
            let metrics = metrics.clone();

            workers.push(spawn_supervised("ingestion-worker", async move {
                debug!(worker_id, "worker started");
                loop {
                    // Hold the receiver lock only while waiting for an item
                    // so siblings can take over the queue between items.
                    let item = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            _ = signal.stopped() => None,
                            item = rx.recv() => item,
                        }
                    };

                    let Some(item) = item else {
                        debug!(worker_id, "worker stopping");
                        return Ok(());
                    };

                    metrics.queue_depth.dec();
                    // Deadline on the item's stage chain; a claim mid-persist
                    // rolls back on its own transaction boundary.
                    if tokio::time::timeout(item_deadline, pipeline.process(&item)).await.is_err() {
                        warn!(file_id = %item.file_id, "item exceeded the stage deadline and was abandoned");
                    }
                    processed.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        info!(workers = worker_count, capacity = config.queue_capacity, "orchestrator started");

        Arc::new(Self {
            tx,
            workers: Mutex::new(workers),
            control,
            closed: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            processed,
            metrics,
        })
    }

    /// Enqueues one item; `QueueFull` when the bounded queue has no room.
    pub fn submit(&self, item: WorkItem) -> Result<(), IngestError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IngestError::Cancelled("orchestrator is shutting down".into()));
        }
        match self.tx.try_send(item) {
            Ok(()) => {
                self.submitted.fetch_add(1, Ordering::SeqCst);
                self.metrics.files_received.inc();
                self.metrics.queue_depth.inc();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(IngestError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(IngestError::Cancelled("work queue is closed".into()))
            }
        }
    }

    /// Remaining queue headroom; fetch adapters pause at zero.
    pub fn queue_available(&self) -> usize {
        self.tx.capacity()
    }

    /// Items accepted over the orchestrator's lifetime.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Items fully processed over the orchestrator's lifetime.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Closes the queue, drains in-flight work until `timeout`, then stops
    /// the workers.
    pub async fn shutdown(&self, timeout: Duration) -> DrainReport {
        self.closed.store(true, Ordering::SeqCst);
        self.control.begin_drain();
        info!("orchestrator draining (deadline {timeout:?})");

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let submitted = self.submitted();
            let processed = self.processed();
            if processed >= submitted {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    outstanding = submitted - processed,
                    "drain deadline reached, abandoning queued work"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        self.control.stop();

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(e) = join_supervised(handle).await {
                warn!("worker ended with error during shutdown: {e}");
            }
        }

        let completed = self.processed();
        let abandoned = self.submitted().saturating_sub(completed);
        info!(completed, abandoned, "orchestrator stopped");
        DrainReport { completed, abandoned }
    }
}
