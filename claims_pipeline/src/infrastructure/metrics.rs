// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingestion Metrics
//!
//! Prometheus counters and gauges for the pipeline. Metric updates are
//! fire-and-forget: a metrics failure must never fail ingestion, so
//! registration happens once at construction and updates are infallible.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Shared handle to the pipeline's metric families.
#[derive(Clone)]
pub struct IngestionMetrics {
    registry: Registry,
    pub files_received: IntCounter,
    pub files_verified: IntCounter,
    pub files_failed: IntCounter,
    pub claims_persisted: IntCounter,
    pub claims_skipped: IntCounter,
    pub errors_by_stage: IntCounterVec,
    pub queue_depth: IntGauge,
    pub soap_calls: IntCounterVec,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let files_received = IntCounter::new("claims_files_received_total", "Files accepted into the work queue")
            .expect("valid metric definition");
        let files_verified = IntCounter::new("claims_files_verified_total", "Files that passed post-persist verify")
            .expect("valid metric definition");
        let files_failed =
            IntCounter::new("claims_files_failed_total", "Files that finished with a failed stage").expect("valid metric definition");
        let claims_persisted =
            IntCounter::new("claims_claims_persisted_total", "Claims persisted across all files").expect("valid metric definition");
        let claims_skipped =
            IntCounter::new("claims_claims_skipped_total", "Claims skipped by validation or duplicate guards")
                .expect("valid metric definition");
        let errors_by_stage = IntCounterVec::new(
            Opts::new("claims_ingestion_errors_total", "Recorded ingestion errors"),
            &["stage"],
        )
        .expect("valid metric definition");
        let queue_depth =
            IntGauge::new("claims_work_queue_depth", "Items currently queued for ingestion").expect("valid metric definition");
        let soap_calls = IntCounterVec::new(
            Opts::new("claims_dhpo_calls_total", "DHPO SOAP calls by operation and outcome"),
            &["operation", "outcome"],
        )
        .expect("valid metric definition");

        for collector in [
            Box::new(files_received.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(files_verified.clone()),
            Box::new(files_failed.clone()),
            Box::new(claims_persisted.clone()),
            Box::new(claims_skipped.clone()),
            Box::new(errors_by_stage.clone()),
            Box::new(queue_depth.clone()),
            Box::new(soap_calls.clone()),
        ] {
            registry.register(collector).expect("metric registers once");
        }

        Self {
            registry,
            files_received,
            files_verified,
            files_failed,
            claims_persisted,
            claims_skipped,
            errors_by_stage,
            queue_depth,
            soap_calls,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Renders the registry in the Prometheus text format.
    pub fn gather_text(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for IngestionMetrics {
    fn default() -> Self {
        Self::new()
    }
}
