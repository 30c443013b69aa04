// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingestion Pipeline
//!
//! The six-stage flow one work item passes through:
//!
//! 1. **Register** - insert-or-find the `ingestion_file` stub (the dedup
//!    point for double delivery);
//! 2. **Parse** - one forward pass over the XML into typed DTOs;
//! 3. **Validate** - header-level required fields (per-object validation
//!    happens inside the persisters, where a bad object skips alone);
//! 4. **Persist** - the idempotent graph write, one transaction per claim;
//! 5. **Verify** - persisted counts vs the parsed document;
//! 6. **Ack** - source-specific acknowledgement, gated on verify-ok.
//!
//! Stages are isolated: a failure is recorded against the file and the item
//! reports the failed stage; the worker moves on. `process` itself never
//! returns an error — a pipeline bug must not kill a worker.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use claims_pipeline_domain::entities::{ParseOutcome, PersistSummary, VerifyReport};
use claims_pipeline_domain::repositories::{DocumentPersister, IngestionErrorRecord, IngestionStore};
use claims_pipeline_domain::services::header_missing_fields;
use claims_pipeline_domain::value_objects::pipeline_stage::{ErrorObjectType, PipelineStage};
use claims_pipeline_domain::{IngestError, WorkItem};

use crate::infrastructure::metrics::IngestionMetrics;
use crate::infrastructure::services::verifier::Verifier;

/// Source-specific post-verify acknowledgement.
///
/// Localfs moves the claimed file out of the drop zone; DHPO calls
/// `SetTransactionDownloaded` when the toggle allows it.
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self, item: &WorkItem, report: &FileReport) -> Result<(), IngestError>;
}

/// No-op acker for compositions that handle acknowledgement elsewhere.
pub struct NoopAcker;

#[async_trait]
impl Acker for NoopAcker {
    async fn ack(&self, _item: &WorkItem, _report: &FileReport) -> Result<(), IngestError> {
        Ok(())
    }
}

/// Outcome of one work item.
#[derive(Debug, Clone, Default)]
pub struct FileReport {
    pub file_id: String,
    pub ingestion_file_id: Option<i64>,
    /// The file was already fully verified by an earlier run.
    pub duplicate: bool,
    pub summary: PersistSummary,
    pub verify: Option<VerifyReport>,
    pub failed_stage: Option<PipelineStage>,
    pub error: Option<String>,
}

impl FileReport {
    pub fn verify_ok(&self) -> bool {
        self.duplicate || self.verify.as_ref().is_some_and(|v| v.ok)
    }

    pub fn succeeded(&self) -> bool {
        self.failed_stage.is_none()
    }

    fn fail(mut self, stage: PipelineStage, error: &IngestError) -> Self {
        self.failed_stage = Some(stage);
        self.error = Some(error.to_string());
        self
    }
}

pub struct IngestionPipeline {
    store: Arc<dyn IngestionStore>,
    persister: Arc<dyn DocumentPersister>,
    verifier: Verifier,
    acker: Arc<dyn Acker>,
    metrics: Arc<IngestionMetrics>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn IngestionStore>,
        persister: Arc<dyn DocumentPersister>,
        verifier: Verifier,
        acker: Arc<dyn Acker>,
        metrics: Arc<IngestionMetrics>,
    ) -> Self {
        Self {
            store,
            persister,
            verifier,
            acker,
            metrics,
        }
    }

    /// Runs one work item through all stages. Infallible by design; every
    /// failure is recorded and reflected in the report.
    pub async fn process(&self, item: &WorkItem) -> FileReport {
        let report = self.run_stages(item).await;

        if report.succeeded() {
            if report.duplicate {
                info!(file_id = %item.file_id, "file already verified, discarding duplicate delivery");
            } else {
                self.metrics.files_verified.inc();
                info!(
                    file_id = %item.file_id,
                    claims = report.summary.claims_persisted,
                    skipped = report.summary.claims_skipped,
                    verify_ok = report.verify_ok(),
                    "file ingested"
                );
            }
        } else {
            self.metrics.files_failed.inc();
            warn!(
                file_id = %item.file_id,
                stage = ?report.failed_stage,
                error = report.error.as_deref().unwrap_or(""),
                "file failed"
            );
        }

        // Ack runs for every terminal state; the acker itself decides what
        // a failed or duplicate file means for its source.
        if let Err(e) = self.acker.ack(item, &report).await {
            self.record(
                IngestionErrorRecord::new(report.ingestion_file_id, PipelineStage::Ack, "ACK_FAILED", e.to_string())
                    .retryable(e.is_recoverable()),
            )
            .await;
            error!(file_id = %item.file_id, "acknowledgement failed: {e}");
        }

        report
    }

    async fn run_stages(&self, item: &WorkItem) -> FileReport {
        let mut report = FileReport {
            file_id: item.file_id.clone(),
            ..FileReport::default()
        };

        // Idempotency fast path: a fully verified file is not reprocessed.
        match self.store.is_file_verified(&item.file_id).await {
            Ok(true) => {
                report.duplicate = true;
                return report;
            }
            Ok(false) => {}
            Err(e) => return report.fail(PipelineStage::Register, &e),
        }

        let bytes = match item.payload.read_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.record_stage_error(None, PipelineStage::Register, &e).await;
                return report.fail(PipelineStage::Register, &e);
            }
        };

        // Register.
        let ingestion_file_id = match self.store.register_file(&item.file_id, &item.file_name, &bytes).await {
            Ok(id) => id,
            Err(e) => {
                self.record_stage_error(None, PipelineStage::Register, &e).await;
                return report.fail(PipelineStage::Register, &e);
            }
        };
        report.ingestion_file_id = Some(ingestion_file_id);

        // Parse.
        let outcome = match crate::infrastructure::parsing::parse_document(&bytes) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_stage_error(Some(ingestion_file_id), PipelineStage::Parse, &e).await;
                return report.fail(PipelineStage::Parse, &e);
            }
        };

        // Validate (file level; object level happens in the persisters).
        let missing = header_missing_fields(outcome.header());
        if !missing.is_empty() {
            let e = IngestError::validation(format!("header is missing required fields: {}", missing.join(", ")));
            self.record(
                IngestionErrorRecord::new(
                    Some(ingestion_file_id),
                    PipelineStage::Validate,
                    "MISSING_HEADER_REQUIRED",
                    e.to_string(),
                )
                .with_object(ErrorObjectType::Header, None),
            )
            .await;
            return report.fail(PipelineStage::Validate, &e);
        }

        if let Err(e) = self
            .store
            .update_file_header(ingestion_file_id, outcome.root_type(), outcome.header())
            .await
        {
            self.record_stage_error(Some(ingestion_file_id), PipelineStage::Register, &e).await;
            return report.fail(PipelineStage::Register, &e);
        }

        // Persist.
        let summary = match &outcome {
            ParseOutcome::Submission(doc) => self.persister.persist_submission(ingestion_file_id, doc).await,
            ParseOutcome::Remittance(doc) => self.persister.persist_remittance(ingestion_file_id, doc).await,
        };
        let summary = match summary {
            Ok(summary) => summary,
            Err(e) => {
                self.record_stage_error(Some(ingestion_file_id), PipelineStage::Persist, &e).await;
                return report.fail(PipelineStage::Persist, &e);
            }
        };
        self.metrics.claims_persisted.inc_by(summary.claims_persisted);
        self.metrics.claims_skipped.inc_by(summary.claims_skipped);
        report.summary = summary;

        // Verify.
        match self.verifier.verify(ingestion_file_id, &outcome, &report.summary).await {
            Ok(verify) => report.verify = Some(verify),
            Err(e) => {
                self.record_stage_error(Some(ingestion_file_id), PipelineStage::Verify, &e).await;
                return report.fail(PipelineStage::Verify, &e);
            }
        }

        report
    }

    async fn record_stage_error(&self, ingestion_file_id: Option<i64>, stage: PipelineStage, error: &IngestError) {
        let record = match error {
            IngestError::Parse(failure) => IngestionErrorRecord::new(
                ingestion_file_id,
                stage,
                failure.code.clone(),
                failure.cause.clone(),
            )
            .with_object(failure.object_type, failure.object_key.clone()),
            other => IngestionErrorRecord::new(ingestion_file_id, stage, other.category().to_uppercase(), other.to_string())
                .retryable(other.is_recoverable()),
        };
        self.record(record).await;
    }

    async fn record(&self, record: IngestionErrorRecord) {
        self.metrics.errors_by_stage.with_label_values(&[record.stage.as_str()]).inc();
        if let Err(e) = self.store.record_error(record).await {
            error!("failed to record ingestion error: {e}");
        }
    }
}
