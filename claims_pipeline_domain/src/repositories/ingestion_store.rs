// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingestion Store Port
//!
//! File-envelope bookkeeping: registration (the single coordination point
//! that dedupes double delivery), header updates after parse, error
//! recording, verify flags, run audit, and the persisted-count queries the
//! verifier compares against the parsed document.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::ingestion_file::{FileHeader, RootType};
use crate::value_objects::pipeline_stage::{ErrorObjectType, PipelineStage};
use crate::IngestError;

/// One row for `claims_ingestion_error`.
#[derive(Debug, Clone)]
pub struct IngestionErrorRecord {
    pub ingestion_file_id: Option<i64>,
    pub stage: PipelineStage,
    pub object_type: Option<ErrorObjectType>,
    pub object_key: Option<String>,
    pub error_code: String,
    pub message: String,
    pub retryable: bool,
}

impl IngestionErrorRecord {
    pub fn new(
        ingestion_file_id: Option<i64>,
        stage: PipelineStage,
        error_code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ingestion_file_id,
            stage,
            object_type: None,
            object_key: None,
            error_code: error_code.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn with_object(mut self, object_type: ErrorObjectType, object_key: Option<String>) -> Self {
        self.object_type = Some(object_type);
        self.object_key = object_key;
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

/// Row counts the verifier compares against the parsed document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistedCounts {
    pub claims: i64,
    pub activities: i64,
    pub remittance_claims: i64,
    pub remittance_activities: i64,
}

/// Aggregate counters for one fetch/ingest run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub files_fetched: i64,
    pub files_ok: i64,
    pub files_failed: i64,
    pub claims_persisted: i64,
    pub claims_skipped: i64,
    pub verify_ok: Option<bool>,
}

/// File-envelope persistence operations.
#[async_trait]
pub trait IngestionStore: Send + Sync {
    /// Inserts the file stub if unseen and returns the internal id. Re-registering
    /// an existing `file_id` returns the existing id without touching the row.
    async fn register_file(&self, file_id: &str, file_name: &str, raw_xml: &[u8]) -> Result<i64, IngestError>;

    /// Whether this external file id was already ingested and verified.
    async fn is_file_verified(&self, file_id: &str) -> Result<bool, IngestError>;

    /// Stores the header fields discovered during parse.
    async fn update_file_header(
        &self,
        ingestion_file_id: i64,
        root_type: RootType,
        header: &FileHeader,
    ) -> Result<(), IngestError>;

    /// Marks the file fully verified.
    async fn mark_file_verified(&self, ingestion_file_id: i64) -> Result<(), IngestError>;

    /// Appends one error record. Error recording must never itself abort the
    /// pipeline; implementations log and swallow their own failures.
    async fn record_error(&self, record: IngestionErrorRecord) -> Result<(), IngestError>;

    /// Persisted row counts for one file.
    async fn persisted_counts(&self, ingestion_file_id: i64) -> Result<PersistedCounts, IngestError>;

    /// Opens a run-audit row; returns the internal run row id.
    async fn start_run(&self, run_id: &str, source: &str, started_at: DateTime<Utc>) -> Result<i64, IngestError>;

    /// Closes a run-audit row with aggregate counters.
    async fn complete_run(&self, run_row_id: i64, stats: &RunStats) -> Result<(), IngestError>;
}
