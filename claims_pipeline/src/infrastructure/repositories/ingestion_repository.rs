// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingestion Store (SQLite)
//!
//! File-envelope bookkeeping over `claims_ingestion_file`,
//! `claims_ingestion_error`, and `claims_ingestion_run`.
//!
//! `register_file` is the single coordination point for double delivery:
//! the unique `file_id` column dedupes concurrent arrivals, and the insert
//! uses `ON CONFLICT DO NOTHING ... RETURNING id` with a select fallback so
//! registration costs one round trip in the common case.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{error, warn};

use claims_pipeline_domain::entities::{FileHeader, RootType};
use claims_pipeline_domain::repositories::{IngestionErrorRecord, IngestionStore, PersistedCounts, RunStats};
use claims_pipeline_domain::IngestError;

/// Maps a driver error into the domain error space.
pub(crate) fn db_err(context: &str, e: sqlx::Error) -> IngestError {
    IngestError::database(format!("{context}: {e}"))
}

pub struct SqliteIngestionStore {
    pool: SqlitePool,
}

impl SqliteIngestionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl IngestionStore for SqliteIngestionStore {
    async fn register_file(&self, file_id: &str, file_name: &str, raw_xml: &[u8]) -> Result<i64, IngestError> {
        let inserted: Option<i64> = sqlx::query_scalar(
            "INSERT INTO claims_ingestion_file (file_id, file_name, raw_xml) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT (file_id) DO NOTHING \
             RETURNING id",
        )
        .bind(file_id)
        .bind(file_name)
        .bind(raw_xml)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("register_file insert", e))?;

        match inserted {
            Some(id) => Ok(id),
            None => sqlx::query_scalar("SELECT id FROM claims_ingestion_file WHERE file_id = ?1")
                .bind(file_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_err("register_file select", e)),
        }
    }

    async fn is_file_verified(&self, file_id: &str) -> Result<bool, IngestError> {
        let verified: Option<i64> = sqlx::query_scalar("SELECT verified FROM claims_ingestion_file WHERE file_id = ?1")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("is_file_verified", e))?;
        Ok(verified == Some(1))
    }

    async fn update_file_header(
        &self,
        ingestion_file_id: i64,
        root_type: RootType,
        header: &FileHeader,
    ) -> Result<(), IngestError> {
        sqlx::query(
            "UPDATE claims_ingestion_file \
             SET root_type = ?2, sender_id = ?3, receiver_id = ?4, transaction_date = ?5, \
                 record_count = ?6, disposition_flag = ?7 \
             WHERE id = ?1",
        )
        .bind(ingestion_file_id)
        .bind(root_type.as_str())
        .bind(&header.sender_id)
        .bind(&header.receiver_id)
        .bind(header.transaction_date)
        .bind(header.record_count)
        .bind(&header.disposition_flag)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("update_file_header", e))?;
        Ok(())
    }

    async fn mark_file_verified(&self, ingestion_file_id: i64) -> Result<(), IngestError> {
        sqlx::query("UPDATE claims_ingestion_file SET verified = 1 WHERE id = ?1")
            .bind(ingestion_file_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("mark_file_verified", e))?;
        Ok(())
    }

    async fn record_error(&self, record: IngestionErrorRecord) -> Result<(), IngestError> {
        let result = sqlx::query(
            "INSERT INTO claims_ingestion_error \
             (ingestion_file_id, stage, object_type, object_key, error_code, message, retryable) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(record.ingestion_file_id)
        .bind(record.stage.as_str())
        .bind(record.object_type.map(|t| t.as_str()))
        .bind(&record.object_key)
        .bind(&record.error_code)
        .bind(&record.message)
        .bind(record.retryable as i64)
        .execute(&self.pool)
        .await;

        // Error recording is best-effort: losing one record is preferable to
        // failing the stage that was trying to report a failure.
        if let Err(e) = result {
            error!(
                stage = record.stage.as_str(),
                code = %record.error_code,
                "failed to record ingestion error: {e}"
            );
        }
        Ok(())
    }

    async fn persisted_counts(&self, ingestion_file_id: i64) -> Result<PersistedCounts, IngestError> {
        let claims: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM claims_claim c \
             JOIN claims_submission s ON s.id = c.submission_id \
             WHERE s.ingestion_file_id = ?1",
        )
        .bind(ingestion_file_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("persisted_counts claims", e))?;

        let activities: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM claims_activity a \
             JOIN claims_claim c ON c.id = a.claim_id \
             JOIN claims_submission s ON s.id = c.submission_id \
             WHERE s.ingestion_file_id = ?1",
        )
        .bind(ingestion_file_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("persisted_counts activities", e))?;

        let remittance_claims: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM claims_remittance_claim rc \
             JOIN claims_remittance r ON r.id = rc.remittance_id \
             WHERE r.ingestion_file_id = ?1",
        )
        .bind(ingestion_file_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("persisted_counts remittance claims", e))?;

        let remittance_activities: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM claims_remittance_activity ra \
             JOIN claims_remittance_claim rc ON rc.id = ra.remittance_claim_id \
             JOIN claims_remittance r ON r.id = rc.remittance_id \
             WHERE r.ingestion_file_id = ?1",
        )
        .bind(ingestion_file_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("persisted_counts remittance activities", e))?;

        Ok(PersistedCounts {
            claims,
            activities,
            remittance_claims,
            remittance_activities,
        })
    }

    async fn start_run(&self, run_id: &str, source: &str, started_at: DateTime<Utc>) -> Result<i64, IngestError> {
        sqlx::query_scalar(
            "INSERT INTO claims_ingestion_run (run_id, source, started_at) VALUES (?1, ?2, ?3) RETURNING id",
        )
        .bind(run_id)
        .bind(source)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("start_run", e))
    }

    async fn complete_run(&self, run_row_id: i64, stats: &RunStats) -> Result<(), IngestError> {
        let result = sqlx::query(
            "UPDATE claims_ingestion_run \
             SET completed_at = ?2, files_fetched = ?3, files_ok = ?4, files_failed = ?5, \
                 claims_persisted = ?6, claims_skipped = ?7, verify_ok = ?8 \
             WHERE id = ?1",
        )
        .bind(run_row_id)
        .bind(Utc::now())
        .bind(stats.files_fetched)
        .bind(stats.files_ok)
        .bind(stats.files_failed)
        .bind(stats.claims_persisted)
        .bind(stats.claims_skipped)
        .bind(stats.verify_ok.map(|v| v as i64))
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(run_row_id, "failed to close ingestion run: {e}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema::initialize_in_memory;
    use claims_pipeline_domain::value_objects::pipeline_stage::{ErrorObjectType, PipelineStage};

    async fn store() -> SqliteIngestionStore {
        SqliteIngestionStore::new(initialize_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn register_file_is_idempotent() {
        let store = store().await;
        let first = store.register_file("F-1", "f1.xml", b"<x/>").await.unwrap();
        let second = store.register_file("F-1", "f1.xml", b"<x/>").await.unwrap();
        assert_eq!(first, second);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM claims_ingestion_file")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn verified_flag_round_trips() {
        let store = store().await;
        let id = store.register_file("F-2", "f2.xml", b"<x/>").await.unwrap();
        assert!(!store.is_file_verified("F-2").await.unwrap());
        store.mark_file_verified(id).await.unwrap();
        assert!(store.is_file_verified("F-2").await.unwrap());
        // Unknown files are simply not verified.
        assert!(!store.is_file_verified("F-404").await.unwrap());
    }

    #[tokio::test]
    async fn header_update_persists_fields() {
        let store = store().await;
        let id = store.register_file("F-3", "f3.xml", b"<x/>").await.unwrap();
        let header = FileHeader {
            sender_id: Some("PROV1".into()),
            receiver_id: Some("PAYER1".into()),
            transaction_date: Some("2025-02-14T12:00:00Z".parse().unwrap()),
            record_count: Some(1),
            disposition_flag: Some("PRODUCTION".into()),
        };
        store.update_file_header(id, RootType::Submission, &header).await.unwrap();

        let (root, sender, count): (String, String, i64) = sqlx::query_as(
            "SELECT root_type, sender_id, record_count FROM claims_ingestion_file WHERE id = ?1",
        )
        .bind(id)
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(root, "Submission");
        assert_eq!(sender, "PROV1");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn errors_are_appended_with_object_context() {
        let store = store().await;
        let id = store.register_file("F-4", "f4.xml", b"<x/>").await.unwrap();
        store
            .record_error(
                IngestionErrorRecord::new(Some(id), PipelineStage::Validate, "MISSING_CLAIM_REQUIRED", "Net missing")
                    .with_object(ErrorObjectType::Claim, Some("C-9".into())),
            )
            .await
            .unwrap();

        let (stage, object_type, object_key): (String, String, String) = sqlx::query_as(
            "SELECT stage, object_type, object_key FROM claims_ingestion_error WHERE ingestion_file_id = ?1",
        )
        .bind(id)
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(stage, "VALIDATE");
        assert_eq!(object_type, "CLAIM");
        assert_eq!(object_key, "C-9");
    }

    #[tokio::test]
    async fn run_audit_round_trips() {
        let store = store().await;
        let row_id = store.start_run("01J0000000000000000000RUN1", "dhpo", Utc::now()).await.unwrap();
        store
            .complete_run(
                row_id,
                &RunStats {
                    files_fetched: 4,
                    files_ok: 3,
                    files_failed: 1,
                    claims_persisted: 10,
                    claims_skipped: 2,
                    verify_ok: Some(true),
                },
            )
            .await
            .unwrap();

        let (fetched, ok, verify): (i64, i64, i64) =
            sqlx::query_as("SELECT files_fetched, files_ok, verify_ok FROM claims_ingestion_run WHERE id = ?1")
                .bind(row_id)
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!((fetched, ok, verify), (4, 3, 1));
    }
}
