// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end drop-zone flow: sweep → claim → parse → persist → verify →
//! ack, against a real temp directory and a migrated in-memory database.

use crate::common::*;
use std::path::Path;
use std::sync::Arc;

use claims_pipeline::application::services::{IngestionPipeline, LocalFsAcker, LocalFsFetcher};
use claims_pipeline::infrastructure::config::LocalFsConfig;
use claims_pipeline::infrastructure::metrics::IngestionMetrics;
use claims_pipeline::infrastructure::services::Verifier;
use claims_pipeline_domain::repositories::{DocumentPersister, IngestionStore};

const SUBMISSION_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Claim.Submission>
  <Header>
    <SenderID>PROV1</SenderID>
    <ReceiverID>PAYER1</ReceiverID>
    <TransactionDate>14/02/2025 12:00</TransactionDate>
    <RecordCount>1</RecordCount>
    <DispositionFlag>PRODUCTION</DispositionFlag>
  </Header>
  <Claim>
    <ID>C-1</ID>
    <PayerID>PAYER1</PayerID>
    <ProviderID>PROV1</ProviderID>
    <EmiratesIDNumber>784-1987-1234567-1</EmiratesIDNumber>
    <Gross>250.00</Gross>
    <PatientShare>35.87</PatientShare>
    <Net>214.13</Net>
    <Activity>
      <ID>A-1</ID>
      <Start>14/02/2025 09:30</Start>
      <Type>3</Type>
      <Code>17999</Code>
      <Quantity>1</Quantity>
      <Net>214.13</Net>
      <Clinician>GD12345</Clinician>
    </Activity>
  </Claim>
</Claim.Submission>"#;

fn localfs_config(root: &Path) -> LocalFsConfig {
    LocalFsConfig {
        ready_dir: root.join("ready"),
        processed_dir: root.join("processed"),
        error_dir: root.join("error"),
        sweep_interval_ms: 1_000,
    }
}

async fn pipeline_for(pool: &sqlx::SqlitePool, config: &LocalFsConfig) -> IngestionPipeline {
    let (store, persister) = persister_stack(pool);
    IngestionPipeline::new(
        store.clone() as Arc<dyn IngestionStore>,
        persister as Arc<dyn DocumentPersister>,
        Verifier::new(store as Arc<dyn IngestionStore>),
        Arc::new(LocalFsAcker::new(config.clone())),
        IngestionMetrics::shared(),
    )
}

#[tokio::test]
async fn drop_zone_file_flows_to_processed() {
    let dir = tempfile::tempdir().unwrap();
    let config = localfs_config(dir.path());
    let pool = test_pool().await;

    let fetcher = LocalFsFetcher::new(config.clone());
    fetcher.ensure_dirs().await.unwrap();
    std::fs::write(config.ready_dir.join("sub-1.xml"), SUBMISSION_XML).unwrap();

    let pipeline = pipeline_for(&pool, &config).await;
    let items = fetcher.claim_ready_files(10).await.unwrap();
    assert_eq!(items.len(), 1);

    let report = pipeline.process(&items[0]).await;
    assert!(report.succeeded(), "pipeline failed: {:?}", report.error);
    assert!(report.verify_ok());
    assert_eq!(report.summary.claims_persisted, 1);

    // Persisted graph and the verified flag.
    assert_eq!(count(&pool, "claims_claim").await, 1);
    assert_eq!(timeline_statuses(&pool, "C-1").await, vec![1]);
    let verified: i64 = sqlx::query_scalar("SELECT verified FROM claims_ingestion_file WHERE file_id = 'sub-1.xml'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(verified, 1);

    // The file moved out of the drop zone into processed/.
    assert!(config.processed_dir.join("sub-1.xml").exists());
    assert!(!config.ready_dir.join("in_progress").join("sub-1.xml").exists());
}

#[tokio::test]
async fn malformed_file_lands_in_error_with_reason() {
    let dir = tempfile::tempdir().unwrap();
    let config = localfs_config(dir.path());
    let pool = test_pool().await;

    let fetcher = LocalFsFetcher::new(config.clone());
    fetcher.ensure_dirs().await.unwrap();
    std::fs::write(config.ready_dir.join("garbage.xml"), "<Claim.Submission><Header>").unwrap();

    let pipeline = pipeline_for(&pool, &config).await;
    let items = fetcher.claim_ready_files(10).await.unwrap();
    let report = pipeline.process(&items[0]).await;

    assert!(!report.succeeded());
    assert_eq!(report.failed_stage, Some(claims_pipeline_domain::PipelineStage::Parse));

    // Parse error recorded against the file.
    let parse_errors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM claims_ingestion_error WHERE stage = 'PARSE'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(parse_errors, 1);

    // File moved to error/ with a sidecar naming the stage.
    assert!(config.error_dir.join("garbage.xml").exists());
    let sidecar = std::fs::read_to_string(config.error_dir.join("garbage.xml.reason.txt")).unwrap();
    assert!(sidecar.contains("PARSE"));
}

#[tokio::test]
async fn second_delivery_of_a_verified_file_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let config = localfs_config(dir.path());
    let pool = test_pool().await;

    let fetcher = LocalFsFetcher::new(config.clone());
    fetcher.ensure_dirs().await.unwrap();
    let pipeline = pipeline_for(&pool, &config).await;

    // First delivery.
    std::fs::write(config.ready_dir.join("sub-1.xml"), SUBMISSION_XML).unwrap();
    let first = fetcher.claim_ready_files(10).await.unwrap();
    pipeline.process(&first[0]).await;

    // Second delivery of the same file name/content.
    std::fs::write(config.ready_dir.join("sub-1.xml"), SUBMISSION_XML).unwrap();
    let second = fetcher.claim_ready_files(10).await.unwrap();
    let report = pipeline.process(&second[0]).await;

    assert!(report.duplicate);
    // Still exactly one ingestion_file, one claim, one event.
    assert_eq!(count(&pool, "claims_ingestion_file").await, 1);
    assert_eq!(count(&pool, "claims_claim").await, 1);
    assert_eq!(count(&pool, "claims_claim_event").await, 1);
    // The duplicate delivery was removed, not reprocessed.
    assert!(!config.ready_dir.join("in_progress").join("sub-1.xml").exists());
    // processed/ still holds the first copy only.
    assert!(config.processed_dir.join("sub-1.xml").exists());
}

#[tokio::test]
async fn header_missing_required_fields_fails_validate_stage() {
    let dir = tempfile::tempdir().unwrap();
    let config = localfs_config(dir.path());
    let pool = test_pool().await;

    let xml = "<Claim.Submission><Header><SenderID>P</SenderID></Header></Claim.Submission>";
    let fetcher = LocalFsFetcher::new(config.clone());
    fetcher.ensure_dirs().await.unwrap();
    std::fs::write(config.ready_dir.join("no-header.xml"), xml).unwrap();

    let pipeline = pipeline_for(&pool, &config).await;
    let items = fetcher.claim_ready_files(10).await.unwrap();
    let report = pipeline.process(&items[0]).await;

    assert_eq!(report.failed_stage, Some(claims_pipeline_domain::PipelineStage::Validate));
    let errors: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM claims_ingestion_error WHERE error_code = 'MISSING_HEADER_REQUIRED'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(errors, 1);
}
