// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Remittance persistence and the status derivation matrix: full pay,
//! partial pay, all-denied, and remittance ahead of submission.

use crate::common::*;
use claims_pipeline_domain::repositories::{DocumentPersister, IngestionStore};

/// Seeds the C-1 submission and returns the persister stack.
async fn with_submitted_claim(
    pool: &sqlx::SqlitePool,
) -> (
    std::sync::Arc<claims_pipeline::infrastructure::repositories::SqliteIngestionStore>,
    std::sync::Arc<claims_pipeline::infrastructure::repositories::SqliteDocumentPersister>,
) {
    let (store, persister) = persister_stack(pool);
    let file_id = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    persister.persist_submission(file_id, &submission_doc(vec![claim_c1()])).await.unwrap();
    (store, persister)
}

#[tokio::test]
async fn full_payment_derives_paid() {
    let pool = test_pool().await;
    let (store, persister) = with_submitted_claim(&pool).await;

    let remit_file = store.register_file("REM-1", "rem-1.xml", b"<xml/>").await.unwrap();
    let doc = remittance_doc(vec![remit_claim("C-1", vec![remit_activity("A-1", Some("214.13"), None)])]);
    let summary = persister.persist_remittance(remit_file, &doc).await.unwrap();

    assert_eq!(summary.claims_persisted, 1);
    assert_eq!(count(&pool, "claims_remittance").await, 1);
    assert_eq!(count(&pool, "claims_remittance_claim").await, 1);
    assert_eq!(count(&pool, "claims_remittance_activity").await, 1);

    // SUBMITTED then PAID.
    assert_eq!(timeline_statuses(&pool, "C-1").await, vec![1, 3]);

    // The REMITTED event snapshots the payment fields.
    let (event_type, payment): (i64, Option<String>) = sqlx::query_as(
        "SELECT e.event_type, ea.payment_amount FROM claims_claim_event e \
         JOIN claims_claim_event_activity ea ON ea.claim_event_id = e.id \
         WHERE e.event_type = 3",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(event_type, 3);
    assert_eq!(payment.as_deref(), Some("214.13"));
}

#[tokio::test]
async fn partial_payment_derives_partially_paid() {
    let pool = test_pool().await;
    let (store, persister) = with_submitted_claim(&pool).await;

    let remit_file = store.register_file("REM-1", "rem-1.xml", b"<xml/>").await.unwrap();
    let doc = remittance_doc(vec![remit_claim("C-1", vec![remit_activity("A-1", Some("100"), None)])]);
    persister.persist_remittance(remit_file, &doc).await.unwrap();

    assert_eq!(timeline_statuses(&pool, "C-1").await, vec![1, 4]);
}

#[tokio::test]
async fn all_denied_zero_payment_derives_rejected() {
    let pool = test_pool().await;
    let (store, persister) = with_submitted_claim(&pool).await;

    let remit_file = store.register_file("REM-1", "rem-1.xml", b"<xml/>").await.unwrap();
    let doc = remittance_doc(vec![remit_claim("C-1", vec![remit_activity("A-1", Some("0"), Some("D001"))])]);
    persister.persist_remittance(remit_file, &doc).await.unwrap();

    assert_eq!(timeline_statuses(&pool, "C-1").await, vec![1, 5]);

    // The denial code was discovered into the reference tables.
    let denial_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ref_denial_code WHERE code = 'D001'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(denial_count, 1);
}

#[tokio::test]
async fn remittance_before_submission_creates_the_spine() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    // No submission exists for C-9 yet.
    let remit_file = store.register_file("REM-1", "rem-1.xml", b"<xml/>").await.unwrap();
    let doc = remittance_doc(vec![remit_claim("C-9", vec![remit_activity("A-1", Some("50"), None)])]);
    let summary = persister.persist_remittance(remit_file, &doc).await.unwrap();

    assert_eq!(summary.claims_persisted, 1);
    assert_eq!(count(&pool, "claims_claim_key").await, 1);
    assert_eq!(count(&pool, "claims_claim").await, 0);

    // netRequested = 0 with money moved: the conservative fallback.
    assert_eq!(timeline_statuses(&pool, "C-9").await, vec![4]);
}

#[tokio::test]
async fn remittance_claim_missing_required_fields_is_skipped() {
    let pool = test_pool().await;
    let (store, persister) = with_submitted_claim(&pool).await;

    let mut bad = remit_claim("C-1", vec![remit_activity("A-1", Some("10"), None)]);
    bad.payment_reference = None;

    let remit_file = store.register_file("REM-1", "rem-1.xml", b"<xml/>").await.unwrap();
    let summary = persister.persist_remittance(remit_file, &remittance_doc(vec![bad])).await.unwrap();

    assert_eq!(summary.claims_persisted, 0);
    assert_eq!(summary.claims_skipped, 1);
    assert_eq!(count(&pool, "claims_remittance_claim").await, 0);

    let errors: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM claims_ingestion_error WHERE error_code = 'MISSING_REMIT_REQUIRED'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(errors, 1);

    // No payment state was derived for the skipped claim.
    assert_eq!(timeline_statuses(&pool, "C-1").await, vec![1]);
}

#[tokio::test]
async fn every_persisted_remittance_claim_gets_exactly_one_payment_status() {
    let pool = test_pool().await;
    let (store, persister) = with_submitted_claim(&pool).await;

    // Two remittance claims in one advice: C-1 (known) and C-2 (unknown).
    let remit_file = store.register_file("REM-1", "rem-1.xml", b"<xml/>").await.unwrap();
    let doc = remittance_doc(vec![
        remit_claim("C-1", vec![remit_activity("A-1", Some("214.13"), None)]),
        remit_claim("C-2", vec![remit_activity("A-1", Some("0"), Some("D002"))]),
    ]);
    let summary = persister.persist_remittance(remit_file, &doc).await.unwrap();
    assert_eq!(summary.claims_persisted, 2);

    let payment_rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM claims_claim_status_timeline WHERE status IN (3, 4, 5)",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(payment_rows, 2);

    assert_eq!(timeline_statuses(&pool, "C-1").await, vec![1, 3]);
    // C-2 has no submission, so its net requested is zero and the zero paid
    // amount meets the exact-payment rule of the ordered derivation chain.
    assert_eq!(timeline_statuses(&pool, "C-2").await, vec![3]);
}
