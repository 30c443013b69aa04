// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Payment aggregation: the `claims_claim_payment` row recomputed after
//! every remittance-side change.

use crate::common::*;
use claims_pipeline::infrastructure::repositories::PaymentRepository;
use claims_pipeline_domain::repositories::{DocumentPersister, IngestionStore};
use sqlx::Row;

async fn payment_row(pool: &sqlx::SqlitePool, claim_id: &str) -> sqlx::sqlite::SqliteRow {
    sqlx::query(
        "SELECT p.* FROM claims_claim_payment p \
         JOIN claims_claim_key ck ON ck.id = p.claim_key_id \
         WHERE ck.claim_id = ?1",
    )
    .bind(claim_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn full_payment_aggregates_to_paid() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let sub_file = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    persister.persist_submission(sub_file, &submission_doc(vec![claim_c1()])).await.unwrap();

    let remit_file = store.register_file("REM-1", "rem-1.xml", b"<xml/>").await.unwrap();
    let doc = remittance_doc(vec![remit_claim("C-1", vec![remit_activity("A-1", Some("214.13"), None)])]);
    persister.persist_remittance(remit_file, &doc).await.unwrap();

    let row = payment_row(&pool, "C-1").await;
    assert_eq!(row.get::<Option<String>, _>("submitted_amount").as_deref(), Some("214.13"));
    assert_eq!(row.get::<Option<String>, _>("paid_amount").as_deref(), Some("214.13"));
    assert_eq!(row.get::<i64, _>("activity_count"), 1);
    assert_eq!(row.get::<i64, _>("remittance_count"), 1);
    assert_eq!(row.get::<i64, _>("processing_cycles"), 1);
    assert_eq!(row.get::<Option<i64>, _>("payment_status"), Some(3));
    assert_eq!(row.get::<Option<String>, _>("payment_references").as_deref(), Some("PR-2025-001"));
    assert!(row.get::<Option<String>, _>("first_submission_at").is_some());
    assert!(row.get::<Option<String>, _>("last_remittance_at").is_some());
}

#[tokio::test]
async fn second_remittance_updates_the_same_row() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let sub_file = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    persister.persist_submission(sub_file, &submission_doc(vec![claim_c1()])).await.unwrap();

    // First cycle: partial payment.
    let remit_one = store.register_file("REM-1", "rem-1.xml", b"<xml/>").await.unwrap();
    let first = remittance_doc(vec![remit_claim("C-1", vec![remit_activity("A-1", Some("100"), None)])]);
    persister.persist_remittance(remit_one, &first).await.unwrap();

    // Second cycle pays the rest under a new reference.
    let remit_two = store.register_file("REM-2", "rem-2.xml", b"<xml/>").await.unwrap();
    let mut second_claim = remit_claim("C-1", vec![remit_activity("A-1", Some("114.13"), None)]);
    second_claim.payment_reference = Some("PR-2025-002".into());
    let mut second = remittance_doc(vec![second_claim]);
    second.header.transaction_date = Some("2025-03-10T09:00:00Z".parse().unwrap());
    persister.persist_remittance(remit_two, &second).await.unwrap();

    assert_eq!(count(&pool, "claims_claim_payment").await, 1);
    let row = payment_row(&pool, "C-1").await;
    assert_eq!(row.get::<Option<String>, _>("paid_amount").as_deref(), Some("214.13"));
    assert_eq!(row.get::<i64, _>("remittance_count"), 2);
    assert_eq!(row.get::<i64, _>("processing_cycles"), 2);
    let references = row.get::<Option<String>, _>("payment_references").unwrap();
    assert!(references.contains("PR-2025-001"));
    assert!(references.contains("PR-2025-002"));
}

#[tokio::test]
async fn rejected_amount_counts_denied_zero_payment_lines() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let sub_file = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    persister.persist_submission(sub_file, &submission_doc(vec![claim_c1()])).await.unwrap();

    let remit_file = store.register_file("REM-1", "rem-1.xml", b"<xml/>").await.unwrap();
    let doc = remittance_doc(vec![remit_claim("C-1", vec![remit_activity("A-1", Some("0"), Some("D001"))])]);
    persister.persist_remittance(remit_file, &doc).await.unwrap();

    let row = payment_row(&pool, "C-1").await;
    assert_eq!(row.get::<Option<String>, _>("paid_amount").as_deref(), Some("0"));
    assert_eq!(row.get::<Option<String>, _>("rejected_amount").as_deref(), Some("214.13"));
    assert_eq!(row.get::<i64, _>("denied_activity_count"), 1);
    assert_eq!(row.get::<Option<i64>, _>("payment_status"), Some(5));
}

#[tokio::test]
async fn recalculation_is_convergent() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let sub_file = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    persister.persist_submission(sub_file, &submission_doc(vec![claim_c1()])).await.unwrap();
    let remit_file = store.register_file("REM-1", "rem-1.xml", b"<xml/>").await.unwrap();
    let doc = remittance_doc(vec![remit_claim("C-1", vec![remit_activity("A-1", Some("100"), None)])]);
    persister.persist_remittance(remit_file, &doc).await.unwrap();

    let claim_key_id: i64 = sqlx::query_scalar("SELECT id FROM claims_claim_key WHERE claim_id = 'C-1'")
        .fetch_one(&pool)
        .await
        .unwrap();

    // Rerunning the aggregation by hand produces the same numbers.
    let before = payment_row(&pool, "C-1").await;
    PaymentRepository::new(pool.clone()).recalculate(claim_key_id).await.unwrap();
    let after = payment_row(&pool, "C-1").await;

    assert_eq!(
        before.get::<Option<String>, _>("paid_amount"),
        after.get::<Option<String>, _>("paid_amount")
    );
    assert_eq!(
        before.get::<Option<i64>, _>("payment_status"),
        after.get::<Option<i64>, _>("payment_status")
    );
    assert_eq!(count(&pool, "claims_claim_payment").await, 1);
}
