// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Submission persistence: the happy path, the duplicate guard, per-object
//! skipping, and the event/timeline projection.

use crate::common::*;
use claims_pipeline_domain::entities::{ActivityDto, ResubmissionDto};
use claims_pipeline_domain::repositories::{DocumentPersister, IngestionStore};

#[tokio::test]
async fn happy_submission_single_claim() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let file_id = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    let summary = persister.persist_submission(file_id, &submission_doc(vec![claim_c1()])).await.unwrap();

    assert_eq!(summary.claims_persisted, 1);
    assert_eq!(summary.claims_skipped, 0);
    assert_eq!(summary.activities_persisted, 1);

    assert_eq!(count(&pool, "claims_ingestion_file").await, 1);
    assert_eq!(count(&pool, "claims_submission").await, 1);
    assert_eq!(count(&pool, "claims_claim_key").await, 1);
    assert_eq!(count(&pool, "claims_claim").await, 1);
    assert_eq!(count(&pool, "claims_encounter").await, 1);
    assert_eq!(count(&pool, "claims_diagnosis").await, 1);
    assert_eq!(count(&pool, "claims_activity").await, 1);
    assert_eq!(count(&pool, "claims_observation").await, 1);
    assert_eq!(count(&pool, "claims_claim_event").await, 1);
    assert_eq!(count(&pool, "claims_claim_event_activity").await, 1);
    assert_eq!(count(&pool, "claims_event_observation").await, 1);
    assert_eq!(timeline_statuses(&pool, "C-1").await, vec![1]);

    // No errors recorded on the happy path.
    assert_eq!(count(&pool, "claims_ingestion_error").await, 0);
}

#[tokio::test]
async fn duplicate_submission_without_resubmission_is_skipped() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let first = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    persister.persist_submission(first, &submission_doc(vec![claim_c1()])).await.unwrap();

    // The same business claim arrives again in a new file, no resubmission.
    let second = store.register_file("SUB-2", "sub-2.xml", b"<xml/>").await.unwrap();
    let summary = persister.persist_submission(second, &submission_doc(vec![claim_c1()])).await.unwrap();

    assert_eq!(summary.claims_persisted, 0);
    assert_eq!(summary.claims_skipped, 1);

    // Still one claim, one event, one timeline row.
    assert_eq!(count(&pool, "claims_claim").await, 1);
    assert_eq!(count(&pool, "claims_claim_event").await, 1);
    assert_eq!(timeline_statuses(&pool, "C-1").await, vec![1]);

    let dup_errors: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM claims_ingestion_error WHERE error_code = 'DUP_SUBMISSION_NO_RESUB'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(dup_errors, 1);

    // And the file-level summary error counting the skip.
    let summary_error: String = sqlx::query_scalar(
        "SELECT message FROM claims_ingestion_error WHERE error_code = 'FILE_CLAIMS_SKIPPED'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(summary_error.contains("1 of 1"));
}

#[tokio::test]
async fn resubmission_payload_produces_both_events() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    // First the plain submission.
    let first = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    persister.persist_submission(first, &submission_doc(vec![claim_c1()])).await.unwrap();

    // Then a resubmission of the same claim from a later file.
    let mut resubmitted = claim_c1();
    resubmitted.resubmission = Some(ResubmissionDto {
        resubmission_type: Some("correction".into()),
        comment: Some("corrected quantity".into()),
        attachment: None,
    });
    let mut doc = submission_doc(vec![resubmitted]);
    doc.header.transaction_date = Some("2025-02-20T10:00:00Z".parse().unwrap());

    let second = store.register_file("SUB-2", "sub-2.xml", b"<xml/>").await.unwrap();
    let summary = persister.persist_submission(second, &doc).await.unwrap();
    assert_eq!(summary.claims_persisted, 1);

    // SUBMITTED from the first file, SUBMITTED + RESUBMITTED from the second
    // (distinct event_time), one resubmission row keyed by the event.
    assert_eq!(count(&pool, "claims_claim_resubmission").await, 1);
    assert_eq!(timeline_statuses(&pool, "C-1").await, vec![1, 1, 2]);

    // The claim row itself is unique per claim_key and was not duplicated.
    assert_eq!(count(&pool, "claims_claim").await, 1);
}

#[tokio::test]
async fn invalid_claim_is_skipped_alone() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let mut broken = claim_c1();
    broken.id = Some("C-2".into());
    broken.net = None; // missing required amount

    let file_id = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    let summary = persister
        .persist_submission(file_id, &submission_doc(vec![claim_c1(), broken]))
        .await
        .unwrap();

    assert_eq!(summary.claims_persisted, 1);
    assert_eq!(summary.claims_skipped, 1);
    assert_eq!(count(&pool, "claims_claim").await, 1);

    let validate_errors: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM claims_ingestion_error WHERE stage = 'VALIDATE' AND object_key = 'C-2'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(validate_errors, 1);
}

#[tokio::test]
async fn duplicate_activity_id_first_insert_wins() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let mut claim = claim_c1();
    let mut second_a1 = activity_a1();
    second_a1.net = Some(dec("99.99"));
    claim.activities.push(second_a1);

    let file_id = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    let summary = persister.persist_submission(file_id, &submission_doc(vec![claim])).await.unwrap();
    assert_eq!(summary.claims_persisted, 1);

    // Exactly one persisted activity row; the first insert won.
    assert_eq!(count(&pool, "claims_activity").await, 1);
    let net: String = sqlx::query_scalar("SELECT net FROM claims_activity").fetch_one(&pool).await.unwrap();
    assert_eq!(net, "214.13");

    // The snapshot projection is idempotent on (event, activity id) too.
    assert_eq!(count(&pool, "claims_claim_event_activity").await, 1);
}

#[tokio::test]
async fn empty_claim_list_with_zero_record_count_persists_the_shell() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let mut doc = submission_doc(vec![]);
    doc.header.record_count = Some(0);

    let file_id = store.register_file("SUB-EMPTY", "empty.xml", b"<xml/>").await.unwrap();
    let summary = persister.persist_submission(file_id, &doc).await.unwrap();

    assert_eq!(summary.claims_persisted, 0);
    assert_eq!(summary.claims_skipped, 0);
    assert_eq!(count(&pool, "claims_submission").await, 1);
    assert_eq!(count(&pool, "claims_claim").await, 0);
    assert_eq!(count(&pool, "claims_ingestion_error").await, 0);
}

#[tokio::test]
async fn reference_codes_are_resolved_and_audited_once() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let file_id = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    persister.persist_submission(file_id, &submission_doc(vec![claim_c1()])).await.unwrap();

    // Payer, provider, facility, clinician, activity code, diagnosis code.
    assert_eq!(count(&pool, "ref_payer").await, 1);
    assert_eq!(count(&pool, "ref_provider").await, 1);
    assert_eq!(count(&pool, "ref_facility").await, 1);
    assert_eq!(count(&pool, "ref_clinician").await, 1);
    assert_eq!(count(&pool, "ref_activity_code").await, 1);
    assert_eq!(count(&pool, "ref_diagnosis_code").await, 1);
    assert_eq!(count(&pool, "ref_code_discovery_audit").await, 6);

    // The claim row carries the resolved ids.
    let (payer_ref, provider_ref): (Option<i64>, Option<i64>) =
        sqlx::query_as("SELECT payer_ref_id, provider_ref_id FROM claims_claim")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(payer_ref.is_some());
    assert!(provider_ref.is_some());

    // A second claim with the same codes adds no audit rows.
    let mut other = claim_c1();
    other.id = Some("C-2".into());
    let second = store.register_file("SUB-2", "sub-2.xml", b"<xml/>").await.unwrap();
    persister.persist_submission(second, &submission_doc(vec![other])).await.unwrap();
    assert_eq!(count(&pool, "ref_code_discovery_audit").await, 6);
}

#[tokio::test]
async fn attachments_are_keyed_to_the_producing_event() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let mut doc = submission_doc(vec![claim_c1()]);
    doc.attachments.push(claims_pipeline_domain::entities::ExtractedAttachment {
        claim_id: "C-1".into(),
        file_name: "report.pdf".into(),
        bytes: b"hello".to_vec(),
    });

    let file_id = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    persister.persist_submission(file_id, &doc).await.unwrap();

    let (event_id, file_name): (i64, String) =
        sqlx::query_as("SELECT claim_event_id, file_name FROM claims_claim_attachment")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(file_name, "report.pdf");

    let event_type: i64 = sqlx::query_scalar("SELECT event_type FROM claims_claim_event WHERE id = ?1")
        .bind(event_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(event_type, 1, "attachment hangs off the SUBMITTED event");
}

#[tokio::test]
async fn activities_missing_required_fields_are_skipped() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let mut claim = claim_c1();
    claim.activities.push(ActivityDto {
        id: Some("A-BAD".into()),
        ..ActivityDto::default()
    });

    let file_id = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    let summary = persister.persist_submission(file_id, &submission_doc(vec![claim])).await.unwrap();

    assert_eq!(summary.claims_persisted, 1);
    assert_eq!(summary.activities_persisted, 1);
    assert_eq!(count(&pool, "claims_activity").await, 1);

    let activity_errors: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM claims_ingestion_error WHERE object_type = 'ACTIVITY' AND object_key = 'A-BAD'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(activity_errors, 1);
}

#[tokio::test]
async fn record_count_mismatch_still_persists_claims() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let mut doc = submission_doc(vec![claim_c1()]);
    doc.header.record_count = Some(5); // header lies

    let file_id = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    let summary = persister.persist_submission(file_id, &doc).await.unwrap();
    assert_eq!(summary.claims_persisted, 1);
    assert_eq!(count(&pool, "claims_claim").await, 1);
}
