// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Replay safety: re-running either persister over the same file is a
//! no-op for already-stored rows.

use crate::common::*;
use claims_pipeline_domain::repositories::{DocumentPersister, IngestionStore};
use sqlx::SqlitePool;

async fn snapshot_counts(pool: &SqlitePool) -> Vec<(String, i64)> {
    let tables = [
        "claims_ingestion_file",
        "claims_claim_key",
        "claims_submission",
        "claims_claim",
        "claims_encounter",
        "claims_diagnosis",
        "claims_activity",
        "claims_observation",
        "claims_remittance",
        "claims_remittance_claim",
        "claims_remittance_activity",
        "claims_claim_event",
        "claims_claim_event_activity",
        "claims_event_observation",
        "claims_claim_status_timeline",
        "claims_claim_attachment",
        "ref_payer",
        "ref_code_discovery_audit",
    ];
    let mut counts = Vec::new();
    for table in tables {
        counts.push((table.to_string(), count(pool, table).await));
    }
    counts
}

#[tokio::test]
async fn submission_replay_is_a_no_op() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let doc = submission_doc(vec![claim_c1()]);
    let file_id = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();

    persister.persist_submission(file_id, &doc).await.unwrap();
    let before = snapshot_counts(&pool).await;

    // Same ingestion_file replayed: registration dedupes, every insert
    // hits its unique key.
    let replay_id = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    assert_eq!(replay_id, file_id);
    let summary = persister.persist_submission(replay_id, &doc).await.unwrap();

    let after = snapshot_counts(&pool).await;
    assert_eq!(before, after, "replay must not change row counts");

    // The replayed claims were not re-persisted as new work either: the
    // duplicate guard does not fire because the claim carries no
    // resubmission AND an event already exists, so it is counted skipped.
    assert_eq!(summary.claims_persisted, 0);
    assert_eq!(summary.claims_skipped, 1);
}

#[tokio::test]
async fn remittance_replay_is_a_no_op() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let sub_file = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    persister.persist_submission(sub_file, &submission_doc(vec![claim_c1()])).await.unwrap();

    let doc = remittance_doc(vec![remit_claim("C-1", vec![remit_activity("A-1", Some("214.13"), None)])]);
    let remit_file = store.register_file("REM-1", "rem-1.xml", b"<xml/>").await.unwrap();
    persister.persist_remittance(remit_file, &doc).await.unwrap();
    let before = snapshot_counts(&pool).await;

    let summary = persister.persist_remittance(remit_file, &doc).await.unwrap();
    let after = snapshot_counts(&pool).await;

    assert_eq!(before, after, "remittance replay must not change row counts");
    // Remittance upserts are genuinely idempotent, so the claim still
    // counts as persisted on replay.
    assert_eq!(summary.claims_persisted, 1);
    assert_eq!(timeline_statuses(&pool, "C-1").await, vec![1, 3]);
}

#[tokio::test]
async fn observations_dedupe_on_value_hash() {
    let pool = test_pool().await;
    let (store, persister) = persister_stack(&pool);

    let mut claim = claim_c1();
    // Duplicate the identical observation; only one row may land.
    let duplicate_obs = claim.activities[0].observations[0].clone();
    claim.activities[0].observations.push(duplicate_obs);
    let mut different_obs = claim.activities[0].observations[0].clone();
    different_obs.value = Some("14.0".into());
    claim.activities[0].observations.push(different_obs);

    let file_id = store.register_file("SUB-1", "sub-1.xml", b"<xml/>").await.unwrap();
    persister.persist_submission(file_id, &submission_doc(vec![claim])).await.unwrap();

    assert_eq!(count(&pool, "claims_observation").await, 2);
    assert_eq!(count(&pool, "claims_event_observation").await, 2);
}
