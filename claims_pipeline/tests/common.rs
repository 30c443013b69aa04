// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Common Test Helpers
//!
//! Shared fixtures for integration tests: migrated in-memory pools, the
//! persister stack, and canonical document builders matching the seed
//! scenarios (claim `C-1`, activity `A-1`, net `214.13`).

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::sync::Arc;

use claims_pipeline::infrastructure::config::RefDataConfig;
use claims_pipeline::infrastructure::repositories::{
    schema, SqliteDocumentPersister, SqliteIngestionStore, SqliteReferenceResolver,
};
use claims_pipeline_domain::entities::{
    ActivityDto, ClaimDto, DiagnosisDto, EncounterDto, FileHeader, ObservationDto, RemittanceActivityDto,
    RemittanceClaimDto, RemittanceDoc, SubmissionDoc,
};
use claims_pipeline_domain::repositories::IngestionStore;

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn submission_tx_at() -> DateTime<Utc> {
    "2025-02-14T12:00:00Z".parse().unwrap()
}

pub fn remittance_tx_at() -> DateTime<Utc> {
    "2025-03-01T08:15:00Z".parse().unwrap()
}

pub async fn test_pool() -> SqlitePool {
    schema::initialize_in_memory().await.unwrap()
}

/// The full persister stack over one pool, auto-insert enabled.
pub fn persister_stack(pool: &SqlitePool) -> (Arc<SqliteIngestionStore>, Arc<SqliteDocumentPersister>) {
    let store = Arc::new(SqliteIngestionStore::new(pool.clone()));
    let resolver = Arc::new(SqliteReferenceResolver::new(
        pool.clone(),
        RefDataConfig {
            auto_insert: true,
            bootstrap_enabled: true,
        },
    ));
    let persister = Arc::new(SqliteDocumentPersister::new(
        pool.clone(),
        resolver,
        store.clone() as Arc<dyn IngestionStore>,
    ));
    (store, persister)
}

pub fn header(record_count: i64, tx_at: DateTime<Utc>, sender: &str, receiver: &str) -> FileHeader {
    FileHeader {
        sender_id: Some(sender.to_string()),
        receiver_id: Some(receiver.to_string()),
        transaction_date: Some(tx_at),
        record_count: Some(record_count),
        disposition_flag: Some("PRODUCTION".to_string()),
    }
}

/// The seed-scenario activity: `A-1`, net 214.13.
pub fn activity_a1() -> ActivityDto {
    ActivityDto {
        id: Some("A-1".into()),
        start: Some("14/02/2025 09:30".into()),
        activity_type: Some("3".into()),
        code: Some("17999".into()),
        quantity: Some(Decimal::ONE),
        net: Some(dec("214.13")),
        clinician: Some("GD12345".into()),
        prior_auth_id: None,
        observations: vec![ObservationDto {
            obs_type: Some("LOINC".into()),
            code: Some("718-7".into()),
            value: Some("13.5".into()),
            value_type: Some("g/dL".into()),
        }],
    }
}

/// The seed-scenario claim: `C-1` with one activity.
pub fn claim_c1() -> ClaimDto {
    ClaimDto {
        id: Some("C-1".into()),
        id_payer: Some("IP-77".into()),
        member_id: Some("M-5".into()),
        payer_id: Some("PAYER1".into()),
        provider_id: Some("PROV1".into()),
        emirates_id_number: Some("784-1987-1234567-1".into()),
        gross: Some(dec("250.00")),
        patient_share: Some(dec("35.87")),
        net: Some(dec("214.13")),
        encounter: Some(EncounterDto {
            facility_id: Some("F-001".into()),
            encounter_type: Some("1".into()),
            patient_id: Some("PT-9".into()),
            start: Some("14/02/2025 09:30".into()),
            ..EncounterDto::default()
        }),
        diagnoses: vec![DiagnosisDto {
            diag_type: Some("Principal".into()),
            code: Some("J45.0".into()),
        }],
        activities: vec![activity_a1()],
        resubmission: None,
    }
}

pub fn submission_doc(claims: Vec<ClaimDto>) -> SubmissionDoc {
    SubmissionDoc {
        header: header(claims.len() as i64, submission_tx_at(), "PROV1", "PAYER1"),
        claims,
        attachments: Vec::new(),
    }
}

pub fn remit_activity(id: &str, payment: Option<&str>, denial: Option<&str>) -> RemittanceActivityDto {
    RemittanceActivityDto {
        id: Some(id.to_string()),
        start: Some("14/02/2025 09:30".into()),
        activity_type: Some("3".into()),
        code: Some("17999".into()),
        quantity: Some(Decimal::ONE),
        net: Some(dec("214.13")),
        payment_amount: payment.map(dec),
        denial_code: denial.map(String::from),
        ..RemittanceActivityDto::default()
    }
}

pub fn remit_claim(id: &str, activities: Vec<RemittanceActivityDto>) -> RemittanceClaimDto {
    RemittanceClaimDto {
        id: Some(id.to_string()),
        id_payer: Some("IP-77".into()),
        provider_id: Some("PROV1".into()),
        denial_code: None,
        payment_reference: Some("PR-2025-001".into()),
        date_settlement: Some("05/03/2025".into()),
        activities,
    }
}

pub fn remittance_doc(claims: Vec<RemittanceClaimDto>) -> RemittanceDoc {
    RemittanceDoc {
        header: header(claims.len() as i64, remittance_tx_at(), "PAYER1", "PROV1"),
        claims,
    }
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Timeline statuses for a business claim, in status_time order.
pub async fn timeline_statuses(pool: &SqlitePool, claim_id: &str) -> Vec<i64> {
    sqlx::query_scalar(
        "SELECT t.status FROM claims_claim_status_timeline t \
         JOIN claims_claim_key ck ON ck.id = t.claim_key_id \
         WHERE ck.claim_id = ?1 \
         ORDER BY t.status_time, t.id",
    )
    .bind(claim_id)
    .fetch_all(pool)
    .await
    .unwrap()
}
