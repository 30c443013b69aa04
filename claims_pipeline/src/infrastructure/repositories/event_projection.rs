// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Projection Helpers
//!
//! Shared insert-or-find primitives used by both persisters, all running on
//! the caller's open transaction. Every statement is idempotent under its
//! unique key, which is what makes whole-file replay a no-op:
//!
//! - `claims_claim_key` on `claim_id`
//! - `claims_claim_event` on `(claim_key_id, event_type, event_time)`
//! - `claims_claim_event_activity` on `(claim_event_id, activity_id_at_event)`
//! - `claims_event_observation` on the dedup hash tuple
//! - `claims_claim_status_timeline` on `claim_event_id`

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

use claims_pipeline_domain::entities::ObservationDto;
use claims_pipeline_domain::value_objects::claim_status::ClaimStatus;
use claims_pipeline_domain::value_objects::event_type::ClaimEventType;
use claims_pipeline_domain::IngestError;

use crate::infrastructure::repositories::ingestion_repository::db_err;

/// Canonical TEXT rendering for monetary columns.
pub(crate) fn money(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.normalize().to_string())
}

/// Creates-or-finds the claim spine row in a single round trip.
pub(crate) async fn upsert_claim_key(conn: &mut SqliteConnection, claim_id: &str) -> Result<i64, IngestError> {
    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO claims_claim_key (claim_id) VALUES (?1) \
         ON CONFLICT (claim_id) DO NOTHING \
         RETURNING id",
    )
    .bind(claim_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_err("claim_key upsert", e))?;

    match inserted {
        Some(id) => Ok(id),
        None => sqlx::query_scalar("SELECT id FROM claims_claim_key WHERE claim_id = ?1")
            .bind(claim_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| db_err("claim_key select", e)),
    }
}

/// Weak back-pointer carried by an event row.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EventOrigin {
    pub submission_id: Option<i64>,
    pub remittance_id: Option<i64>,
    pub ingestion_file_id: Option<i64>,
}

/// Inserts a lifecycle event, or finds the existing one on replay.
pub(crate) async fn insert_event(
    conn: &mut SqliteConnection,
    claim_key_id: i64,
    event_type: ClaimEventType,
    event_time: DateTime<Utc>,
    origin: EventOrigin,
) -> Result<i64, IngestError> {
    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO claims_claim_event \
         (claim_key_id, event_type, event_time, submission_id, remittance_id, ingestion_file_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT (claim_key_id, event_type, event_time) DO NOTHING \
         RETURNING id",
    )
    .bind(claim_key_id)
    .bind(event_type.as_i64())
    .bind(event_time)
    .bind(origin.submission_id)
    .bind(origin.remittance_id)
    .bind(origin.ingestion_file_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_err("claim_event insert", e))?;

    match inserted {
        Some(id) => Ok(id),
        None => sqlx::query_scalar(
            "SELECT id FROM claims_claim_event WHERE claim_key_id = ?1 AND event_type = ?2 AND event_time = ?3",
        )
        .bind(claim_key_id)
        .bind(event_type.as_i64())
        .bind(event_time)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| db_err("claim_event select", e)),
    }
}

/// Activity metric fields snapshotted at event time. Submission-side events
/// leave the payment fields empty; remittance-side events fill them.
#[derive(Debug, Clone, Default)]
pub(crate) struct ActivitySnapshot {
    pub activity_id: String,
    pub start: Option<String>,
    pub activity_type: Option<String>,
    pub code: Option<String>,
    pub quantity: Option<Decimal>,
    pub net: Option<Decimal>,
    pub clinician: Option<String>,
    pub prior_auth_id: Option<String>,
    pub list_price: Option<Decimal>,
    pub gross: Option<Decimal>,
    pub patient_share: Option<Decimal>,
    pub payment_amount: Option<Decimal>,
    pub denial_code: Option<String>,
}

/// Writes one activity snapshot under an event; replay finds the prior row.
pub(crate) async fn snapshot_activity(
    conn: &mut SqliteConnection,
    claim_event_id: i64,
    snapshot: &ActivitySnapshot,
) -> Result<i64, IngestError> {
    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO claims_claim_event_activity \
         (claim_event_id, activity_id_at_event, start_at, activity_type, code, quantity, net, clinician, \
          prior_auth_id, list_price, gross, patient_share, payment_amount, denial_code) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14) \
         ON CONFLICT (claim_event_id, activity_id_at_event) DO NOTHING \
         RETURNING id",
    )
    .bind(claim_event_id)
    .bind(&snapshot.activity_id)
    .bind(&snapshot.start)
    .bind(&snapshot.activity_type)
    .bind(&snapshot.code)
    .bind(money(snapshot.quantity))
    .bind(money(snapshot.net))
    .bind(&snapshot.clinician)
    .bind(&snapshot.prior_auth_id)
    .bind(money(snapshot.list_price))
    .bind(money(snapshot.gross))
    .bind(money(snapshot.patient_share))
    .bind(money(snapshot.payment_amount))
    .bind(&snapshot.denial_code)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_err("event activity snapshot", e))?;

    match inserted {
        Some(id) => Ok(id),
        None => sqlx::query_scalar(
            "SELECT id FROM claims_claim_event_activity WHERE claim_event_id = ?1 AND activity_id_at_event = ?2",
        )
        .bind(claim_event_id)
        .bind(&snapshot.activity_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| db_err("event activity select", e)),
    }
}

/// Snapshots one observation under a snapshotted activity.
pub(crate) async fn snapshot_observation(
    conn: &mut SqliteConnection,
    event_activity_id: i64,
    observation: &ObservationDto,
) -> Result<(), IngestError> {
    sqlx::query(
        "INSERT INTO claims_event_observation \
         (event_activity_id, obs_type, obs_code, obs_value, value_type, value_hash) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT (event_activity_id, obs_type, obs_code, value_hash) DO NOTHING",
    )
    .bind(event_activity_id)
    .bind(&observation.obs_type)
    .bind(&observation.code)
    .bind(&observation.value)
    .bind(&observation.value_type)
    .bind(observation.value_hash())
    .execute(&mut *conn)
    .await
    .map_err(|e| db_err("event observation snapshot", e))?;
    Ok(())
}

/// Appends the timeline row an event produces. One row per event; replays
/// are no-ops.
pub(crate) async fn append_timeline(
    conn: &mut SqliteConnection,
    claim_key_id: i64,
    status: ClaimStatus,
    status_time: DateTime<Utc>,
    claim_event_id: i64,
) -> Result<(), IngestError> {
    sqlx::query(
        "INSERT INTO claims_claim_status_timeline (claim_key_id, status, status_time, claim_event_id) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT (claim_event_id) DO NOTHING",
    )
    .bind(claim_key_id)
    .bind(status.as_i64())
    .bind(status_time)
    .bind(claim_event_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_err("status timeline append", e))?;
    Ok(())
}
