// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Payment Aggregation
//!
//! Recomputes the per-claim payment summary (`claims_claim_payment`) from
//! the stored per-activity rows. Invoked after every remittance-side change
//! for a claim; the upsert replaces the whole row, so the aggregation is
//! self-healing — replaying a file or re-running the recalculation always
//! converges to the same numbers.
//!
//! Sums are computed in Rust over the canonical decimal strings; SQLite's
//! float-coercing SUM never touches monetary values.

use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};

use claims_pipeline_domain::services::derive_remittance_status;
use claims_pipeline_domain::IngestError;

use crate::infrastructure::repositories::ingestion_repository::db_err;

fn parse_money(raw: Option<String>, column: &str) -> Result<Option<Decimal>, IngestError> {
    raw.map(|s| {
        s.parse::<Decimal>()
            .map_err(|e| IngestError::persistence(format!("stored {column} {s:?} is not a decimal: {e}")))
    })
    .transpose()
}

#[derive(Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Recomputes and upserts the payment summary for one claim spine.
    pub async fn recalculate(&self, claim_key_id: i64) -> Result<(), IngestError> {
        // Submission side: activity nets and counts.
        let submission_rows = sqlx::query(
            "SELECT a.net FROM claims_activity a \
             JOIN claims_claim c ON c.id = a.claim_id \
             WHERE c.claim_key_id = ?1",
        )
        .bind(claim_key_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("payment submission scan", e))?;

        let mut submitted = Decimal::ZERO;
        let activity_count = submission_rows.len() as i64;
        for row in &submission_rows {
            if let Some(net) = parse_money(row.get("net"), "net")? {
                submitted += net;
            }
        }

        // Remittance side: per-activity payments and denials across every
        // remittance seen for this claim.
        let remit_rows = sqlx::query(
            "SELECT ra.net, ra.payment_amount, ra.denial_code, rc.payment_reference, rc.date_settlement, r.tx_at \
             FROM claims_remittance_activity ra \
             JOIN claims_remittance_claim rc ON rc.id = ra.remittance_claim_id \
             JOIN claims_remittance r ON r.id = rc.remittance_id \
             WHERE rc.claim_key_id = ?1",
        )
        .bind(claim_key_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("payment remittance scan", e))?;

        let mut paid = Decimal::ZERO;
        let mut rejected = Decimal::ZERO;
        let mut denied_count: i64 = 0;
        let mut references: Vec<String> = Vec::new();
        let mut settlement: Option<String> = None;
        for row in &remit_rows {
            let payment = parse_money(row.get("payment_amount"), "payment_amount")?.unwrap_or_default();
            paid += payment;

            let denial: Option<String> = row.get("denial_code");
            if denial.as_deref().is_some_and(|d| !d.trim().is_empty()) {
                denied_count += 1;
                if payment.is_zero() {
                    if let Some(net) = parse_money(row.get("net"), "net")? {
                        rejected += net;
                    }
                }
            }

            if let Some(reference) = row.get::<Option<String>, _>("payment_reference") {
                if !references.contains(&reference) {
                    references.push(reference);
                }
            }
            if let Some(date) = row.get::<Option<String>, _>("date_settlement") {
                if settlement.as_deref().map_or(true, |current| date.as_str() > current) {
                    settlement = Some(date);
                }
            }
        }

        let remittance_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM claims_remittance_claim WHERE claim_key_id = ?1",
        )
        .bind(claim_key_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("payment remittance count", e))?;

        let first_submission_at: Option<String> = sqlx::query_scalar(
            "SELECT MIN(s.tx_at) FROM claims_claim c \
             JOIN claims_submission s ON s.id = c.submission_id \
             WHERE c.claim_key_id = ?1",
        )
        .bind(claim_key_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("payment first submission", e))?;

        let last_remittance_at: Option<String> = sqlx::query_scalar(
            "SELECT MAX(r.tx_at) FROM claims_remittance_claim rc \
             JOIN claims_remittance r ON r.id = rc.remittance_id \
             WHERE rc.claim_key_id = ?1",
        )
        .bind(claim_key_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("payment last remittance", e))?;

        let payment_status = if remittance_count > 0 {
            let remit_activity_count = remit_rows.len() as i64;
            let all_denied = remit_activity_count > 0 && denied_count == remit_activity_count && paid.is_zero();
            Some(derive_remittance_status(submitted, paid, all_denied).as_i64())
        } else {
            None
        };

        sqlx::query(
            "INSERT INTO claims_claim_payment \
             (claim_key_id, submitted_amount, paid_amount, rejected_amount, activity_count, \
              denied_activity_count, remittance_count, processing_cycles, payment_status, \
              payment_references, first_submission_at, last_remittance_at, settlement_date, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')) \
             ON CONFLICT (claim_key_id) DO UPDATE SET \
                submitted_amount = excluded.submitted_amount, \
                paid_amount = excluded.paid_amount, \
                rejected_amount = excluded.rejected_amount, \
                activity_count = excluded.activity_count, \
                denied_activity_count = excluded.denied_activity_count, \
                remittance_count = excluded.remittance_count, \
                processing_cycles = excluded.processing_cycles, \
                payment_status = excluded.payment_status, \
                payment_references = excluded.payment_references, \
                first_submission_at = excluded.first_submission_at, \
                last_remittance_at = excluded.last_remittance_at, \
                settlement_date = excluded.settlement_date, \
                updated_at = excluded.updated_at",
        )
        .bind(claim_key_id)
        .bind(submitted.normalize().to_string())
        .bind(paid.normalize().to_string())
        .bind(rejected.normalize().to_string())
        .bind(activity_count)
        .bind(denied_count)
        .bind(remittance_count)
        .bind(remittance_count)
        .bind(payment_status)
        .bind(if references.is_empty() { None } else { Some(references.join(",")) })
        .bind(first_submission_at)
        .bind(last_remittance_at)
        .bind(settlement)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("payment upsert", e))?;

        Ok(())
    }
}
