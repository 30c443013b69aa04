// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Remittance Persister
//!
//! Writes one parsed remittance advice into the normalized graph and derives
//! the payment status for each remittance claim.
//!
//! Per remittance claim (each in its own transaction):
//!
//! 1. required-field guard (`MISSING_REMIT_REQUIRED` on miss, skip);
//! 2. claim-spine upsert — a remittance arriving before any submission still
//!    creates the spine row and persists normally;
//! 3. `remittance_claim` and `remittance_activity` upserts under their
//!    unique keys;
//! 4. REMITTED event projecting the remittance-side activity metrics
//!    (payment amount, denial code, list price, gross, patient share);
//! 5. status derivation against the submitted net of the spine, and one
//!    timeline row referencing the REMITTED event;
//! 6. after commit, the per-claim payment aggregation is recomputed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;

use claims_pipeline_domain::entities::{PersistSummary, RemittanceClaimDto, RemittanceDoc};
use claims_pipeline_domain::repositories::{IngestionErrorRecord, IngestionStore};
use claims_pipeline_domain::services::{
    derive_remittance_status, remittance_activity_missing_fields, remittance_claim_missing_fields, CodeKind,
    DiscoveryContext, ReferenceResolver,
};
use claims_pipeline_domain::value_objects::event_type::ClaimEventType;
use claims_pipeline_domain::value_objects::pipeline_stage::{ErrorObjectType, PipelineStage};
use claims_pipeline_domain::IngestError;

use crate::infrastructure::repositories::event_projection::{
    append_timeline, insert_event, money, snapshot_activity, upsert_claim_key, ActivitySnapshot, EventOrigin,
};
use crate::infrastructure::repositories::ingestion_repository::db_err;
use crate::infrastructure::repositories::payment_repository::PaymentRepository;

/// Result of persisting one remittance claim.
#[derive(Debug, Clone, Copy)]
struct PersistedRemitClaim {
    claim_key_id: i64,
    activities: u64,
}

/// Reference ids resolved ahead of the claim transaction.
#[derive(Debug, Default)]
struct ResolvedRemitRefs {
    payer: Option<i64>,
    provider: Option<i64>,
    claim_denial: Option<i64>,
    /// Parallel to `claim.activities`.
    activity_denials: Vec<Option<i64>>,
}

pub struct RemittancePersister {
    pool: SqlitePool,
    resolver: Arc<dyn ReferenceResolver>,
    errors: Arc<dyn IngestionStore>,
    payments: PaymentRepository,
}

impl RemittancePersister {
    pub fn new(
        pool: SqlitePool,
        resolver: Arc<dyn ReferenceResolver>,
        errors: Arc<dyn IngestionStore>,
        payments: PaymentRepository,
    ) -> Self {
        Self {
            pool,
            resolver,
            errors,
            payments,
        }
    }

    pub async fn persist(&self, ingestion_file_id: i64, doc: &RemittanceDoc) -> Result<PersistSummary, IngestError> {
        let tx_at = doc
            .header
            .transaction_date
            .ok_or_else(|| IngestError::validation("remittance header has no transaction date"))?;

        let remittance_id = self.upsert_remittance(ingestion_file_id, tx_at).await?;

        let mut summary = PersistSummary::new(ingestion_file_id);
        let mut pending_errors: Vec<IngestionErrorRecord> = Vec::new();

        for claim in &doc.claims {
            match self
                .persist_remittance_claim(ingestion_file_id, remittance_id, tx_at, &doc.header.sender_id, claim, &mut pending_errors)
                .await
            {
                Ok(Some(persisted)) => {
                    let claim_key_id = persisted.claim_key_id;
                    summary.claims_persisted += 1;
                    summary.activities_persisted += persisted.activities;
                    summary.events_written += 1;
                    // Aggregation runs outside the claim transaction; its
                    // failure is recorded but does not undo the persist.
                    if let Err(e) = self.payments.recalculate(claim_key_id).await {
                        pending_errors.push(
                            IngestionErrorRecord::new(
                                Some(ingestion_file_id),
                                PipelineStage::Persist,
                                "PAYMENT_RECALC_FAILED",
                                e.to_string(),
                            )
                            .with_object(ErrorObjectType::RemittanceClaim, claim.id.clone())
                            .retryable(true),
                        );
                    }
                }
                Ok(None) => summary.claims_skipped += 1,
                Err(e) => {
                    summary.claims_skipped += 1;
                    pending_errors.push(
                        IngestionErrorRecord::new(
                            Some(ingestion_file_id),
                            PipelineStage::Persist,
                            "REMIT_CLAIM_PERSIST_FAILED",
                            e.to_string(),
                        )
                        .with_object(ErrorObjectType::RemittanceClaim, claim.id.clone())
                        .retryable(e.is_recoverable()),
                    );
                }
            }
        }

        if summary.claims_skipped > 0 {
            pending_errors.push(IngestionErrorRecord::new(
                Some(ingestion_file_id),
                PipelineStage::Persist,
                "FILE_CLAIMS_SKIPPED",
                format!("{} of {} remittance claims skipped", summary.claims_skipped, doc.claims.len()),
            ));
        }

        for record in pending_errors {
            self.errors.record_error(record).await?;
        }

        Ok(summary)
    }

    async fn upsert_remittance(&self, ingestion_file_id: i64, tx_at: DateTime<Utc>) -> Result<i64, IngestError> {
        let inserted: Option<i64> = sqlx::query_scalar(
            "INSERT INTO claims_remittance (ingestion_file_id, tx_at) VALUES (?1, ?2) \
             ON CONFLICT (ingestion_file_id) DO NOTHING \
             RETURNING id",
        )
        .bind(ingestion_file_id)
        .bind(tx_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("remittance insert", e))?;

        match inserted {
            Some(id) => Ok(id),
            None => sqlx::query_scalar("SELECT id FROM claims_remittance WHERE ingestion_file_id = ?1")
                .bind(ingestion_file_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_err("remittance select", e)),
        }
    }

    async fn resolve_refs(
        &self,
        ingestion_file_id: i64,
        payer_code: &Option<String>,
        claim: &RemittanceClaimDto,
    ) -> Result<ResolvedRemitRefs, IngestError> {
        let ctx = DiscoveryContext::ingestion(ingestion_file_id, claim.id.clone());
        let mut refs = ResolvedRemitRefs {
            payer: self.resolver.resolve_opt(CodeKind::Payer, payer_code.as_deref(), None, &ctx).await?,
            provider: self
                .resolver
                .resolve_opt(CodeKind::Provider, claim.provider_id.as_deref(), None, &ctx)
                .await?,
            claim_denial: self
                .resolver
                .resolve_opt(CodeKind::DenialCode, claim.denial_code.as_deref(), None, &ctx)
                .await?,
            ..ResolvedRemitRefs::default()
        };

        for activity in &claim.activities {
            refs.activity_denials.push(
                self.resolver
                    .resolve_opt(CodeKind::DenialCode, activity.denial_code.as_deref(), None, &ctx)
                    .await?,
            );
        }

        Ok(refs)
    }

    /// Submitted net for the spine, summed exactly from the stored decimals.
    async fn net_requested(&self, conn: &mut SqliteConnection, claim_key_id: i64) -> Result<Decimal, IngestError> {
        let nets: Vec<Option<String>> = sqlx::query_scalar(
            "SELECT a.net FROM claims_activity a \
             JOIN claims_claim c ON c.id = a.claim_id \
             WHERE c.claim_key_id = ?1",
        )
        .bind(claim_key_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| db_err("net_requested query", e))?;

        let mut total = Decimal::ZERO;
        for net in nets.into_iter().flatten() {
            total += net
                .parse::<Decimal>()
                .map_err(|e| IngestError::persistence(format!("stored net {net:?} is not a decimal: {e}")))?;
        }
        Ok(total)
    }

    /// Persists one remittance claim; returns the claim-spine id and the
    /// accepted activity count on success.
    async fn persist_remittance_claim(
        &self,
        ingestion_file_id: i64,
        remittance_id: i64,
        tx_at: DateTime<Utc>,
        payer_code: &Option<String>,
        claim: &RemittanceClaimDto,
        pending_errors: &mut Vec<IngestionErrorRecord>,
    ) -> Result<Option<PersistedRemitClaim>, IngestError> {
        let missing = remittance_claim_missing_fields(claim);
        if !missing.is_empty() {
            pending_errors.push(
                IngestionErrorRecord::new(
                    Some(ingestion_file_id),
                    PipelineStage::Validate,
                    "MISSING_REMIT_REQUIRED",
                    format!("missing required fields: {}", missing.join(", ")),
                )
                .with_object(ErrorObjectType::RemittanceClaim, claim.id.clone()),
            );
            return Ok(None);
        }
        let Some(claim_id) = claim.id.as_deref() else {
            return Ok(None);
        };

        let refs = self.resolve_refs(ingestion_file_id, payer_code, claim).await?;

        let mut tx = self.pool.begin().await.map_err(|e| db_err("remit claim tx begin", e))?;

        let claim_key_id = upsert_claim_key(&mut tx, claim_id).await?;

        let remittance_claim_id = self
            .upsert_remittance_claim(&mut tx, remittance_id, claim_key_id, claim, &refs)
            .await?;

        let mut accepted_activities = 0u64;
        for (activity, denial_ref) in claim.activities.iter().zip(&refs.activity_denials) {
            let missing = remittance_activity_missing_fields(activity);
            if !missing.is_empty() {
                pending_errors.push(
                    IngestionErrorRecord::new(
                        Some(ingestion_file_id),
                        PipelineStage::Validate,
                        "MISSING_REMIT_ACTIVITY_REQUIRED",
                        format!("missing required fields: {}", missing.join(", ")),
                    )
                    .with_object(ErrorObjectType::RemittanceActivity, activity.id.clone()),
                );
                continue;
            }
            sqlx::query(
                "INSERT INTO claims_remittance_activity \
                 (remittance_claim_id, activity_id, start_at, activity_type, code, quantity, net, list_price, \
                  clinician, prior_auth_id, gross, patient_share, payment_amount, denial_code, denial_ref_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
                 ON CONFLICT (remittance_claim_id, activity_id) DO NOTHING",
            )
            .bind(remittance_claim_id)
            .bind(&activity.id)
            .bind(&activity.start)
            .bind(&activity.activity_type)
            .bind(&activity.code)
            .bind(money(activity.quantity))
            .bind(money(activity.net))
            .bind(money(activity.list_price))
            .bind(&activity.clinician)
            .bind(&activity.prior_auth_id)
            .bind(money(activity.gross))
            .bind(money(activity.patient_share))
            .bind(money(activity.payment_amount))
            .bind(&activity.denial_code)
            .bind(denial_ref)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("remittance activity insert", e))?;
            accepted_activities += 1;
        }

        // REMITTED event projecting the remittance-side metric fields.
        let remitted_event = insert_event(
            &mut tx,
            claim_key_id,
            ClaimEventType::Remitted,
            tx_at,
            EventOrigin {
                remittance_id: Some(remittance_id),
                ingestion_file_id: Some(ingestion_file_id),
                ..EventOrigin::default()
            },
        )
        .await?;
        for activity in &claim.activities {
            let Some(activity_id) = activity.id.clone() else {
                continue;
            };
            let snapshot = ActivitySnapshot {
                activity_id,
                start: activity.start.clone(),
                activity_type: activity.activity_type.clone(),
                code: activity.code.clone(),
                quantity: activity.quantity,
                net: activity.net,
                clinician: activity.clinician.clone(),
                prior_auth_id: activity.prior_auth_id.clone(),
                list_price: activity.list_price,
                gross: activity.gross,
                patient_share: activity.patient_share,
                payment_amount: activity.payment_amount,
                denial_code: activity.denial_code.clone(),
            };
            snapshot_activity(&mut tx, remitted_event, &snapshot).await?;
        }

        // Status derivation using this remittance only.
        let net_requested = self.net_requested(&mut tx, claim_key_id).await?;
        let status = derive_remittance_status(net_requested, claim.paid_amount(), claim.all_denied());
        append_timeline(&mut tx, claim_key_id, status, tx_at, remitted_event).await?;

        tx.commit().await.map_err(|e| db_err("remit claim tx commit", e))?;
        Ok(Some(PersistedRemitClaim {
            claim_key_id,
            activities: accepted_activities,
        }))
    }

    async fn upsert_remittance_claim(
        &self,
        conn: &mut SqliteConnection,
        remittance_id: i64,
        claim_key_id: i64,
        claim: &RemittanceClaimDto,
        refs: &ResolvedRemitRefs,
    ) -> Result<i64, IngestError> {
        let inserted: Option<i64> = sqlx::query_scalar(
            "INSERT INTO claims_remittance_claim \
             (remittance_id, claim_key_id, id_payer, provider_id, denial_code, payment_reference, \
              date_settlement, payer_ref_id, provider_ref_id, denial_ref_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT (remittance_id, claim_key_id) DO NOTHING \
             RETURNING id",
        )
        .bind(remittance_id)
        .bind(claim_key_id)
        .bind(&claim.id_payer)
        .bind(&claim.provider_id)
        .bind(&claim.denial_code)
        .bind(&claim.payment_reference)
        .bind(&claim.date_settlement)
        .bind(refs.payer)
        .bind(refs.provider)
        .bind(refs.claim_denial)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_err("remittance claim insert", e))?;

        match inserted {
            Some(id) => Ok(id),
            None => sqlx::query_scalar(
                "SELECT id FROM claims_remittance_claim WHERE remittance_id = ?1 AND claim_key_id = ?2",
            )
            .bind(remittance_id)
            .bind(claim_key_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| db_err("remittance claim select", e)),
        }
    }
}
