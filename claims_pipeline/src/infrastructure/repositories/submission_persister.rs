// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Submission Persister
//!
//! Writes one parsed submission document into the normalized claim graph.
//!
//! Each claim is persisted in its own transaction: a bad claim rolls back
//! alone, is recorded in `claims_ingestion_error`, and the pipeline
//! continues with the next claim. Reference resolution runs *before* the
//! claim transaction opens so the resolver's own writes (discovery audit,
//! auto-insert) never contend with the claim graph's write lock.
//!
//! Per-claim flow:
//!
//! 1. required-field guard (`MISSING_CLAIM_REQUIRED` on miss, skip);
//! 2. duplicate guard: an already-SUBMITTED claim arriving again without a
//!    `<Resubmission>` payload is `DUP_SUBMISSION_NO_RESUB`, skip;
//! 3. claim-spine upsert, claim row, encounter, diagnoses, activities and
//!    observations, all idempotent under their unique keys;
//! 4. SUBMITTED event with activity/observation snapshots and a timeline
//!    row; a RESUBMITTED event (plus resubmission row) when the payload
//!    carries one;
//! 5. attachments keyed to the event that brought them in.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::debug;

use claims_pipeline_domain::entities::{ActivityDto, ClaimDto, ExtractedAttachment, PersistSummary, SubmissionDoc};
use claims_pipeline_domain::repositories::{IngestionErrorRecord, IngestionStore};
use claims_pipeline_domain::services::{
    activity_missing_fields, claim_missing_fields, diagnosis_missing_fields, CodeKind, DiscoveryContext,
    ReferenceResolver,
};
use claims_pipeline_domain::value_objects::claim_status::ClaimStatus;
use claims_pipeline_domain::value_objects::event_type::ClaimEventType;
use claims_pipeline_domain::value_objects::pipeline_stage::{ErrorObjectType, PipelineStage};
use claims_pipeline_domain::IngestError;

use crate::infrastructure::repositories::event_projection::{
    append_timeline, insert_event, money, snapshot_activity, snapshot_observation, upsert_claim_key,
    ActivitySnapshot, EventOrigin,
};
use crate::infrastructure::repositories::ingestion_repository::db_err;

/// Reference ids resolved ahead of the claim transaction.
#[derive(Debug, Default)]
struct ResolvedRefs {
    payer: Option<i64>,
    provider: Option<i64>,
    facility: Option<i64>,
    /// Parallel to `claim.diagnoses`.
    diagnoses: Vec<Option<i64>>,
    /// Parallel to `claim.activities`: (clinician, activity_code).
    activities: Vec<(Option<i64>, Option<i64>)>,
}

/// Row counts produced while persisting one claim.
#[derive(Debug, Default, Clone, Copy)]
struct ClaimCounts {
    activities: u64,
    events: u64,
}

pub struct SubmissionPersister {
    pool: SqlitePool,
    resolver: Arc<dyn ReferenceResolver>,
    errors: Arc<dyn IngestionStore>,
}

impl SubmissionPersister {
    pub fn new(pool: SqlitePool, resolver: Arc<dyn ReferenceResolver>, errors: Arc<dyn IngestionStore>) -> Self {
        Self { pool, resolver, errors }
    }

    pub async fn persist(&self, ingestion_file_id: i64, doc: &SubmissionDoc) -> Result<PersistSummary, IngestError> {
        let tx_at = doc
            .header
            .transaction_date
            .ok_or_else(|| IngestError::validation("submission header has no transaction date"))?;

        let submission_id = self.upsert_submission(ingestion_file_id, tx_at).await?;

        let mut summary = PersistSummary::new(ingestion_file_id);
        let mut pending_errors: Vec<IngestionErrorRecord> = Vec::new();

        for claim in &doc.claims {
            match self
                .persist_claim(ingestion_file_id, submission_id, tx_at, claim, &doc.attachments, &mut pending_errors)
                .await
            {
                Ok(Some(counts)) => {
                    summary.claims_persisted += 1;
                    summary.activities_persisted += counts.activities;
                    summary.events_written += counts.events;
                }
                Ok(None) => summary.claims_skipped += 1,
                Err(e) => {
                    summary.claims_skipped += 1;
                    pending_errors.push(
                        IngestionErrorRecord::new(
                            Some(ingestion_file_id),
                            PipelineStage::Persist,
                            "CLAIM_PERSIST_FAILED",
                            e.to_string(),
                        )
                        .with_object(ErrorObjectType::Claim, claim.id.clone())
                        .retryable(e.is_recoverable()),
                    );
                }
            }
        }

        // File-level summary once all claims were attempted.
        if summary.claims_skipped > 0 {
            pending_errors.push(IngestionErrorRecord::new(
                Some(ingestion_file_id),
                PipelineStage::Persist,
                "FILE_CLAIMS_SKIPPED",
                format!("{} of {} claims skipped", summary.claims_skipped, doc.claims.len()),
            ));
        }

        for record in pending_errors {
            self.errors.record_error(record).await?;
        }

        Ok(summary)
    }

    async fn upsert_submission(&self, ingestion_file_id: i64, tx_at: DateTime<Utc>) -> Result<i64, IngestError> {
        let inserted: Option<i64> = sqlx::query_scalar(
            "INSERT INTO claims_submission (ingestion_file_id, tx_at) VALUES (?1, ?2) \
             ON CONFLICT (ingestion_file_id) DO NOTHING \
             RETURNING id",
        )
        .bind(ingestion_file_id)
        .bind(tx_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("submission insert", e))?;

        match inserted {
            Some(id) => Ok(id),
            None => sqlx::query_scalar("SELECT id FROM claims_submission WHERE ingestion_file_id = ?1")
                .bind(ingestion_file_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_err("submission select", e)),
        }
    }

    /// True when the spine already carries a SUBMITTED event for this claim.
    async fn already_submitted(&self, claim_id: &str) -> Result<bool, IngestError> {
        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM claims_claim_key ck \
             JOIN claims_claim_event e ON e.claim_key_id = ck.id AND e.event_type = ?2 \
             WHERE ck.claim_id = ?1 \
             LIMIT 1",
        )
        .bind(claim_id)
        .bind(ClaimEventType::Submitted.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("duplicate submission guard", e))?;
        Ok(exists.is_some())
    }

    async fn resolve_refs(&self, ingestion_file_id: i64, claim: &ClaimDto) -> Result<ResolvedRefs, IngestError> {
        let ctx = DiscoveryContext::ingestion(ingestion_file_id, claim.id.clone());
        let mut refs = ResolvedRefs {
            payer: self.resolver.resolve_opt(CodeKind::Payer, claim.payer_id.as_deref(), None, &ctx).await?,
            provider: self
                .resolver
                .resolve_opt(CodeKind::Provider, claim.provider_id.as_deref(), None, &ctx)
                .await?,
            ..ResolvedRefs::default()
        };

        if let Some(encounter) = &claim.encounter {
            refs.facility = self
                .resolver
                .resolve_opt(CodeKind::Facility, encounter.facility_id.as_deref(), None, &ctx)
                .await?;
        }

        for diagnosis in &claim.diagnoses {
            refs.diagnoses.push(
                self.resolver
                    .resolve_opt(CodeKind::DiagnosisCode, diagnosis.code.as_deref(), None, &ctx)
                    .await?,
            );
        }

        for activity in &claim.activities {
            let clinician = self
                .resolver
                .resolve_opt(CodeKind::Clinician, activity.clinician.as_deref(), None, &ctx)
                .await?;
            let code = self
                .resolver
                .resolve_opt(CodeKind::ActivityCode, activity.code.as_deref(), activity.activity_type.as_deref(), &ctx)
                .await?;
            refs.activities.push((clinician, code));
        }

        Ok(refs)
    }

    /// Persists one claim. `Ok(None)` means the claim was skipped (guard or
    /// validation); the reason is already in `pending_errors`.
    async fn persist_claim(
        &self,
        ingestion_file_id: i64,
        submission_id: i64,
        tx_at: DateTime<Utc>,
        claim: &ClaimDto,
        attachments: &[ExtractedAttachment],
        pending_errors: &mut Vec<IngestionErrorRecord>,
    ) -> Result<Option<ClaimCounts>, IngestError> {
        let missing = claim_missing_fields(claim);
        if !missing.is_empty() {
            pending_errors.push(
                IngestionErrorRecord::new(
                    Some(ingestion_file_id),
                    PipelineStage::Validate,
                    "MISSING_CLAIM_REQUIRED",
                    format!("missing required fields: {}", missing.join(", ")),
                )
                .with_object(ErrorObjectType::Claim, claim.id.clone()),
            );
            return Ok(None);
        }
        // The guard above ensures the id is present.
        let Some(claim_id) = claim.id.as_deref() else {
            return Ok(None);
        };

        if claim.resubmission.is_none() && self.already_submitted(claim_id).await? {
            pending_errors.push(
                IngestionErrorRecord::new(
                    Some(ingestion_file_id),
                    PipelineStage::Persist,
                    "DUP_SUBMISSION_NO_RESUB",
                    "claim already submitted and no resubmission payload present",
                )
                .with_object(ErrorObjectType::Claim, Some(claim_id.to_string())),
            );
            return Ok(None);
        }

        // Reference resolution happens before the claim transaction so the
        // resolver's writes never nest inside the graph's write lock.
        let refs = self.resolve_refs(ingestion_file_id, claim).await?;

        let mut tx = self.pool.begin().await.map_err(|e| db_err("claim tx begin", e))?;
        let mut counts = ClaimCounts::default();

        let claim_key_id = upsert_claim_key(&mut tx, claim_id).await?;
        let claim_row_id = self
            .insert_claim_row(&mut tx, submission_id, claim_key_id, tx_at, claim, &refs)
            .await?;

        if let Some(encounter) = &claim.encounter {
            sqlx::query(
                "INSERT INTO claims_encounter \
                 (claim_id, facility_ref_id, facility_id, encounter_type, patient_id, start_at, end_at, \
                  start_type, end_type, transfer_source, transfer_destination) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                 ON CONFLICT (claim_id) DO NOTHING",
            )
            .bind(claim_row_id)
            .bind(refs.facility)
            .bind(&encounter.facility_id)
            .bind(&encounter.encounter_type)
            .bind(&encounter.patient_id)
            .bind(&encounter.start)
            .bind(&encounter.end)
            .bind(&encounter.start_type)
            .bind(&encounter.end_type)
            .bind(&encounter.transfer_source)
            .bind(&encounter.transfer_destination)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("encounter insert", e))?;
        }

        for (diagnosis, ref_id) in claim.diagnoses.iter().zip(&refs.diagnoses) {
            let missing = diagnosis_missing_fields(diagnosis);
            if !missing.is_empty() {
                pending_errors.push(
                    IngestionErrorRecord::new(
                        Some(ingestion_file_id),
                        PipelineStage::Validate,
                        "MISSING_DIAGNOSIS_REQUIRED",
                        format!("missing required fields: {}", missing.join(", ")),
                    )
                    .with_object(ErrorObjectType::Diagnosis, Some(claim_id.to_string())),
                );
                continue;
            }
            sqlx::query(
                "INSERT INTO claims_diagnosis (claim_id, diag_type, code, diagnosis_ref_id) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (claim_id, diag_type, code) DO NOTHING",
            )
            .bind(claim_row_id)
            .bind(&diagnosis.diag_type)
            .bind(&diagnosis.code)
            .bind(ref_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("diagnosis insert", e))?;
        }

        let mut valid_activities: Vec<&ActivityDto> = Vec::new();
        for (activity, (clinician_ref, code_ref)) in claim.activities.iter().zip(&refs.activities) {
            let missing = activity_missing_fields(activity);
            if !missing.is_empty() {
                pending_errors.push(
                    IngestionErrorRecord::new(
                        Some(ingestion_file_id),
                        PipelineStage::Validate,
                        "MISSING_ACTIVITY_REQUIRED",
                        format!("missing required fields: {}", missing.join(", ")),
                    )
                    .with_object(ErrorObjectType::Activity, activity.id.clone()),
                );
                continue;
            }
            let inserted = self
                .insert_activity(&mut tx, claim_row_id, activity, *clinician_ref, *code_ref)
                .await?;
            if inserted {
                counts.activities += 1;
            } else {
                debug!(claim_id, activity_id = ?activity.id, "duplicate activity id within claim, first insert wins");
            }
            valid_activities.push(activity);
        }

        // SUBMITTED event, projection, timeline.
        let submitted_event = insert_event(
            &mut tx,
            claim_key_id,
            ClaimEventType::Submitted,
            tx_at,
            EventOrigin {
                submission_id: Some(submission_id),
                ingestion_file_id: Some(ingestion_file_id),
                ..EventOrigin::default()
            },
        )
        .await?;
        counts.events += 1;
        self.project_activities(&mut tx, submitted_event, &valid_activities).await?;
        append_timeline(&mut tx, claim_key_id, ClaimStatus::Submitted, tx_at, submitted_event).await?;

        // RESUBMITTED event when the payload carries one.
        let mut attachment_event = submitted_event;
        if let Some(resubmission) = &claim.resubmission {
            let resubmitted_event = insert_event(
                &mut tx,
                claim_key_id,
                ClaimEventType::Resubmitted,
                tx_at,
                EventOrigin {
                    submission_id: Some(submission_id),
                    ingestion_file_id: Some(ingestion_file_id),
                    ..EventOrigin::default()
                },
            )
            .await?;
            counts.events += 1;
            self.project_activities(&mut tx, resubmitted_event, &valid_activities).await?;
            append_timeline(&mut tx, claim_key_id, ClaimStatus::Resubmitted, tx_at, resubmitted_event).await?;

            sqlx::query(
                "INSERT INTO claims_claim_resubmission (claim_event_id, resubmission_type, comment, attachment) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (claim_event_id) DO NOTHING",
            )
            .bind(resubmitted_event)
            .bind(&resubmission.resubmission_type)
            .bind(&resubmission.comment)
            .bind(&resubmission.attachment)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("resubmission insert", e))?;

            attachment_event = resubmitted_event;
        }

        for attachment in attachments.iter().filter(|a| a.claim_id == claim_id) {
            sqlx::query(
                "INSERT INTO claims_claim_attachment (claim_key_id, claim_event_id, file_name, content) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (claim_key_id, claim_event_id, file_name) DO NOTHING",
            )
            .bind(claim_key_id)
            .bind(attachment_event)
            .bind(&attachment.file_name)
            .bind(&attachment.bytes)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("attachment insert", e))?;
        }

        tx.commit().await.map_err(|e| db_err("claim tx commit", e))?;
        Ok(Some(counts))
    }

    async fn insert_claim_row(
        &self,
        conn: &mut SqliteConnection,
        submission_id: i64,
        claim_key_id: i64,
        tx_at: DateTime<Utc>,
        claim: &ClaimDto,
        refs: &ResolvedRefs,
    ) -> Result<i64, IngestError> {
        let inserted: Option<i64> = sqlx::query_scalar(
            "INSERT INTO claims_claim \
             (submission_id, claim_key_id, payer_ref_id, provider_ref_id, id_payer, member_id, payer_id, \
              provider_id, emirates_id_number, gross, patient_share, net, tx_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
             ON CONFLICT (claim_key_id) DO NOTHING \
             RETURNING id",
        )
        .bind(submission_id)
        .bind(claim_key_id)
        .bind(refs.payer)
        .bind(refs.provider)
        .bind(&claim.id_payer)
        .bind(&claim.member_id)
        .bind(&claim.payer_id)
        .bind(&claim.provider_id)
        .bind(&claim.emirates_id_number)
        .bind(money(claim.gross))
        .bind(money(claim.patient_share))
        .bind(money(claim.net))
        .bind(tx_at)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_err("claim insert", e))?;

        match inserted {
            Some(id) => Ok(id),
            None => sqlx::query_scalar("SELECT id FROM claims_claim WHERE claim_key_id = ?1")
                .bind(claim_key_id)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| db_err("claim select", e)),
        }
    }

    /// Returns whether a new row was inserted (false on duplicate id).
    async fn insert_activity(
        &self,
        conn: &mut SqliteConnection,
        claim_row_id: i64,
        activity: &ActivityDto,
        clinician_ref: Option<i64>,
        code_ref: Option<i64>,
    ) -> Result<bool, IngestError> {
        let inserted: Option<i64> = sqlx::query_scalar(
            "INSERT INTO claims_activity \
             (claim_id, activity_id, start_at, activity_type, code, quantity, net, clinician, prior_auth_id, \
              clinician_ref_id, activity_code_ref_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
             ON CONFLICT (claim_id, activity_id) DO NOTHING \
             RETURNING id",
        )
        .bind(claim_row_id)
        .bind(&activity.id)
        .bind(&activity.start)
        .bind(&activity.activity_type)
        .bind(&activity.code)
        .bind(money(activity.quantity))
        .bind(money(activity.net))
        .bind(&activity.clinician)
        .bind(&activity.prior_auth_id)
        .bind(clinician_ref)
        .bind(code_ref)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_err("activity insert", e))?;

        let activity_row_id = match inserted {
            Some(id) => id,
            None => {
                let id: i64 = sqlx::query_scalar("SELECT id FROM claims_activity WHERE claim_id = ?1 AND activity_id = ?2")
                    .bind(claim_row_id)
                    .bind(&activity.id)
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(|e| db_err("activity select", e))?;
                id
            }
        };

        for observation in &activity.observations {
            sqlx::query(
                "INSERT INTO claims_observation (activity_id, obs_type, obs_code, obs_value, value_type, value_hash) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT (activity_id, obs_type, obs_code, value_hash) DO NOTHING",
            )
            .bind(activity_row_id)
            .bind(&observation.obs_type)
            .bind(&observation.code)
            .bind(&observation.value)
            .bind(&observation.value_type)
            .bind(observation.value_hash())
            .execute(&mut *conn)
            .await
            .map_err(|e| db_err("observation insert", e))?;
        }

        Ok(inserted.is_some())
    }

    /// Snapshots the submission-side view of every valid activity under an
    /// event, observations included.
    async fn project_activities(
        &self,
        conn: &mut SqliteConnection,
        claim_event_id: i64,
        activities: &[&ActivityDto],
    ) -> Result<(), IngestError> {
        for activity in activities {
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
                ..ActivitySnapshot::default()
            };
            let event_activity_id = snapshot_activity(&mut *conn, claim_event_id, &snapshot).await?;
            for observation in &activity.observations {
                snapshot_observation(&mut *conn, event_activity_id, observation).await?;
            }
        }
        Ok(())
    }
}
