// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Post-Persist Verifier
//!
//! Rescans the persisted row counts for one file and compares them with the
//! parsed document: declared record count vs persisted claims, parsed vs
//! persisted activities, and the remittance-side equivalents. Discrepancies
//! are recorded as `VERIFY` errors; only a fully clean file is marked
//! verified (which is what gates the remote acknowledgement).
//!
//! A declared record count that disagrees with the document's own claim
//! list is reported but does not fail verification when everything the
//! parser produced was persisted — short shipments are an upstream defect,
//! not an ingestion one.

use std::sync::Arc;

use claims_pipeline_domain::entities::{ParseOutcome, PersistSummary, VerifyReport};
use claims_pipeline_domain::repositories::{IngestionErrorRecord, IngestionStore};
use claims_pipeline_domain::value_objects::pipeline_stage::{ErrorObjectType, PipelineStage};
use claims_pipeline_domain::IngestError;

pub struct Verifier {
    store: Arc<dyn IngestionStore>,
}

impl Verifier {
    pub fn new(store: Arc<dyn IngestionStore>) -> Self {
        Self { store }
    }

    pub async fn verify(
        &self,
        ingestion_file_id: i64,
        outcome: &ParseOutcome,
        summary: &PersistSummary,
    ) -> Result<VerifyReport, IngestError> {
        let counts = self.store.persisted_counts(ingestion_file_id).await?;
        let mut discrepancies = Vec::new();

        let expected_claims = summary.claims_persisted as i64;
        match outcome {
            ParseOutcome::Submission(doc) => {
                if counts.claims < expected_claims {
                    discrepancies.push(format!(
                        "persisted claim count {} is below this run's {} accepted claims",
                        counts.claims, expected_claims
                    ));
                }
                let parsed_activities: i64 = doc.claims.iter().map(|c| c.activities.len() as i64).sum();
                if counts.activities < summary.activities_persisted as i64 {
                    discrepancies.push(format!(
                        "persisted activity count {} is below this run's {} accepted activities",
                        counts.activities, summary.activities_persisted
                    ));
                }
                if let Some(declared) = doc.header.record_count {
                    if declared != doc.claims.len() as i64 {
                        discrepancies.push(format!(
                            "header declares {declared} records but the document carries {} claims ({} activities)",
                            doc.claims.len(),
                            parsed_activities
                        ));
                    }
                }
            }
            ParseOutcome::Remittance(doc) => {
                if counts.remittance_claims < expected_claims {
                    discrepancies.push(format!(
                        "persisted remittance claim count {} is below this run's {} accepted claims",
                        counts.remittance_claims, expected_claims
                    ));
                }
                if counts.remittance_activities < summary.activities_persisted as i64 {
                    discrepancies.push(format!(
                        "persisted remittance activity count {} is below this run's {} accepted activities",
                        counts.remittance_activities, summary.activities_persisted
                    ));
                }
                if let Some(declared) = doc.header.record_count {
                    if declared != doc.claims.len() as i64 {
                        discrepancies.push(format!(
                            "header declares {declared} records but the document carries {} claims",
                            doc.claims.len()
                        ));
                    }
                }
            }
        }

        // Count shortfalls fail verification; a record-count disagreement
        // alone is a warning-grade discrepancy.
        let persisted_short = match outcome {
            ParseOutcome::Submission(_) => {
                counts.claims < expected_claims || counts.activities < summary.activities_persisted as i64
            }
            ParseOutcome::Remittance(_) => {
                counts.remittance_claims < expected_claims
                    || counts.remittance_activities < summary.activities_persisted as i64
            }
        };

        for discrepancy in &discrepancies {
            self.store
                .record_error(
                    IngestionErrorRecord::new(
                        Some(ingestion_file_id),
                        PipelineStage::Verify,
                        "VERIFY_MISMATCH",
                        discrepancy.clone(),
                    )
                    .with_object(ErrorObjectType::File, None),
                )
                .await?;
        }

        if persisted_short {
            Ok(VerifyReport::failed(true, discrepancies))
        } else {
            self.store.mark_file_verified(ingestion_file_id).await?;
            Ok(VerifyReport {
                ok: true,
                file_persisted_ok: true,
                discrepancies,
            })
        }
    }
}
