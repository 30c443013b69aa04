// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Document Persister Port
//!
//! Writes one parsed document's normalized graph. Implementations open one
//! transaction per claim (submission) or per remittance claim (remittance):
//! a bad claim rolls back alone, is recorded, and the rest of the file
//! commits. The whole operation is replay-safe; every insert is idempotent
//! under its declared unique key.

use async_trait::async_trait;

use crate::entities::remittance::RemittanceDoc;
use crate::entities::reports::PersistSummary;
use crate::entities::submission::SubmissionDoc;
use crate::IngestError;

#[async_trait]
pub trait DocumentPersister: Send + Sync {
    /// Persists a submission graph: claim spine, claims, encounters,
    /// diagnoses, activities, observations, events, timeline, resubmission,
    /// attachments.
    async fn persist_submission(
        &self,
        ingestion_file_id: i64,
        doc: &SubmissionDoc,
    ) -> Result<PersistSummary, IngestError>;

    /// Persists a remittance graph: claim spine, remittance claims and
    /// activities, REMITTED events with projection, derived status timeline
    /// rows, and the per-claim payment recalculation.
    async fn persist_remittance(
        &self,
        ingestion_file_id: i64,
        doc: &RemittanceDoc,
    ) -> Result<PersistSummary, IngestError>;
}
