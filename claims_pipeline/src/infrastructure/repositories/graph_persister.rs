// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Facade implementing the domain [`DocumentPersister`] port over the two
//! root-specific persisters.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

use claims_pipeline_domain::entities::{PersistSummary, RemittanceDoc, SubmissionDoc};
use claims_pipeline_domain::repositories::{DocumentPersister, IngestionStore};
use claims_pipeline_domain::services::ReferenceResolver;
use claims_pipeline_domain::IngestError;

use crate::infrastructure::repositories::payment_repository::PaymentRepository;
use crate::infrastructure::repositories::remittance_persister::RemittancePersister;
use crate::infrastructure::repositories::submission_persister::SubmissionPersister;

pub struct SqliteDocumentPersister {
    submissions: SubmissionPersister,
    remittances: RemittancePersister,
}

impl SqliteDocumentPersister {
    pub fn new(pool: SqlitePool, resolver: Arc<dyn ReferenceResolver>, errors: Arc<dyn IngestionStore>) -> Self {
        let payments = PaymentRepository::new(pool.clone());
        Self {
            submissions: SubmissionPersister::new(pool.clone(), resolver.clone(), errors.clone()),
            remittances: RemittancePersister::new(pool, resolver, errors, payments),
        }
    }
}

#[async_trait]
impl DocumentPersister for SqliteDocumentPersister {
    async fn persist_submission(
        &self,
        ingestion_file_id: i64,
        doc: &SubmissionDoc,
    ) -> Result<PersistSummary, IngestError> {
        self.submissions.persist(ingestion_file_id, doc).await
    }

    async fn persist_remittance(
        &self,
        ingestion_file_id: i64,
        doc: &RemittanceDoc,
    ) -> Result<PersistSummary, IngestError> {
        self.remittances.persist(ingestion_file_id, doc).await
    }
}
