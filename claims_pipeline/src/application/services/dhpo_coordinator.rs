// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DHPO Fetch Coordinator
//!
//! Drives the per-facility polling cycle against the DHPO service:
//!
//! - **Delta poll** (`GetNewTransactions`): everything the service has not
//!   yet seen acknowledged for the facility;
//! - **Search poll** (`SearchTransactions`): a sliding window over the last
//!   N days, run for the submission pair `(transactionID=2, direction=1)`
//!   and the remittance pair `(transactionID=8, direction=2)`, paged with
//!   skip/take until a short page.
//!
//! Each listed file is downloaded, staged (memory or disk per policy),
//! registered in the [`DhpoFileRegistry`] for the post-verify ack, and
//! submitted to the orchestrator. Facilities are polled concurrently up to
//! the configured cap; a tick never overlaps itself, and credentials or
//! transport failures skip the facility for the cycle rather than aborting
//! the others.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use claims_pipeline_domain::repositories::{FacilityConfigRow, FacilityDirectory, IngestionErrorRecord, IngestionStore, RunStats};
use claims_pipeline_domain::services::toggle_store::codes;
use claims_pipeline_domain::services::{
    CredentialCipher, FacilityCredentials, SearchWindow, ToggleStore, TransactionGateway, TransactionHandle,
};
use claims_pipeline_domain::value_objects::pipeline_stage::{ErrorObjectType, PipelineStage};
use claims_pipeline_domain::value_objects::safe_file_name::derive_file_id;
use claims_pipeline_domain::{IngestError, SourceHandle, WorkItem};

use crate::application::services::orchestrator::Orchestrator;
use crate::application::services::pipeline::{Acker, FileReport};
use crate::infrastructure::adapters::dhpo_file_registry::DhpoFileRegistry;
use crate::infrastructure::config::SoapConfig;
use crate::infrastructure::services::staging::StagingService;

/// The two direction/transaction pairs the search poll covers.
const SEARCH_PAIRS: [(i32, i32); 2] = [(2, 1), (8, 2)];

pub struct DhpoFetchCoordinator {
    config: SoapConfig,
    directory: Arc<dyn FacilityDirectory>,
    cipher: Arc<dyn CredentialCipher>,
    gateway: Arc<dyn TransactionGateway>,
    toggles: Arc<dyn ToggleStore>,
    staging: Arc<StagingService>,
    registry: Arc<DhpoFileRegistry>,
    store: Arc<dyn IngestionStore>,
}

impl DhpoFetchCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SoapConfig,
        directory: Arc<dyn FacilityDirectory>,
        cipher: Arc<dyn CredentialCipher>,
        gateway: Arc<dyn TransactionGateway>,
        toggles: Arc<dyn ToggleStore>,
        staging: Arc<StagingService>,
        registry: Arc<DhpoFileRegistry>,
        store: Arc<dyn IngestionStore>,
    ) -> Self {
        Self {
            config,
            directory,
            cipher,
            gateway,
            toggles,
            staging,
            registry,
            store,
        }
    }

    /// One poll tick across all active facilities.
    pub async fn tick(&self, orchestrator: &Orchestrator) -> Result<(), IngestError> {
        // Toggles are read once per tick and never block scheduling.
        let delta_enabled = self.toggles.is_enabled(codes::DHPO_GET_NEW_ENABLED, true).await?;
        let search_enabled = self.toggles.is_enabled(codes::DHPO_SEARCH_ENABLED, true).await?;
        if !delta_enabled && !search_enabled {
            debug!("both DHPO polls disabled by toggles, skipping tick");
            return Ok(());
        }

        let facilities = self.directory.active_facilities().await?;
        if facilities.is_empty() {
            debug!("no active facilities configured");
            return Ok(());
        }

        let run_row = self
            .store
            .start_run(&Ulid::new().to_string(), "dhpo", Utc::now())
            .await?;

        let fetched: Vec<u64> = stream::iter(facilities)
            .map(|facility| self.poll_facility(facility, orchestrator, delta_enabled, search_enabled))
            .buffer_unordered(self.config.facility_concurrency.max(1))
            .collect()
            .await;

        let stats = RunStats {
            files_fetched: fetched.iter().map(|n| *n as i64).sum(),
            ..RunStats::default()
        };
        self.store.complete_run(run_row, &stats).await?;
        info!(files_fetched = stats.files_fetched, "DHPO poll tick completed");
        Ok(())
    }

    /// Polls one facility; errors skip the facility for this cycle only.
    async fn poll_facility(
        &self,
        facility: FacilityConfigRow,
        orchestrator: &Orchestrator,
        delta_enabled: bool,
        search_enabled: bool,
    ) -> u64 {
        let facility_code = facility.facility_code.clone();
        let credentials = match self.decrypt_facility(&facility) {
            Ok(credentials) => credentials,
            Err(e) => {
                // A facility whose credentials cannot be opened is a
                // CRITICAL operational condition, but only for this cycle.
                error!(facility = %facility_code, "CRITICAL: credential decryption failed, skipping cycle: {e}");
                self.record_fetch_error(&facility_code, "CRYPTO_DECRYPT_FAILED", &e).await;
                return 0;
            }
        };

        match self
            .poll_with_credentials(&credentials, orchestrator, delta_enabled, search_enabled)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(facility = %facility_code, "poll failed, skipping facility for this cycle: {e}");
                self.record_fetch_error(&facility_code, "FACILITY_POLL_FAILED", &e).await;
                0
            }
        }
    }

    async fn poll_with_credentials(
        &self,
        facility: &FacilityCredentials,
        orchestrator: &Orchestrator,
        delta_enabled: bool,
        search_enabled: bool,
    ) -> Result<u64, IngestError> {
        let handles = self.collect_handles(facility, delta_enabled, search_enabled).await?;
        debug!(facility = %facility.facility_code, listed = handles.len(), "facility listing complete");

        let mut fetched = 0u64;
        for handle in handles {
            if orchestrator.queue_available() == 0 {
                debug!(facility = %facility.facility_code, "work queue full, pausing facility fetch");
                break;
            }
            // Fully verified files are not re-downloaded.
            if self.store.is_file_verified(&handle.file_id).await? {
                continue;
            }

            match self.fetch_one(facility, &handle).await {
                Ok(item) => match orchestrator.submit(item) {
                    Ok(()) => fetched += 1,
                    Err(IngestError::QueueFull) => break,
                    Err(e) => return Err(e),
                },
                Err(e) => {
                    warn!(facility = %facility.facility_code, file_id = %handle.file_id, "download failed: {e}");
                    self.record_fetch_error(&facility.facility_code, "DOWNLOAD_FAILED", &e).await;
                }
            }
        }
        Ok(fetched)
    }

    /// Delta + search listings, deduplicated by file id.
    async fn collect_handles(
        &self,
        facility: &FacilityCredentials,
        delta_enabled: bool,
        search_enabled: bool,
    ) -> Result<Vec<TransactionHandle>, IngestError> {
        let mut seen = HashSet::new();
        let mut handles = Vec::new();

        if delta_enabled {
            let (code, listed) = self.gateway.get_new_transactions(facility).await?;
            if code.is_success() {
                for handle in listed {
                    if handle.is_downloaded != Some(true) && seen.insert(handle.file_id.clone()) {
                        handles.push(handle);
                    }
                }
            } else {
                warn!(facility = %facility.facility_code, %code, "GetNewTransactions returned a failure code");
            }
        }

        if search_enabled {
            let to = Utc::now();
            let from = to - ChronoDuration::days(self.config.search_window_days);
            for (transaction_id, direction) in SEARCH_PAIRS {
                let mut skip = 0i32;
                loop {
                    let window = SearchWindow {
                        from,
                        to,
                        transaction_id,
                        direction,
                        skip,
                        take: self.config.page_size,
                    };
                    let (code, page) = self.gateway.search_transactions(facility, &window).await?;
                    if !code.is_success() {
                        warn!(
                            facility = %facility.facility_code,
                            transaction_id, direction, %code,
                            "SearchTransactions returned a failure code"
                        );
                        break;
                    }
                    let page_len = page.len();
                    for handle in page {
                        if handle.is_downloaded != Some(true) && seen.insert(handle.file_id.clone()) {
                            handles.push(handle);
                        }
                    }
                    if (page_len as i32) < self.config.page_size {
                        break;
                    }
                    skip += self.config.page_size;
                }
            }
        }

        Ok(handles)
    }

    /// Downloads, stages, and registers one file.
    async fn fetch_one(
        &self,
        facility: &FacilityCredentials,
        handle: &TransactionHandle,
    ) -> Result<WorkItem, IngestError> {
        let (code, downloaded) = self.gateway.download_transaction_file(facility, &handle.file_id).await?;
        if !code.is_success() {
            return Err(IngestError::RemoteFault {
                code: code.value(),
                message: format!("DownloadTransactionFile failed for {}", handle.file_id),
            });
        }
        if downloaded.bytes.is_empty() {
            return Err(IngestError::transport(format!("download {} produced no bytes", handle.file_id)));
        }

        let server_name = downloaded.file_name.as_deref().or(handle.file_name.as_deref());
        let file_name = derive_file_id(server_name, &downloaded.bytes);

        let payload = self
            .staging
            .stage(&file_name, downloaded.bytes, downloaded.download_millis)
            .await?;

        self.registry.register(&handle.file_id, &facility.facility_code);

        Ok(WorkItem::new(
            handle.file_id.clone(),
            file_name,
            payload,
            SourceHandle::Dhpo {
                facility_code: facility.facility_code.clone(),
            },
        ))
    }

    fn decrypt_facility(&self, row: &FacilityConfigRow) -> Result<FacilityCredentials, IngestError> {
        let (Some(username_enc), Some(password_enc), Some(metadata)) =
            (&row.username_enc, &row.password_enc, &row.crypto_meta)
        else {
            return Err(IngestError::crypto(format!(
                "facility {} has no sealed credentials",
                row.facility_code
            )));
        };

        let credentials = self
            .cipher
            .decrypt_credentials(&row.facility_code, username_enc, password_enc, metadata)?;

        Ok(FacilityCredentials {
            facility_code: row.facility_code.clone(),
            endpoint_url: row.endpoint_url.clone(),
            credentials,
        })
    }

    async fn record_fetch_error(&self, facility_code: &str, code: &str, error: &IngestError) {
        let record = IngestionErrorRecord::new(None, PipelineStage::Fetch, code, error.to_string())
            .with_object(ErrorObjectType::Facility, Some(facility_code.to_string()))
            .retryable(error.is_recoverable());
        if let Err(e) = self.store.record_error(record).await {
            error!("failed to record fetch error: {e}");
        }
    }
}

/// Post-verify remote acknowledgement for DHPO-sourced files.
pub struct DhpoAcker {
    directory: Arc<dyn FacilityDirectory>,
    cipher: Arc<dyn CredentialCipher>,
    gateway: Arc<dyn TransactionGateway>,
    toggles: Arc<dyn ToggleStore>,
    registry: Arc<DhpoFileRegistry>,
}

impl DhpoAcker {
    pub fn new(
        directory: Arc<dyn FacilityDirectory>,
        cipher: Arc<dyn CredentialCipher>,
        gateway: Arc<dyn TransactionGateway>,
        toggles: Arc<dyn ToggleStore>,
        registry: Arc<DhpoFileRegistry>,
    ) -> Self {
        Self {
            directory,
            cipher,
            gateway,
            toggles,
            registry,
        }
    }

    async fn facility_credentials(&self, facility_code: &str) -> Result<FacilityCredentials, IngestError> {
        let row = self
            .directory
            .active_facilities()
            .await?
            .into_iter()
            .find(|row| row.facility_code == facility_code)
            .ok_or_else(|| IngestError::FacilityNotFound(facility_code.to_string()))?;

        let (Some(username_enc), Some(password_enc), Some(metadata)) =
            (&row.username_enc, &row.password_enc, &row.crypto_meta)
        else {
            return Err(IngestError::crypto(format!("facility {facility_code} has no sealed credentials")));
        };
        let credentials = self
            .cipher
            .decrypt_credentials(facility_code, username_enc, password_enc, metadata)?;

        Ok(FacilityCredentials {
            facility_code: row.facility_code,
            endpoint_url: row.endpoint_url,
            credentials,
        })
    }
}

#[async_trait]
impl Acker for DhpoAcker {
    async fn ack(&self, item: &WorkItem, report: &FileReport) -> Result<(), IngestError> {
        let SourceHandle::Dhpo { facility_code } = &item.source else {
            return Ok(());
        };

        // Ack only fully verified files (ack-only-on-verify-ok policy).
        if !report.verify_ok() {
            return Ok(());
        }

        if !self.toggles.is_enabled(codes::DHPO_SET_DOWNLOADED_ENABLED, true).await? {
            debug!(file_id = %item.file_id, "setDownloaded disabled by toggle, skipping ack");
            return Ok(());
        }

        // The registry memoized the owning facility at download time; the
        // source handle is the fallback for replays across restarts.
        let facility_code = self.registry.take(&item.file_id).unwrap_or_else(|| facility_code.clone());
        let facility = self.facility_credentials(&facility_code).await?;

        let (code, message) = self.gateway.set_transaction_downloaded(&facility, &item.file_id).await?;
        if code.is_success() {
            info!(file_id = %item.file_id, facility = %facility_code, "acknowledged download");
            Ok(())
        } else {
            Err(IngestError::Ack(format!(
                "SetTransactionDownloaded({}) returned {code}: {}",
                item.file_id,
                message.unwrap_or_default()
            )))
        }
    }
}
