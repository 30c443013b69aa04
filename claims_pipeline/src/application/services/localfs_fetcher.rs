// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Local Filesystem Fetch Adapter
//!
//! Watches the drop zone with a periodic sweep. Files are claimed by rename
//! into the `in_progress/` subdirectory, which is atomic on a single
//! filesystem — two sweepers can never both own a file. After the pipeline
//! finishes, the companion [`LocalFsAcker`] moves the claimed file to
//! `processed/` (verify-ok), deletes it (duplicate), or moves it to
//! `error/` with a sidecar reason file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use claims_pipeline_domain::value_objects::safe_file_name::{derive_file_id, is_safe_name};
use claims_pipeline_domain::value_objects::staged_payload::StagedPayload;
use claims_pipeline_domain::{IngestError, SourceHandle, WorkItem};

use crate::application::services::orchestrator::Orchestrator;
use crate::application::services::pipeline::{Acker, FileReport};
use crate::infrastructure::config::LocalFsConfig;

const IN_PROGRESS_DIR: &str = "in_progress";

pub struct LocalFsFetcher {
    config: LocalFsConfig,
}

impl LocalFsFetcher {
    pub fn new(config: LocalFsConfig) -> Self {
        Self { config }
    }

    fn in_progress_dir(&self) -> PathBuf {
        self.config.ready_dir.join(IN_PROGRESS_DIR)
    }

    /// Creates the drop zone directory structure.
    pub async fn ensure_dirs(&self) -> Result<(), IngestError> {
        for dir in [
            self.config.ready_dir.clone(),
            self.in_progress_dir(),
            self.config.processed_dir.clone(),
            self.config.error_dir.clone(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| IngestError::io(format!("cannot create {}: {e}", dir.display())))?;
        }
        Ok(())
    }

    /// One sweep: claim up to `max` ready files and build work items.
    pub async fn claim_ready_files(&self, max: usize) -> Result<Vec<WorkItem>, IngestError> {
        if max == 0 {
            return Ok(Vec::new());
        }
        self.ensure_dirs().await?;

        let mut entries = tokio::fs::read_dir(&self.config.ready_dir)
            .await
            .map_err(|e| IngestError::io(format!("cannot read drop zone: {e}")))?;

        let mut items = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| IngestError::io(format!("drop zone listing failed: {e}")))?
        {
            if items.len() >= max {
                break;
            }
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            if name.starts_with('.') || !name.to_ascii_lowercase().ends_with(".xml") {
                continue;
            }

            let claimed_path = self.in_progress_dir().join(&name);
            // Claim by rename; losing the race to a sibling sweeper is fine.
            if let Err(e) = tokio::fs::rename(&path, &claimed_path).await {
                debug!(file = %name, "claim rename failed (another sweeper?): {e}");
                continue;
            }

            let file_id = if is_safe_name(&name) {
                name.clone()
            } else {
                let bytes = tokio::fs::read(&claimed_path)
                    .await
                    .map_err(|e| IngestError::io(format!("cannot read claimed file {name}: {e}")))?;
                derive_file_id(None, &bytes)
            };

            debug!(file = %name, file_id = %file_id, "claimed drop-zone file");
            items.push(WorkItem::new(
                file_id,
                name,
                StagedPayload::Disk(claimed_path.clone()),
                SourceHandle::LocalFs { claimed_path },
            ));
        }

        Ok(items)
    }

    /// One scheduler tick: claim as much as the queue has room for.
    pub async fn tick(&self, orchestrator: &Orchestrator) -> Result<(), IngestError> {
        let headroom = orchestrator.queue_available();
        if headroom == 0 {
            debug!("work queue full, skipping drop-zone sweep");
            return Ok(());
        }

        let items = self.claim_ready_files(headroom).await?;
        if items.is_empty() {
            return Ok(());
        }
        info!(count = items.len(), "submitting drop-zone files");

        for item in items {
            let source = item.source.clone();
            if let Err(e) = orchestrator.submit(item) {
                // Backpressure or shutdown: release the claim so the next
                // sweep picks the file up again.
                if let SourceHandle::LocalFs { claimed_path } = &source {
                    release_claim(&self.config.ready_dir, claimed_path).await;
                }
                warn!("submit failed, released claim: {e}");
                if matches!(e, IngestError::QueueFull) {
                    break;
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

async fn release_claim(ready_dir: &Path, claimed_path: &Path) {
    if let Some(name) = claimed_path.file_name() {
        let back = ready_dir.join(name);
        if let Err(e) = tokio::fs::rename(claimed_path, &back).await {
            warn!("failed to release claim {}: {e}", claimed_path.display());
        }
    }
}

/// Moves claimed files to their terminal directory after the pipeline ran.
pub struct LocalFsAcker {
    config: LocalFsConfig,
}

impl LocalFsAcker {
    pub fn new(config: LocalFsConfig) -> Self {
        Self { config }
    }

    async fn move_to(&self, claimed_path: &Path, dir: &Path, name: &str) -> Result<PathBuf, IngestError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| IngestError::io(format!("cannot create {}: {e}", dir.display())))?;
        let target = dir.join(name);
        tokio::fs::rename(claimed_path, &target)
            .await
            .map_err(|e| IngestError::io(format!("cannot move {} to {}: {e}", claimed_path.display(), target.display())))?;
        Ok(target)
    }
}

#[async_trait]
impl Acker for LocalFsAcker {
    async fn ack(&self, item: &WorkItem, report: &FileReport) -> Result<(), IngestError> {
        let SourceHandle::LocalFs { claimed_path } = &item.source else {
            return Ok(());
        };

        if report.duplicate {
            // Already ingested and verified; discard the duplicate delivery.
            tokio::fs::remove_file(claimed_path)
                .await
                .map_err(|e| IngestError::io(format!("cannot discard duplicate {}: {e}", claimed_path.display())))?;
            return Ok(());
        }

        if report.succeeded() && report.verify_ok() {
            self.move_to(claimed_path, &self.config.processed_dir, &item.file_name).await?;
            return Ok(());
        }

        let target = self.move_to(claimed_path, &self.config.error_dir, &item.file_name).await?;
        let reason = format!(
            "stage: {}\nerror: {}\n",
            report.failed_stage.map(|s| s.as_str()).unwrap_or("VERIFY"),
            report.error.as_deref().unwrap_or_else(|| {
                report
                    .verify
                    .as_ref()
                    .and_then(|v| v.discrepancies.first().map(String::as_str))
                    .unwrap_or("verification failed")
            }),
        );
        let sidecar = target.with_file_name(format!("{}.reason.txt", item.file_name));
        tokio::fs::write(&sidecar, reason)
            .await
            .map_err(|e| IngestError::io(format!("cannot write sidecar {}: {e}", sidecar.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims_pipeline_domain::entities::VerifyReport;

    fn config(root: &Path) -> LocalFsConfig {
        LocalFsConfig {
            ready_dir: root.join("ready"),
            processed_dir: root.join("processed"),
            error_dir: root.join("error"),
            sweep_interval_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn claims_only_plain_xml_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let fetcher = LocalFsFetcher::new(config.clone());
        fetcher.ensure_dirs().await.unwrap();

        std::fs::write(config.ready_dir.join("sub-1.xml"), b"<x/>").unwrap();
        std::fs::write(config.ready_dir.join("notes.txt"), b"skip me").unwrap();
        std::fs::write(config.ready_dir.join(".hidden.xml"), b"skip me").unwrap();

        let items = fetcher.claim_ready_files(10).await.unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.file_id, "sub-1.xml");
        assert!(matches!(&item.source, SourceHandle::LocalFs { claimed_path } if claimed_path.exists()));
        // The file left the drop zone root.
        assert!(!config.ready_dir.join("sub-1.xml").exists());
    }

    #[tokio::test]
    async fn claim_respects_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let fetcher = LocalFsFetcher::new(config.clone());
        fetcher.ensure_dirs().await.unwrap();

        for i in 0..5 {
            std::fs::write(config.ready_dir.join(format!("f{i}.xml")), b"<x/>").unwrap();
        }
        let items = fetcher.claim_ready_files(2).await.unwrap();
        assert_eq!(items.len(), 2);
        // The unclaimed files stay in the ready dir for the next sweep.
        let remaining = std::fs::read_dir(&config.ready_dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().is_file())
            .count();
        assert_eq!(remaining, 3);
    }

    fn claimed_item(config: &LocalFsConfig, name: &str, bytes: &[u8]) -> WorkItem {
        let claimed = config.ready_dir.join(IN_PROGRESS_DIR).join(name);
        std::fs::create_dir_all(claimed.parent().unwrap()).unwrap();
        std::fs::write(&claimed, bytes).unwrap();
        WorkItem::new(
            name,
            name,
            StagedPayload::Disk(claimed.clone()),
            SourceHandle::LocalFs { claimed_path: claimed },
        )
    }

    #[tokio::test]
    async fn verified_files_move_to_processed() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let acker = LocalFsAcker::new(config.clone());
        let item = claimed_item(&config, "ok.xml", b"<x/>");

        let report = FileReport {
            file_id: "ok.xml".into(),
            verify: Some(VerifyReport::passed()),
            ..FileReport::default()
        };
        acker.ack(&item, &report).await.unwrap();

        assert!(config.processed_dir.join("ok.xml").exists());
    }

    #[tokio::test]
    async fn failed_files_move_to_error_with_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let acker = LocalFsAcker::new(config.clone());
        let item = claimed_item(&config, "bad.xml", b"not-xml");

        let report = FileReport {
            file_id: "bad.xml".into(),
            failed_stage: Some(claims_pipeline_domain::PipelineStage::Parse),
            error: Some("MALFORMED_XML at FILE: oops".into()),
            ..FileReport::default()
        };
        acker.ack(&item, &report).await.unwrap();

        assert!(config.error_dir.join("bad.xml").exists());
        let sidecar = std::fs::read_to_string(config.error_dir.join("bad.xml.reason.txt")).unwrap();
        assert!(sidecar.contains("PARSE"));
        assert!(sidecar.contains("MALFORMED_XML"));
    }

    #[tokio::test]
    async fn duplicates_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let acker = LocalFsAcker::new(config.clone());
        let item = claimed_item(&config, "dup.xml", b"<x/>");

        let report = FileReport {
            file_id: "dup.xml".into(),
            duplicate: true,
            ..FileReport::default()
        };
        acker.ack(&item, &report).await.unwrap();

        assert!(!config.ready_dir.join(IN_PROGRESS_DIR).join("dup.xml").exists());
        assert!(!config.processed_dir.join("dup.xml").exists());
        assert!(!config.error_dir.join("dup.xml").exists());
    }
}
