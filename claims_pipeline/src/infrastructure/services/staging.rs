// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Staging Service
//!
//! Decides where downloaded bytes live before pipeline entry. Small, fast
//! downloads stay in memory; anything matching the disk policy (forced,
//! oversized, or slow to fetch) is written to the ready directory as
//! `<id>.tmp`, fsynced, and atomically renamed to `<id>` so concurrent
//! sweepers never observe a partial file.

use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use claims_pipeline_domain::value_objects::staged_payload::StagedPayload;
use claims_pipeline_domain::IngestError;

use crate::infrastructure::config::StagingConfig;

pub struct StagingService {
    config: StagingConfig,
}

impl StagingService {
    pub fn new(config: StagingConfig) -> Self {
        Self { config }
    }

    /// Whether this payload goes to disk under the configured policy.
    pub fn should_stage_to_disk(&self, payload_len: u64, download_millis: u64) -> bool {
        self.config.force_disk
            || payload_len >= self.config.size_threshold_bytes
            || download_millis >= self.config.latency_threshold_ms
    }

    /// Stages one payload, returning where it ended up.
    pub async fn stage(
        &self,
        file_id: &str,
        bytes: Vec<u8>,
        download_millis: u64,
    ) -> Result<StagedPayload, IngestError> {
        if !self.should_stage_to_disk(bytes.len() as u64, download_millis) {
            debug!(file_id, size = bytes.len(), "staging in memory");
            return Ok(StagedPayload::Memory(bytes));
        }

        let final_path = self.stage_path(file_id);
        let tmp_path = self.config.ready_dir.join(format!("{file_id}.tmp"));

        tokio::fs::create_dir_all(&self.config.ready_dir)
            .await
            .map_err(|e| IngestError::staging(format!("cannot create ready dir {}: {e}", self.config.ready_dir.display())))?;

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| IngestError::staging(format!("cannot create {}: {e}", tmp_path.display())))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| IngestError::staging(format!("cannot write {}: {e}", tmp_path.display())))?;
        file.sync_all()
            .await
            .map_err(|e| IngestError::staging(format!("cannot fsync {}: {e}", tmp_path.display())))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| IngestError::staging(format!("cannot rename staged file into place: {e}")))?;

        debug!(file_id, path = %final_path.display(), size = bytes.len(), "staged to disk");
        Ok(StagedPayload::Disk(final_path))
    }

    fn stage_path(&self, file_id: &str) -> PathBuf {
        self.config.ready_dir.join(file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(force_disk: bool, ready_dir: PathBuf) -> StagingConfig {
        StagingConfig {
            force_disk,
            size_threshold_bytes: 1024,
            latency_threshold_ms: 5_000,
            ready_dir,
        }
    }

    #[test]
    fn policy_matrix() {
        let staging = StagingService::new(config(false, PathBuf::from("unused")));
        // Small and fast: memory.
        assert!(!staging.should_stage_to_disk(10, 10));
        // Oversized: disk.
        assert!(staging.should_stage_to_disk(4096, 10));
        // Slow download: disk.
        assert!(staging.should_stage_to_disk(10, 9_000));

        let forced = StagingService::new(config(true, PathBuf::from("unused")));
        assert!(forced.should_stage_to_disk(1, 1));
    }

    #[tokio::test]
    async fn small_payloads_stay_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingService::new(config(false, dir.path().to_path_buf()));

        let staged = staging.stage("f1.xml", b"<x/>".to_vec(), 10).await.unwrap();
        assert_eq!(staged, StagedPayload::Memory(b"<x/>".to_vec()));
        // Nothing touched the ready dir.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn disk_staging_renames_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingService::new(config(true, dir.path().to_path_buf()));

        let staged = staging.stage("f2.xml", b"<doc/>".to_vec(), 10).await.unwrap();
        let StagedPayload::Disk(path) = staged else {
            panic!("expected disk staging");
        };
        assert_eq!(path, dir.path().join("f2.xml"));
        assert_eq!(std::fs::read(&path).unwrap(), b"<doc/>");
        // No leftover temp file.
        assert!(!dir.path().join("f2.xml.tmp").exists());
        assert!(!dir.path().join("f2.tmp").exists());
    }

    #[tokio::test]
    async fn ready_dir_is_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deep/ready");
        let staging = StagingService::new(config(true, nested.clone()));

        staging.stage("f3.xml", vec![0u8; 2048], 0).await.unwrap();
        assert!(nested.join("f3.xml").exists());
    }
}
