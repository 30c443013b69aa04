// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Credential Rotation Job
//!
//! Scans facility rows whose metadata key id differs from the active key,
//! decrypts each credential pair with its in-row metadata (the retired key
//! stays in the keyring for exactly this), re-encrypts under the active
//! key, and atomically replaces the blobs and metadata. A row that cannot
//! be opened is reported and left untouched; the job continues with the
//! rest.

use std::sync::Arc;
use tracing::{error, info};

use claims_pipeline_domain::repositories::FacilityDirectory;
use claims_pipeline_domain::services::CredentialCipher;
use claims_pipeline_domain::IngestError;

/// Outcome of one rotation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub scanned: usize,
    pub rotated: usize,
    pub failed: usize,
    pub already_current: usize,
}

pub struct ReencryptJob {
    directory: Arc<dyn FacilityDirectory>,
    cipher: Arc<dyn CredentialCipher>,
}

impl ReencryptJob {
    pub fn new(directory: Arc<dyn FacilityDirectory>, cipher: Arc<dyn CredentialCipher>) -> Self {
        Self { directory, cipher }
    }

    /// One full sweep over all facility rows.
    pub async fn run(&self) -> Result<RotationReport, IngestError> {
        let active_key_id = self.cipher.active_key_id().to_string();
        let rows = self.directory.all_facilities().await?;

        let mut report = RotationReport {
            scanned: rows.len(),
            ..RotationReport::default()
        };

        for row in rows {
            let (Some(username_enc), Some(password_enc), Some(metadata)) =
                (&row.username_enc, &row.password_enc, &row.crypto_meta)
            else {
                // Rows without sealed credentials have nothing to rotate.
                report.already_current += 1;
                continue;
            };

            if metadata.key_id == active_key_id {
                report.already_current += 1;
                continue;
            }

            let result = async {
                let plain = self
                    .cipher
                    .decrypt_credentials(&row.facility_code, username_enc, password_enc, metadata)?;
                let (new_user, new_pwd, new_meta) = self.cipher.encrypt_credentials(&row.facility_code, &plain)?;
                self.directory.update_credentials(row.id, &new_user, &new_pwd, &new_meta).await
            }
            .await;

            match result {
                Ok(()) => {
                    info!(facility = %row.facility_code, from = %metadata.key_id, to = %active_key_id, "credentials rotated");
                    report.rotated += 1;
                }
                Err(e) => {
                    error!(facility = %row.facility_code, "rotation failed, row left untouched: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            rotated = report.rotated,
            failed = report.failed,
            current = report.already_current,
            "rotation sweep complete"
        );
        Ok(report)
    }
}
