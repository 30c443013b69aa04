// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Facility Directory Port
//!
//! Access to per-facility DHPO configuration: endpoint URLs and the
//! AES-GCM-sealed credential pair with its metadata envelope. The rotation
//! job uses `update_credentials` to atomically replace both blobs and the
//! metadata in one statement.

use async_trait::async_trait;

use crate::services::credential_cipher::{CryptoMetadata, EncryptedField};
use crate::IngestError;

/// One `claims_facility_config` row.
#[derive(Debug, Clone)]
pub struct FacilityConfigRow {
    pub id: i64,
    pub facility_code: String,
    pub endpoint_url: String,
    pub username_enc: Option<EncryptedField>,
    pub password_enc: Option<EncryptedField>,
    pub crypto_meta: Option<CryptoMetadata>,
    pub active: bool,
}

#[async_trait]
pub trait FacilityDirectory: Send + Sync {
    /// All facilities with `active = 1`, in stable order.
    async fn active_facilities(&self) -> Result<Vec<FacilityConfigRow>, IngestError>;

    /// All facilities regardless of the active flag (rotation scans these).
    async fn all_facilities(&self) -> Result<Vec<FacilityConfigRow>, IngestError>;

    /// Atomically replaces the credential blobs and metadata for one row.
    async fn update_credentials(
        &self,
        facility_id: i64,
        username_enc: &EncryptedField,
        password_enc: &EncryptedField,
        metadata: &CryptoMetadata,
    ) -> Result<(), IngestError>;
}
