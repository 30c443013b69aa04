// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Facility Directory (SQLite)
//!
//! Per-facility DHPO configuration rows. The credential blobs hold GCM
//! ciphertext only; the per-field IVs, key id, and tag size travel in the
//! JSON metadata column, which is what lets the rotation job decrypt rows
//! sealed under a retired key.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use claims_pipeline_domain::repositories::{FacilityConfigRow, FacilityDirectory};
use claims_pipeline_domain::services::{CryptoMetadata, EncryptedField};
use claims_pipeline_domain::IngestError;

use crate::infrastructure::repositories::ingestion_repository::db_err;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

pub struct SqliteFacilityDirectory {
    pool: SqlitePool,
}

impl SqliteFacilityDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces one facility's configuration.
    pub async fn upsert_facility(
        &self,
        facility_code: &str,
        endpoint_url: &str,
        username_enc: &EncryptedField,
        password_enc: &EncryptedField,
        metadata: &CryptoMetadata,
        active: bool,
    ) -> Result<i64, IngestError> {
        let meta_json = serde_json::to_string(metadata)
            .map_err(|e| IngestError::internal(format!("crypto metadata serialization: {e}")))?;

        sqlx::query_scalar(
            "INSERT INTO claims_facility_config \
             (facility_code, endpoint_url, username_enc, password_enc, crypto_meta, active) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT (facility_code) DO UPDATE SET \
                endpoint_url = excluded.endpoint_url, \
                username_enc = excluded.username_enc, \
                password_enc = excluded.password_enc, \
                crypto_meta = excluded.crypto_meta, \
                active = excluded.active \
             RETURNING id",
        )
        .bind(facility_code)
        .bind(endpoint_url)
        .bind(&username_enc.ciphertext)
        .bind(&password_enc.ciphertext)
        .bind(meta_json)
        .bind(active as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("facility upsert", e))
    }

    fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<FacilityConfigRow, IngestError> {
        let crypto_meta: Option<String> = row.get("crypto_meta");
        let metadata: Option<CryptoMetadata> = crypto_meta
            .map(|raw| {
                serde_json::from_str(&raw)
                    .map_err(|e| IngestError::crypto(format!("facility crypto metadata is unreadable: {e}")))
            })
            .transpose()?;

        let username_blob: Option<Vec<u8>> = row.get("username_enc");
        let password_blob: Option<Vec<u8>> = row.get("password_enc");

        let (username_enc, password_enc) = match &metadata {
            Some(meta) => {
                let iv_login = BASE64
                    .decode(&meta.iv_login)
                    .map_err(|e| IngestError::crypto(format!("ivLogin is not base64: {e}")))?;
                let iv_pwd = BASE64
                    .decode(&meta.iv_pwd)
                    .map_err(|e| IngestError::crypto(format!("ivPwd is not base64: {e}")))?;
                (
                    username_blob.map(|ciphertext| EncryptedField {
                        iv: iv_login,
                        ciphertext,
                        tag_bits: meta.tag_bits,
                        key_id: meta.key_id.clone(),
                    }),
                    password_blob.map(|ciphertext| EncryptedField {
                        iv: iv_pwd,
                        ciphertext,
                        tag_bits: meta.tag_bits,
                        key_id: meta.key_id.clone(),
                    }),
                )
            }
            None => (None, None),
        };

        Ok(FacilityConfigRow {
            id: row.get("id"),
            facility_code: row.get("facility_code"),
            endpoint_url: row.get("endpoint_url"),
            username_enc,
            password_enc,
            crypto_meta: metadata,
            active: row.get::<i64, _>("active") != 0,
        })
    }

    async fn fetch(&self, only_active: bool) -> Result<Vec<FacilityConfigRow>, IngestError> {
        let sql = if only_active {
            "SELECT id, facility_code, endpoint_url, username_enc, password_enc, crypto_meta, active \
             FROM claims_facility_config WHERE active = 1 ORDER BY facility_code"
        } else {
            "SELECT id, facility_code, endpoint_url, username_enc, password_enc, crypto_meta, active \
             FROM claims_facility_config ORDER BY facility_code"
        };
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err("facility list", e))?;

        rows.iter().map(Self::row_to_config).collect()
    }
}

#[async_trait]
impl FacilityDirectory for SqliteFacilityDirectory {
    async fn active_facilities(&self) -> Result<Vec<FacilityConfigRow>, IngestError> {
        self.fetch(true).await
    }

    async fn all_facilities(&self) -> Result<Vec<FacilityConfigRow>, IngestError> {
        self.fetch(false).await
    }

    async fn update_credentials(
        &self,
        facility_id: i64,
        username_enc: &EncryptedField,
        password_enc: &EncryptedField,
        metadata: &CryptoMetadata,
    ) -> Result<(), IngestError> {
        let meta_json = serde_json::to_string(metadata)
            .map_err(|e| IngestError::internal(format!("crypto metadata serialization: {e}")))?;

        sqlx::query(
            "UPDATE claims_facility_config \
             SET username_enc = ?2, password_enc = ?3, crypto_meta = ?4 \
             WHERE id = ?1",
        )
        .bind(facility_id)
        .bind(&username_enc.ciphertext)
        .bind(&password_enc.ciphertext)
        .bind(meta_json)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("facility credential update", e))?;
        Ok(())
    }
}
