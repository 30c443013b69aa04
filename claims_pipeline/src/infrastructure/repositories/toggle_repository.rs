// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Toggle Store (SQLite)
//!
//! Integration toggles from the `claims_integration_toggle` key/value table.
//! Reads degrade to the caller's fallback on any failure so a flaky database
//! can never stall scheduling.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::warn;

use claims_pipeline_domain::services::ToggleStore;
use claims_pipeline_domain::IngestError;

pub struct SqliteToggleStore {
    pool: SqlitePool,
}

impl SqliteToggleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Sets a toggle; used by operational tooling and tests.
    pub async fn set_enabled(&self, code: &str, enabled: bool) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO claims_integration_toggle (code, enabled) VALUES (?1, ?2) \
             ON CONFLICT (code) DO UPDATE SET enabled = excluded.enabled, \
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        )
        .bind(code)
        .bind(enabled as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::database(format!("toggle update: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ToggleStore for SqliteToggleStore {
    async fn is_enabled(&self, code: &str, default: bool) -> Result<bool, IngestError> {
        let result: Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT enabled FROM claims_integration_toggle WHERE code = ?1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await;

        match result {
            Ok(Some(enabled)) => Ok(enabled != 0),
            Ok(None) => Ok(default),
            Err(e) => {
                warn!(code, "toggle read failed, using default {default}: {e}");
                Ok(default)
            }
        }
    }
}
