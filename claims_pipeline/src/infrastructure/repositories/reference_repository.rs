// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Reference Resolver (SQLite)
//!
//! Upsert-or-lookup of master codes with first-sight discovery auditing.
//!
//! Resolution order per lookup:
//!
//! 1. short-circuit to `None` when reference bootstrap is disabled;
//! 2. find by natural key (one round trip, the hot path);
//! 3. on miss, append the discovery-audit row (`ON CONFLICT DO NOTHING`
//!    keeps it exactly-once under concurrent first sight);
//! 4. when auto-insert is enabled, upsert the reference row with
//!    `ON CONFLICT ... DO UPDATE ... RETURNING id` so two workers racing on
//!    the same new code both get the one id back in a single statement.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use claims_pipeline_domain::services::{CodeKind, DiscoveryContext, ReferenceResolver};
use claims_pipeline_domain::IngestError;

use crate::infrastructure::config::RefDataConfig;
use crate::infrastructure::repositories::ingestion_repository::db_err;

/// Column layout of one reference table.
struct RefTable {
    table: &'static str,
    code_column: &'static str,
    has_code_system: bool,
}

fn table_for(kind: CodeKind) -> RefTable {
    match kind {
        CodeKind::Payer => RefTable {
            table: "ref_payer",
            code_column: "payer_code",
            has_code_system: false,
        },
        CodeKind::Provider => RefTable {
            table: "ref_provider",
            code_column: "provider_code",
            has_code_system: false,
        },
        CodeKind::Facility => RefTable {
            table: "ref_facility",
            code_column: "facility_code",
            has_code_system: false,
        },
        CodeKind::Clinician => RefTable {
            table: "ref_clinician",
            code_column: "clinician_code",
            has_code_system: false,
        },
        CodeKind::ActivityCode => RefTable {
            table: "ref_activity_code",
            code_column: "code",
            has_code_system: true,
        },
        CodeKind::DiagnosisCode => RefTable {
            table: "ref_diagnosis_code",
            code_column: "code",
            has_code_system: true,
        },
        CodeKind::DenialCode => RefTable {
            table: "ref_denial_code",
            code_column: "code",
            has_code_system: false,
        },
    }
}

pub struct SqliteReferenceResolver {
    pool: SqlitePool,
    config: RefDataConfig,
}

impl SqliteReferenceResolver {
    pub fn new(pool: SqlitePool, config: RefDataConfig) -> Self {
        Self { pool, config }
    }

    async fn find_existing(&self, spec: &RefTable, code: &str, code_system: &str) -> Result<Option<i64>, IngestError> {
        let sql = if spec.has_code_system {
            format!(
                "SELECT id FROM {} WHERE {} = ?1 AND code_system = ?2",
                spec.table, spec.code_column
            )
        } else {
            format!("SELECT id FROM {} WHERE {} = ?1", spec.table, spec.code_column)
        };

        let mut query = sqlx::query_scalar(&sql).bind(code);
        if spec.has_code_system {
            query = query.bind(code_system);
        }
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("reference lookup", e))
    }

    async fn write_audit(
        &self,
        spec: &RefTable,
        code: &str,
        code_system: &str,
        ctx: &DiscoveryContext,
    ) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO ref_code_discovery_audit \
             (source_table, code, code_system, discovered_by, ingestion_file_id, claim_external_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT (source_table, code, code_system) DO NOTHING",
        )
        .bind(spec.table)
        .bind(code)
        .bind(code_system)
        .bind(ctx.discovered_by)
        .bind(ctx.ingestion_file_id)
        .bind(&ctx.claim_external_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("discovery audit", e))?;
        Ok(())
    }

    async fn upsert_returning(&self, spec: &RefTable, code: &str, code_system: &str) -> Result<i64, IngestError> {
        // The no-op DO UPDATE guarantees RETURNING yields a row whether the
        // insert won the race or lost it.
        let sql = if spec.has_code_system {
            format!(
                "INSERT INTO {table} ({code_col}, code_system) VALUES (?1, ?2) \
                 ON CONFLICT ({code_col}, code_system) DO UPDATE SET {code_col} = excluded.{code_col} \
                 RETURNING id",
                table = spec.table,
                code_col = spec.code_column,
            )
        } else {
            format!(
                "INSERT INTO {table} ({code_col}) VALUES (?1) \
                 ON CONFLICT ({code_col}) DO UPDATE SET {code_col} = excluded.{code_col} \
                 RETURNING id",
                table = spec.table,
                code_col = spec.code_column,
            )
        };

        let mut query = sqlx::query_scalar(&sql).bind(code);
        if spec.has_code_system {
            query = query.bind(code_system);
        }
        query.fetch_one(&self.pool).await.map_err(|e| db_err("reference upsert", e))
    }
}

#[async_trait]
impl ReferenceResolver for SqliteReferenceResolver {
    async fn resolve(
        &self,
        kind: CodeKind,
        code: &str,
        code_system: Option<&str>,
        ctx: &DiscoveryContext,
    ) -> Result<Option<i64>, IngestError> {
        if !self.config.bootstrap_enabled {
            return Ok(None);
        }

        let spec = table_for(kind);
        let code_system = code_system.unwrap_or("");

        if let Some(id) = self.find_existing(&spec, code, code_system).await? {
            return Ok(Some(id));
        }

        // First sight: always audited, inserted only when configured.
        self.write_audit(&spec, code, code_system, ctx).await?;

        if self.config.auto_insert {
            let id = self.upsert_returning(&spec, code, code_system).await?;
            debug!(table = spec.table, code, "auto-inserted reference code");
            Ok(Some(id))
        } else {
            Ok(None)
        }
    }
}
