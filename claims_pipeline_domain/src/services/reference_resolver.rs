// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Reference Resolution Port
//!
//! Resolves external master codes (payer, provider, facility, clinician,
//! activity, diagnosis, denial) to reference-table ids during ingestion.
//! Every first sight of a code writes a discovery-audit row; whether the
//! code is also auto-inserted into the reference table is a configuration
//! decision, not the caller's.
//!
//! Callers always tolerate `None`: when a code cannot be resolved the raw
//! string column is persisted and the ref id stays unset.

use async_trait::async_trait;
use std::fmt;

use crate::IngestError;

/// Which reference table a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeKind {
    Payer,
    Provider,
    Facility,
    Clinician,
    ActivityCode,
    DiagnosisCode,
    DenialCode,
}

impl CodeKind {
    /// Name of the backing reference table, recorded in the discovery audit.
    pub fn source_table(self) -> &'static str {
        match self {
            CodeKind::Payer => "ref_payer",
            CodeKind::Provider => "ref_provider",
            CodeKind::Facility => "ref_facility",
            CodeKind::Clinician => "ref_clinician",
            CodeKind::ActivityCode => "ref_activity_code",
            CodeKind::DiagnosisCode => "ref_diagnosis_code",
            CodeKind::DenialCode => "ref_denial_code",
        }
    }
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_table())
    }
}

/// Where a code was first seen, for the audit trail.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryContext {
    /// Internal id of the file being ingested.
    pub ingestion_file_id: Option<i64>,
    /// Business id of the claim the code appeared in.
    pub claim_external_id: Option<String>,
    /// Logical actor, e.g. `"ingestion"`.
    pub discovered_by: &'static str,
}

impl DiscoveryContext {
    pub fn ingestion(ingestion_file_id: i64, claim_external_id: Option<String>) -> Self {
        Self {
            ingestion_file_id: Some(ingestion_file_id),
            claim_external_id,
            discovered_by: "ingestion",
        }
    }
}

/// Upsert-or-lookup of master codes with discovery auditing.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Resolves `code` (optionally qualified by `code_system`) to a
    /// reference id.
    ///
    /// Returns `Ok(None)` when the code is unknown and auto-insert is
    /// disabled, or when reference bootstrap is disabled entirely. Must be
    /// safe under concurrent first sight of the same code.
    async fn resolve(
        &self,
        kind: CodeKind,
        code: &str,
        code_system: Option<&str>,
        ctx: &DiscoveryContext,
    ) -> Result<Option<i64>, IngestError>;

    /// Convenience wrapper tolerating absent codes.
    async fn resolve_opt(
        &self,
        kind: CodeKind,
        code: Option<&str>,
        code_system: Option<&str>,
        ctx: &DiscoveryContext,
    ) -> Result<Option<i64>, IngestError> {
        match code {
            Some(c) if !c.trim().is_empty() => self.resolve(kind, c.trim(), code_system, ctx).await,
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_kind_maps_to_source_table() {
        assert_eq!(CodeKind::Payer.source_table(), "ref_payer");
        assert_eq!(CodeKind::DiagnosisCode.source_table(), "ref_diagnosis_code");
        assert_eq!(CodeKind::DenialCode.to_string(), "ref_denial_code");
    }

    #[test]
    fn ingestion_context_sets_actor() {
        let ctx = DiscoveryContext::ingestion(7, Some("C-1".into()));
        assert_eq!(ctx.ingestion_file_id, Some(7));
        assert_eq!(ctx.discovered_by, "ingestion");
    }
}
