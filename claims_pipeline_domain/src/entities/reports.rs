// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Per-file persistence and verification summaries returned by the
//! persister and verifier stages.

use serde::{Deserialize, Serialize};

/// Outcome of persisting one document's claim graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistSummary {
    /// Internal id of the `claims_ingestion_file` row.
    pub ingestion_file_id: i64,
    pub claims_persisted: u64,
    pub claims_skipped: u64,
    pub activities_persisted: u64,
    pub events_written: u64,
}

impl PersistSummary {
    pub fn new(ingestion_file_id: i64) -> Self {
        Self {
            ingestion_file_id,
            ..Self::default()
        }
    }
}

/// Outcome of the post-persist integrity check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// All checks passed.
    pub ok: bool,
    /// The file shell itself was persisted and is readable.
    pub file_persisted_ok: bool,
    /// Human-readable description of each mismatch.
    pub discrepancies: Vec<String>,
}

impl VerifyReport {
    pub fn passed() -> Self {
        Self {
            ok: true,
            file_persisted_ok: true,
            discrepancies: Vec::new(),
        }
    }

    pub fn failed(file_persisted_ok: bool, discrepancies: Vec<String>) -> Self {
        Self {
            ok: false,
            file_persisted_ok,
            discrepancies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passed_report_has_no_discrepancies() {
        let report = VerifyReport::passed();
        assert!(report.ok);
        assert!(report.file_persisted_ok);
        assert!(report.discrepancies.is_empty());
    }

    #[test]
    fn failed_report_carries_discrepancies() {
        let report = VerifyReport::failed(true, vec!["declared 2 claims, persisted 1".to_string()]);
        assert!(!report.ok);
        assert!(report.file_persisted_ok);
        assert_eq!(report.discrepancies.len(), 1);
    }
}
