// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Work Item
//!
//! The unit of work flowing from fetch adapters through the orchestrator's
//! bounded queue into the pipeline. A work item carries the external file
//! identity, the staged payload, and a handle describing where the file came
//! from (which also determines the acknowledgement behavior after verify).

use ulid::Ulid;

use crate::value_objects::staged_payload::StagedPayload;

/// Where a work item originated.
///
/// Localfs items are acknowledged by moving the file out of the drop zone;
/// DHPO items are acknowledged by calling `SetTransactionDownloaded` against
/// the owning facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceHandle {
    /// Claimed file in the drop zone's `in_progress/` directory.
    LocalFs { claimed_path: std::path::PathBuf },
    /// Download from the DHPO service on behalf of a facility.
    Dhpo { facility_code: String },
}

impl SourceHandle {
    pub fn is_remote(&self) -> bool {
        matches!(self, SourceHandle::Dhpo { .. })
    }
}

/// One file queued for ingestion.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Correlation id for logs and run accounting.
    pub correlation_id: Ulid,
    /// External file identity (unique in `claims_ingestion_file.file_id`).
    pub file_id: String,
    /// Original file name as reported by the source.
    pub file_name: String,
    /// Staged document bytes (in memory or on disk).
    pub payload: StagedPayload,
    /// Origin of the file.
    pub source: SourceHandle,
}

impl WorkItem {
    pub fn new(file_id: impl Into<String>, file_name: impl Into<String>, payload: StagedPayload, source: SourceHandle) -> Self {
        Self {
            correlation_id: Ulid::new(),
            file_id: file_id.into(),
            file_name: file_name.into(),
            payload,
            source,
        }
    }
}
