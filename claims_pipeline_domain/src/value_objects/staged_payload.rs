// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Staged Payload
//!
//! Intermediate placement of downloaded bytes before pipeline entry. Small,
//! quickly-downloaded payloads stay in memory; large or slow downloads are
//! written to the staging directory and carried by path. The pipeline treats
//! both uniformly through [`StagedPayload::read_bytes`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::IngestError;

/// Staged document bytes, either resident or spilled to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagedPayload {
    /// Bytes held in memory.
    Memory(Vec<u8>),
    /// Bytes staged under the ready directory; the file was placed with an
    /// atomic rename so readers never observe a partial write.
    Disk(PathBuf),
}

impl StagedPayload {
    /// Size in bytes for memory payloads; `None` for disk payloads (the
    /// staging service already applied the size policy before spilling).
    pub fn in_memory_len(&self) -> Option<usize> {
        match self {
            StagedPayload::Memory(bytes) => Some(bytes.len()),
            StagedPayload::Disk(_) => None,
        }
    }

    pub fn is_disk(&self) -> bool {
        matches!(self, StagedPayload::Disk(_))
    }

    /// Materializes the payload. Memory payloads are returned as-is; disk
    /// payloads are read from the staged path.
    pub fn read_bytes(&self) -> Result<Vec<u8>, IngestError> {
        match self {
            StagedPayload::Memory(bytes) => Ok(bytes.clone()),
            StagedPayload::Disk(path) => std::fs::read(path)
                .map_err(|e| IngestError::staging(format!("failed to read staged file {}: {e}", path.display()))),
        }
    }
}
