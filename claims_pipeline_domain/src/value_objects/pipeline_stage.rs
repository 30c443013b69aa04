// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Stage and Error Object Taxonomy
//!
//! Every recorded ingestion error names the stage that produced it and the
//! class of object it concerns. Both enums render to the stable uppercase
//! strings stored in `claims_ingestion_error`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The ordered stages a work item passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Register,
    Parse,
    Validate,
    Persist,
    Verify,
    Ack,
    Fetch,
}

impl PipelineStage {
    /// Stable string stored in error records.
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Register => "REGISTER",
            PipelineStage::Parse => "PARSE",
            PipelineStage::Validate => "VALIDATE",
            PipelineStage::Persist => "PERSIST",
            PipelineStage::Verify => "VERIFY",
            PipelineStage::Ack => "ACK",
            PipelineStage::Fetch => "FETCH",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class of object an error record points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorObjectType {
    File,
    Header,
    Claim,
    Encounter,
    Diagnosis,
    Activity,
    Observation,
    Resubmission,
    Attachment,
    RemittanceClaim,
    RemittanceActivity,
    Facility,
}

impl ErrorObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorObjectType::File => "FILE",
            ErrorObjectType::Header => "HEADER",
            ErrorObjectType::Claim => "CLAIM",
            ErrorObjectType::Encounter => "ENCOUNTER",
            ErrorObjectType::Diagnosis => "DIAGNOSIS",
            ErrorObjectType::Activity => "ACTIVITY",
            ErrorObjectType::Observation => "OBSERVATION",
            ErrorObjectType::Resubmission => "RESUBMISSION",
            ErrorObjectType::Attachment => "ATTACHMENT",
            ErrorObjectType::RemittanceClaim => "REMITTANCE_CLAIM",
            ErrorObjectType::RemittanceActivity => "REMITTANCE_ACTIVITY",
            ErrorObjectType::Facility => "FACILITY",
        }
    }
}

impl fmt::Display for ErrorObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
