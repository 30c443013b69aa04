// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File Envelope
//!
//! One `claims_ingestion_file` row is the single source of truth for one
//! received XML document: its external identity, header fields, and raw
//! bytes. The root type is discovered by XML inspection during parse, not
//! declared by the source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::remittance::RemittanceDoc;
use crate::entities::submission::SubmissionDoc;
use crate::IngestError;

/// Document root discovered during parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootType {
    Submission,
    Remittance,
}

impl RootType {
    pub fn as_str(self) -> &'static str {
        match self {
            RootType::Submission => "Submission",
            RootType::Remittance => "Remittance",
        }
    }

    pub fn from_str_persisted(value: &str) -> Result<Self, IngestError> {
        match value {
            "Submission" => Ok(RootType::Submission),
            "Remittance" => Ok(RootType::Remittance),
            other => Err(IngestError::internal(format!("unknown root type {other:?}"))),
        }
    }
}

impl fmt::Display for RootType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared header of both document types.
///
/// `transaction_date` is the business timestamp inherited by every
/// downstream row (`tx_at` columns, event times).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub record_count: Option<i64>,
    pub disposition_flag: Option<String>,
}

/// Result of parsing one staged document.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Submission(SubmissionDoc),
    Remittance(RemittanceDoc),
}

impl ParseOutcome {
    pub fn root_type(&self) -> RootType {
        match self {
            ParseOutcome::Submission(_) => RootType::Submission,
            ParseOutcome::Remittance(_) => RootType::Remittance,
        }
    }

    pub fn header(&self) -> &FileHeader {
        match self {
            ParseOutcome::Submission(doc) => &doc.header,
            ParseOutcome::Remittance(doc) => &doc.header,
        }
    }

    /// Number of `<Claim>` entries the document actually carries.
    pub fn claim_count(&self) -> usize {
        match self {
            ParseOutcome::Submission(doc) => doc.claims.len(),
            ParseOutcome::Remittance(doc) => doc.claims.len(),
        }
    }
}
