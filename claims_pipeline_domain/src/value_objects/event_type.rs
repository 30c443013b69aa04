// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Claim lifecycle event types. Discriminants are persisted in
//! `claims_claim_event.event_type` and are part of the storage contract.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::IngestError;

/// Milestone in a claim's lifecycle. Events are unique per
/// `(claim_key, type, event_time)`, so duplicate projections are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i64)]
pub enum ClaimEventType {
    Submitted = 1,
    Resubmitted = 2,
    Remitted = 3,
}

impl ClaimEventType {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Result<Self, IngestError> {
        match value {
            1 => Ok(ClaimEventType::Submitted),
            2 => Ok(ClaimEventType::Resubmitted),
            3 => Ok(ClaimEventType::Remitted),
            other => Err(IngestError::internal(format!("unknown claim event type discriminant {other}"))),
        }
    }
}

impl fmt::Display for ClaimEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClaimEventType::Submitted => "SUBMITTED",
            ClaimEventType::Resubmitted => "RESUBMITTED",
            ClaimEventType::Remitted => "REMITTED",
        };
        write!(f, "{name}")
    }
}
