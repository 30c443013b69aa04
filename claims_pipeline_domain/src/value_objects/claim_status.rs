// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Claim Status Value Object
//!
//! The lifecycle states recorded in the append-only status timeline. The
//! numeric discriminants are part of the persisted contract
//! (`claims_claim_status_timeline.status`) and must never be renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::IngestError;

/// Lifecycle status of a claim as derived from observed events.
///
/// `Submitted` and `Resubmitted` come from submission-side events; the
/// payment states (`Paid`, `PartiallyPaid`, `Rejected`) are derived per
/// remittance from payment amounts and denial codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i64)]
pub enum ClaimStatus {
    Submitted = 1,
    Resubmitted = 2,
    Paid = 3,
    PartiallyPaid = 4,
    Rejected = 5,
}

impl ClaimStatus {
    /// Persisted numeric discriminant.
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Decodes a persisted discriminant.
    pub fn from_i64(value: i64) -> Result<Self, IngestError> {
        match value {
            1 => Ok(ClaimStatus::Submitted),
            2 => Ok(ClaimStatus::Resubmitted),
            3 => Ok(ClaimStatus::Paid),
            4 => Ok(ClaimStatus::PartiallyPaid),
            5 => Ok(ClaimStatus::Rejected),
            other => Err(IngestError::internal(format!("unknown claim status discriminant {other}"))),
        }
    }

    /// Whether this status comes from the remittance side of the lifecycle.
    pub fn is_payment_state(self) -> bool {
        matches!(self, ClaimStatus::Paid | ClaimStatus::PartiallyPaid | ClaimStatus::Rejected)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClaimStatus::Submitted => "SUBMITTED",
            ClaimStatus::Resubmitted => "RESUBMITTED",
            ClaimStatus::Paid => "PAID",
            ClaimStatus::PartiallyPaid => "PARTIALLY_PAID",
            ClaimStatus::Rejected => "REJECTED",
        };
        write!(f, "{name}")
    }
}
