// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DHPO Result Code
//!
//! Application-level result codes returned by every DHPO SOAP operation.
//! The taxonomy is fixed by the remote service: `>= 0` is success (positive
//! values may carry warning text), `-4` is the only code worth retrying at
//! the gateway layer, every other negative is fatal for that call.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a [`DhpoResultCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultDisposition {
    /// Clean success (`0`).
    Success,
    /// Success with remote warning text (`> 0`).
    SuccessWithWarning,
    /// `-4`: transient remote condition, retry once.
    Retryable,
    /// Any other negative code.
    Fatal,
}

/// Newtype over the raw i64 code parsed from the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DhpoResultCode(pub i64);

impl DhpoResultCode {
    pub const RETRYABLE: DhpoResultCode = DhpoResultCode(-4);

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn disposition(self) -> ResultDisposition {
        match self.0 {
            0 => ResultDisposition::Success,
            code if code > 0 => ResultDisposition::SuccessWithWarning,
            -4 => ResultDisposition::Retryable,
            _ => ResultDisposition::Fatal,
        }
    }

    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    pub fn is_retryable(self) -> bool {
        self.0 == -4
    }
}

impl fmt::Display for DhpoResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
