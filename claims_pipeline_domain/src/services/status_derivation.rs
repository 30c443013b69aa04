// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Payment Status Derivation
//!
//! Derives the timeline status for one remittance claim from the submitted
//! net, the paid amount of this remittance, and the all-denied flag. The
//! function is total: every remittance claim gets exactly one of PAID,
//! PARTIALLY_PAID, or REJECTED, with PARTIALLY_PAID as the conservative
//! fallback for anything the first three rules do not cover (overpayment,
//! remittance ahead of submission, negative adjustments).

use rust_decimal::Decimal;

use crate::value_objects::claim_status::ClaimStatus;

/// Derivation rule, applied per remittance claim using this remittance only,
/// as an ordered chain:
///
/// 1. `paid == net_requested` and `net_requested >= 0` → `Paid`
/// 2. `0 < paid < net_requested` → `PartiallyPaid`
/// 3. `paid == 0` and every activity denied → `Rejected`
/// 4. otherwise → `PartiallyPaid`
///
/// The ordering is part of the contract. When no submission has been seen
/// yet (`net_requested` zero), a paying remittance falls through to the
/// conservative `PartiallyPaid`; a zero-paid fully-denied one satisfies
/// the exact-payment rule first and derives `Paid`.
pub fn derive_remittance_status(net_requested: Decimal, paid_amount: Decimal, all_denied: bool) -> ClaimStatus {
    if paid_amount == net_requested && net_requested >= Decimal::ZERO {
        ClaimStatus::Paid
    } else if paid_amount > Decimal::ZERO && paid_amount < net_requested {
        ClaimStatus::PartiallyPaid
    } else if paid_amount.is_zero() && all_denied {
        ClaimStatus::Rejected
    } else {
        ClaimStatus::PartiallyPaid
    }
}
