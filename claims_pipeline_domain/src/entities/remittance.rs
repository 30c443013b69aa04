// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Remittance Document Model
//!
//! DTOs produced by parsing a `<Remittance.Advice>` document: adjudication
//! outcomes per claim, with payment and denial detail per activity. Denial
//! codes may appear at claim level (whole-claim denial) and/or per activity.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::ingestion_file::FileHeader;

/// One parsed `<Remittance.Advice>` document.
#[derive(Debug, Clone, Default)]
pub struct RemittanceDoc {
    pub header: FileHeader,
    pub claims: Vec<RemittanceClaimDto>,
}

/// One `<Claim>` entry of a remittance advice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemittanceClaimDto {
    /// Business claim id; joins back to the claim spine.
    pub id: Option<String>,
    pub id_payer: Option<String>,
    pub provider_id: Option<String>,
    /// Whole-claim denial, when present.
    pub denial_code: Option<String>,
    pub payment_reference: Option<String>,
    pub date_settlement: Option<String>,
    pub activities: Vec<RemittanceActivityDto>,
}

impl RemittanceClaimDto {
    /// Sum of per-activity payment amounts for this remittance claim.
    pub fn paid_amount(&self) -> Decimal {
        self.activities.iter().filter_map(|a| a.payment_amount).sum()
    }

    /// True when every activity carries a denial code and pays nothing.
    /// An empty activity list is not "all denied".
    pub fn all_denied(&self) -> bool {
        !self.activities.is_empty()
            && self.activities.iter().all(|a| {
                a.denial_code.as_deref().is_some_and(|c| !c.trim().is_empty())
                    && a.payment_amount.unwrap_or_default().is_zero()
            })
    }
}

/// One `<Activity>` entry of a remittance claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemittanceActivityDto {
    pub id: Option<String>,
    pub start: Option<String>,
    pub activity_type: Option<String>,
    pub code: Option<String>,
    pub quantity: Option<Decimal>,
    pub net: Option<Decimal>,
    pub list_price: Option<Decimal>,
    pub clinician: Option<String>,
    pub prior_auth_id: Option<String>,
    pub gross: Option<Decimal>,
    pub patient_share: Option<Decimal>,
    pub payment_amount: Option<Decimal>,
    pub denial_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn activity(payment: Option<&str>, denial: Option<&str>) -> RemittanceActivityDto {
        RemittanceActivityDto {
            id: Some("A-1".into()),
            payment_amount: payment.map(dec),
            denial_code: denial.map(String::from),
            ..RemittanceActivityDto::default()
        }
    }

    #[test]
    fn paid_amount_sums_activities() {
        let claim = RemittanceClaimDto {
            activities: vec![activity(Some("100.00"), None), activity(Some("14.13"), None)],
            ..RemittanceClaimDto::default()
        };
        assert_eq!(claim.paid_amount(), dec("114.13"));
    }

    #[test]
    fn all_denied_requires_denial_and_zero_payment_everywhere() {
        let denied = RemittanceClaimDto {
            activities: vec![activity(Some("0"), Some("D001")), activity(None, Some("D002"))],
            ..RemittanceClaimDto::default()
        };
        assert!(denied.all_denied());

        let partially = RemittanceClaimDto {
            activities: vec![activity(Some("0"), Some("D001")), activity(Some("5.00"), None)],
            ..RemittanceClaimDto::default()
        };
        assert!(!partially.all_denied());

        let blank_denial = RemittanceClaimDto {
            activities: vec![activity(Some("0"), Some("  "))],
            ..RemittanceClaimDto::default()
        };
        assert!(!blank_denial.all_denied());
    }

    #[test]
    fn empty_activity_list_is_not_all_denied() {
        let claim = RemittanceClaimDto::default();
        assert!(!claim.all_denied());
    }
}
