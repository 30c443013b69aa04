// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Submission Document Model
//!
//! DTOs produced by the forward-only parse of a `<Claim.Submission>`
//! document. Collections are fully materialized: the parser yields complete
//! child lists, and the persister walks them without re-reading the XML.
//!
//! Monetary fields are exact decimals; there is no floating point anywhere
//! in payment-relevant state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entities::ingestion_file::FileHeader;

/// One parsed `<Claim.Submission>` document.
#[derive(Debug, Clone, Default)]
pub struct SubmissionDoc {
    pub header: FileHeader,
    pub claims: Vec<ClaimDto>,
    /// Side-channel list of embedded file payloads, keyed by the enclosing
    /// claim's business id.
    pub attachments: Vec<ExtractedAttachment>,
}

/// One `<Claim>` entry of a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimDto {
    /// Business claim id; the natural key of the claim spine.
    pub id: Option<String>,
    pub id_payer: Option<String>,
    pub member_id: Option<String>,
    pub payer_id: Option<String>,
    pub provider_id: Option<String>,
    pub emirates_id_number: Option<String>,
    pub gross: Option<Decimal>,
    pub patient_share: Option<Decimal>,
    pub net: Option<Decimal>,
    pub encounter: Option<EncounterDto>,
    pub diagnoses: Vec<DiagnosisDto>,
    pub activities: Vec<ActivityDto>,
    pub resubmission: Option<ResubmissionDto>,
}

impl ClaimDto {
    /// Sum of the activity `Net` amounts; the submission side of the payment
    /// reconciliation equation.
    pub fn net_requested(&self) -> Decimal {
        self.activities.iter().filter_map(|a| a.net).sum()
    }
}

/// `<Encounter>` child (0..1 per claim).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncounterDto {
    pub facility_id: Option<String>,
    pub encounter_type: Option<String>,
    pub patient_id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub start_type: Option<String>,
    pub end_type: Option<String>,
    pub transfer_source: Option<String>,
    pub transfer_destination: Option<String>,
}

/// `<Diagnosis>` child (0..N per claim).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisDto {
    pub diag_type: Option<String>,
    pub code: Option<String>,
}

/// `<Activity>` child (0..N per claim).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityDto {
    pub id: Option<String>,
    pub start: Option<String>,
    pub activity_type: Option<String>,
    pub code: Option<String>,
    pub quantity: Option<Decimal>,
    pub net: Option<Decimal>,
    pub clinician: Option<String>,
    pub prior_auth_id: Option<String>,
    pub observations: Vec<ObservationDto>,
}

/// `<Observation>` child (0..N per activity).
///
/// Observations with `Type = "File"` carry embedded binary content; the
/// parser decodes it into [`ExtractedAttachment`] and leaves `value` empty
/// here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationDto {
    pub obs_type: Option<String>,
    pub code: Option<String>,
    pub value: Option<String>,
    pub value_type: Option<String>,
}

impl ObservationDto {
    /// Dedup hash over the full observation tuple. Identical observations
    /// within one activity collapse to a single row.
    pub fn value_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.obs_type.as_deref().unwrap_or("").as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.code.as_deref().unwrap_or("").as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.value.as_deref().unwrap_or("").as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.value_type.as_deref().unwrap_or("").as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// `<Resubmission>` payload (0..1 per claim).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResubmissionDto {
    pub resubmission_type: Option<String>,
    pub comment: Option<String>,
    /// Decoded attachment bytes, when the element carried one.
    pub attachment: Option<Vec<u8>>,
}

/// Embedded file payload extracted during parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAttachment {
    /// Business id of the enclosing claim.
    pub claim_id: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}
