// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shape-Level DTO Validation
//!
//! Required-field checks applied between parse and persist. Validation never
//! rejects a whole file: a claim (or activity, or diagnosis) with missing
//! required fields is reported and skipped, and the pipeline continues with
//! the next object. The only file-level requirement is the header itself.
//!
//! Each function returns the list of missing field names; an empty list
//! means the object passes. Field names are the XML element names so error
//! records read naturally against the source document.

use crate::entities::{
    ActivityDto, ClaimDto, DiagnosisDto, FileHeader, RemittanceActivityDto, RemittanceClaimDto,
};

fn missing(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Header requirements: sender, receiver, transaction date, disposition flag.
pub fn header_missing_fields(header: &FileHeader) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if missing(&header.sender_id) {
        fields.push("SenderID");
    }
    if missing(&header.receiver_id) {
        fields.push("ReceiverID");
    }
    if header.transaction_date.is_none() {
        fields.push("TransactionDate");
    }
    if missing(&header.disposition_flag) {
        fields.push("DispositionFlag");
    }
    fields
}

/// Submission claim requirements: id, payer, provider, Emirates id, amounts.
pub fn claim_missing_fields(claim: &ClaimDto) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if missing(&claim.id) {
        fields.push("ID");
    }
    if missing(&claim.payer_id) {
        fields.push("PayerID");
    }
    if missing(&claim.provider_id) {
        fields.push("ProviderID");
    }
    if missing(&claim.emirates_id_number) {
        fields.push("EmiratesIDNumber");
    }
    if claim.gross.is_none() {
        fields.push("Gross");
    }
    if claim.patient_share.is_none() {
        fields.push("PatientShare");
    }
    if claim.net.is_none() {
        fields.push("Net");
    }
    fields
}

/// Activity requirements: id, start, type, code, quantity, net, clinician.
pub fn activity_missing_fields(activity: &ActivityDto) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if missing(&activity.id) {
        fields.push("ID");
    }
    if missing(&activity.start) {
        fields.push("Start");
    }
    if missing(&activity.activity_type) {
        fields.push("Type");
    }
    if missing(&activity.code) {
        fields.push("Code");
    }
    if activity.quantity.is_none() {
        fields.push("Quantity");
    }
    if activity.net.is_none() {
        fields.push("Net");
    }
    if missing(&activity.clinician) {
        fields.push("Clinician");
    }
    fields
}

/// Diagnosis requirements: type and code.
pub fn diagnosis_missing_fields(diagnosis: &DiagnosisDto) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if missing(&diagnosis.diag_type) {
        fields.push("Type");
    }
    if missing(&diagnosis.code) {
        fields.push("Code");
    }
    fields
}

/// Remittance claim requirements: id, payer-side id, provider, payment ref.
pub fn remittance_claim_missing_fields(claim: &RemittanceClaimDto) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if missing(&claim.id) {
        fields.push("ID");
    }
    if missing(&claim.id_payer) {
        fields.push("IDPayer");
    }
    if missing(&claim.provider_id) {
        fields.push("ProviderID");
    }
    if missing(&claim.payment_reference) {
        fields.push("PaymentReference");
    }
    fields
}

/// Remittance activity requirements: the activity id only; payment and
/// denial fields are legitimately absent on unadjudicated lines.
pub fn remittance_activity_missing_fields(activity: &RemittanceActivityDto) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if missing(&activity.id) {
        fields.push("ID");
    }
    fields
}
