// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Forward-only parse of a `<Remittance.Advice>` document: adjudication
//! outcomes per claim with payment and denial detail per activity.

use quick_xml::events::Event;
use quick_xml::Reader;

use claims_pipeline_domain::entities::{RemittanceActivityDto, RemittanceClaimDto, RemittanceDoc};
use claims_pipeline_domain::value_objects::pipeline_stage::ErrorObjectType;
use claims_pipeline_domain::IngestError;

use crate::infrastructure::parsing::document_parser::{
    malformed, parse_header, read_decimal, read_trimmed, skip_element,
};

pub fn parse_remittance(xml: &str) -> Result<RemittanceDoc, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut doc = RemittanceDoc::default();
    let mut seen_header = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"Remittance.Advice" => {}
                b"Header" => {
                    doc.header = parse_header(&mut reader)?;
                    seen_header = true;
                }
                b"Claim" => doc.claims.push(parse_remittance_claim(&mut reader)?),
                _ => skip_element(&mut reader, &e, ErrorObjectType::File)?,
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(ErrorObjectType::File, None, e.to_string())),
        }
    }

    if !seen_header {
        return Err(IngestError::parse(
            "MISSING_HEADER",
            ErrorObjectType::Header,
            None,
            "remittance document has no <Header>",
        ));
    }

    Ok(doc)
}

fn parse_remittance_claim(reader: &mut Reader<&[u8]>) -> Result<RemittanceClaimDto, IngestError> {
    let mut claim = RemittanceClaimDto::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"ID" => claim.id = read_trimmed(reader, &e, ErrorObjectType::RemittanceClaim)?,
                b"IDPayer" => claim.id_payer = read_trimmed(reader, &e, ErrorObjectType::RemittanceClaim)?,
                b"ProviderID" => claim.provider_id = read_trimmed(reader, &e, ErrorObjectType::RemittanceClaim)?,
                b"DenialCode" => claim.denial_code = read_trimmed(reader, &e, ErrorObjectType::RemittanceClaim)?,
                b"PaymentReference" => {
                    claim.payment_reference = read_trimmed(reader, &e, ErrorObjectType::RemittanceClaim)?;
                }
                b"DateSettlement" => {
                    claim.date_settlement = read_trimmed(reader, &e, ErrorObjectType::RemittanceClaim)?;
                }
                b"Activity" => claim.activities.push(parse_remittance_activity(reader)?),
                _ => skip_element(reader, &e, ErrorObjectType::RemittanceClaim)?,
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"Claim" => break,
            Ok(Event::Eof) => {
                return Err(malformed(
                    ErrorObjectType::RemittanceClaim,
                    claim.id.clone(),
                    "unexpected end of document inside <Claim>",
                ));
            }
            Ok(_) => {}
            Err(e) => return Err(malformed(ErrorObjectType::RemittanceClaim, claim.id.clone(), e.to_string())),
        }
    }
    Ok(claim)
}

fn parse_remittance_activity(reader: &mut Reader<&[u8]>) -> Result<RemittanceActivityDto, IngestError> {
    let mut activity = RemittanceActivityDto::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"ID" => activity.id = read_trimmed(reader, &e, ErrorObjectType::RemittanceActivity)?,
                b"Start" => activity.start = read_trimmed(reader, &e, ErrorObjectType::RemittanceActivity)?,
                b"Type" => activity.activity_type = read_trimmed(reader, &e, ErrorObjectType::RemittanceActivity)?,
                b"Code" => activity.code = read_trimmed(reader, &e, ErrorObjectType::RemittanceActivity)?,
                b"Quantity" => {
                    activity.quantity =
                        read_decimal(reader, &e, ErrorObjectType::RemittanceActivity, activity.id.clone())?;
                }
                b"Net" => {
                    activity.net = read_decimal(reader, &e, ErrorObjectType::RemittanceActivity, activity.id.clone())?;
                }
                b"List" => {
                    activity.list_price =
                        read_decimal(reader, &e, ErrorObjectType::RemittanceActivity, activity.id.clone())?;
                }
                b"Clinician" => activity.clinician = read_trimmed(reader, &e, ErrorObjectType::RemittanceActivity)?,
                b"PriorAuthorizationID" => {
                    activity.prior_auth_id = read_trimmed(reader, &e, ErrorObjectType::RemittanceActivity)?;
                }
                b"Gross" => {
                    activity.gross =
                        read_decimal(reader, &e, ErrorObjectType::RemittanceActivity, activity.id.clone())?;
                }
                b"PatientShare" => {
                    activity.patient_share =
                        read_decimal(reader, &e, ErrorObjectType::RemittanceActivity, activity.id.clone())?;
                }
                b"PaymentAmount" => {
                    activity.payment_amount =
                        read_decimal(reader, &e, ErrorObjectType::RemittanceActivity, activity.id.clone())?;
                }
                b"DenialCode" => activity.denial_code = read_trimmed(reader, &e, ErrorObjectType::RemittanceActivity)?,
                _ => skip_element(reader, &e, ErrorObjectType::RemittanceActivity)?,
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"Activity" => break,
            Ok(Event::Eof) => {
                return Err(malformed(
                    ErrorObjectType::RemittanceActivity,
                    activity.id.clone(),
                    "unexpected end of document inside <Activity>",
                ));
            }
            Ok(_) => {}
            Err(e) => return Err(malformed(ErrorObjectType::RemittanceActivity, activity.id.clone(), e.to_string())),
        }
    }
    Ok(activity)
}
