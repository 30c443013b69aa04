// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Submission Parser
//!
//! Forward-only parse of a `<Claim.Submission>` document. One pass over the
//! reader builds the complete DTO tree; embedded file observations
//! (`Observation Type="File"`) are decoded out of the activity they appear
//! in and surfaced on the document's attachment side-channel, keyed by the
//! enclosing claim id.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use quick_xml::events::Event;
use quick_xml::Reader;

use claims_pipeline_domain::entities::{
    ActivityDto, ClaimDto, DiagnosisDto, EncounterDto, ExtractedAttachment, ObservationDto, ResubmissionDto,
    SubmissionDoc,
};
use claims_pipeline_domain::value_objects::pipeline_stage::ErrorObjectType;
use claims_pipeline_domain::IngestError;

use crate::infrastructure::parsing::document_parser::{
    malformed, parse_header, read_decimal, read_trimmed, skip_element,
};

/// A `Type="File"` observation captured during activity parsing, decoded
/// once the enclosing claim id is known.
struct FilePayload {
    file_name: Option<String>,
    base64_value: String,
}

pub fn parse_submission(xml: &str) -> Result<SubmissionDoc, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut doc = SubmissionDoc::default();
    let mut seen_header = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"Claim.Submission" => {}
                b"Header" => {
                    doc.header = parse_header(&mut reader)?;
                    seen_header = true;
                }
                b"Claim" => {
                    let (claim, files) = parse_claim(&mut reader)?;
                    attach_files(&mut doc.attachments, &claim, files)?;
                    doc.claims.push(claim);
                }
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
            "submission document has no <Header>",
        ));
    }

    Ok(doc)
}

fn attach_files(
    attachments: &mut Vec<ExtractedAttachment>,
    claim: &ClaimDto,
    files: Vec<FilePayload>,
) -> Result<(), IngestError> {
    if files.is_empty() {
        return Ok(());
    }
    // Claims without an id are dropped later by validation; their embedded
    // files have nothing to attach to.
    let Some(claim_id) = claim.id.clone() else {
        return Ok(());
    };

    for (index, file) in files.into_iter().enumerate() {
        let bytes = BASE64.decode(file.base64_value.as_bytes()).map_err(|e| {
            IngestError::parse(
                "INVALID_ATTACHMENT",
                ErrorObjectType::Observation,
                Some(claim_id.clone()),
                format!("embedded file is not base64: {e}"),
            )
        })?;
        let file_name = file
            .file_name
            .unwrap_or_else(|| format!("{claim_id}-attachment-{}.bin", index + 1));
        attachments.push(ExtractedAttachment {
            claim_id: claim_id.clone(),
            file_name,
            bytes,
        });
    }
    Ok(())
}

fn parse_claim(reader: &mut Reader<&[u8]>) -> Result<(ClaimDto, Vec<FilePayload>), IngestError> {
    let mut claim = ClaimDto::default();
    let mut files = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"ID" => claim.id = read_trimmed(reader, &e, ErrorObjectType::Claim)?,
                b"IDPayer" => claim.id_payer = read_trimmed(reader, &e, ErrorObjectType::Claim)?,
                b"MemberID" => claim.member_id = read_trimmed(reader, &e, ErrorObjectType::Claim)?,
                b"PayerID" => claim.payer_id = read_trimmed(reader, &e, ErrorObjectType::Claim)?,
                b"ProviderID" => claim.provider_id = read_trimmed(reader, &e, ErrorObjectType::Claim)?,
                b"EmiratesIDNumber" => claim.emirates_id_number = read_trimmed(reader, &e, ErrorObjectType::Claim)?,
                b"Gross" => claim.gross = read_decimal(reader, &e, ErrorObjectType::Claim, claim.id.clone())?,
                b"PatientShare" => {
                    claim.patient_share = read_decimal(reader, &e, ErrorObjectType::Claim, claim.id.clone())?;
                }
                b"Net" => claim.net = read_decimal(reader, &e, ErrorObjectType::Claim, claim.id.clone())?,
                b"Encounter" => claim.encounter = Some(parse_encounter(reader)?),
                b"Diagnosis" => claim.diagnoses.push(parse_diagnosis(reader)?),
                b"Activity" => {
                    let (activity, mut activity_files) = parse_activity(reader)?;
                    files.append(&mut activity_files);
                    claim.activities.push(activity);
                }
                b"Resubmission" => claim.resubmission = Some(parse_resubmission(reader, claim.id.clone())?),
                _ => skip_element(reader, &e, ErrorObjectType::Claim)?,
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"Claim" => break,
            Ok(Event::Eof) => {
                return Err(malformed(
                    ErrorObjectType::Claim,
                    claim.id.clone(),
                    "unexpected end of document inside <Claim>",
                ));
            }
            Ok(_) => {}
            Err(e) => return Err(malformed(ErrorObjectType::Claim, claim.id.clone(), e.to_string())),
        }
    }

    Ok((claim, files))
}

fn parse_encounter(reader: &mut Reader<&[u8]>) -> Result<EncounterDto, IngestError> {
    let mut encounter = EncounterDto::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"FacilityID" => encounter.facility_id = read_trimmed(reader, &e, ErrorObjectType::Encounter)?,
                b"Type" => encounter.encounter_type = read_trimmed(reader, &e, ErrorObjectType::Encounter)?,
                b"PatientID" => encounter.patient_id = read_trimmed(reader, &e, ErrorObjectType::Encounter)?,
                b"Start" => encounter.start = read_trimmed(reader, &e, ErrorObjectType::Encounter)?,
                b"End" => encounter.end = read_trimmed(reader, &e, ErrorObjectType::Encounter)?,
                b"StartType" => encounter.start_type = read_trimmed(reader, &e, ErrorObjectType::Encounter)?,
                b"EndType" => encounter.end_type = read_trimmed(reader, &e, ErrorObjectType::Encounter)?,
                b"TransferSource" => encounter.transfer_source = read_trimmed(reader, &e, ErrorObjectType::Encounter)?,
                b"TransferDestination" => {
                    encounter.transfer_destination = read_trimmed(reader, &e, ErrorObjectType::Encounter)?;
                }
                _ => skip_element(reader, &e, ErrorObjectType::Encounter)?,
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"Encounter" => break,
            Ok(Event::Eof) => {
                return Err(malformed(ErrorObjectType::Encounter, None, "unexpected end of document inside <Encounter>"));
            }
            Ok(_) => {}
            Err(e) => return Err(malformed(ErrorObjectType::Encounter, None, e.to_string())),
        }
    }
    Ok(encounter)
}

fn parse_diagnosis(reader: &mut Reader<&[u8]>) -> Result<DiagnosisDto, IngestError> {
    let mut diagnosis = DiagnosisDto::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"Type" => diagnosis.diag_type = read_trimmed(reader, &e, ErrorObjectType::Diagnosis)?,
                b"Code" => diagnosis.code = read_trimmed(reader, &e, ErrorObjectType::Diagnosis)?,
                _ => skip_element(reader, &e, ErrorObjectType::Diagnosis)?,
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"Diagnosis" => break,
            Ok(Event::Eof) => {
                return Err(malformed(ErrorObjectType::Diagnosis, None, "unexpected end of document inside <Diagnosis>"));
            }
            Ok(_) => {}
            Err(e) => return Err(malformed(ErrorObjectType::Diagnosis, None, e.to_string())),
        }
    }
    Ok(diagnosis)
}

fn parse_activity(reader: &mut Reader<&[u8]>) -> Result<(ActivityDto, Vec<FilePayload>), IngestError> {
    let mut activity = ActivityDto::default();
    let mut files = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"ID" => activity.id = read_trimmed(reader, &e, ErrorObjectType::Activity)?,
                b"Start" => activity.start = read_trimmed(reader, &e, ErrorObjectType::Activity)?,
                b"Type" => activity.activity_type = read_trimmed(reader, &e, ErrorObjectType::Activity)?,
                b"Code" => activity.code = read_trimmed(reader, &e, ErrorObjectType::Activity)?,
                b"Quantity" => {
                    activity.quantity = read_decimal(reader, &e, ErrorObjectType::Activity, activity.id.clone())?;
                }
                b"Net" => activity.net = read_decimal(reader, &e, ErrorObjectType::Activity, activity.id.clone())?,
                b"Clinician" => activity.clinician = read_trimmed(reader, &e, ErrorObjectType::Activity)?,
                b"PriorAuthorizationID" => {
                    activity.prior_auth_id = read_trimmed(reader, &e, ErrorObjectType::Activity)?;
                }
                b"Observation" => {
                    let (observation, file) = parse_observation(reader)?;
                    if let Some(file) = file {
                        files.push(file);
                    }
                    activity.observations.push(observation);
                }
                _ => skip_element(reader, &e, ErrorObjectType::Activity)?,
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"Activity" => break,
            Ok(Event::Eof) => {
                return Err(malformed(
                    ErrorObjectType::Activity,
                    activity.id.clone(),
                    "unexpected end of document inside <Activity>",
                ));
            }
            Ok(_) => {}
            Err(e) => return Err(malformed(ErrorObjectType::Activity, activity.id.clone(), e.to_string())),
        }
    }

    Ok((activity, files))
}

/// Parses one observation. Embedded file content (`Type = "File"`) is pulled
/// out for the attachment side-channel; the observation row keeps the
/// metadata but not the blob.
fn parse_observation(reader: &mut Reader<&[u8]>) -> Result<(ObservationDto, Option<FilePayload>), IngestError> {
    let mut observation = ObservationDto::default();
    let mut raw_value: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"Type" => observation.obs_type = read_trimmed(reader, &e, ErrorObjectType::Observation)?,
                b"Code" => observation.code = read_trimmed(reader, &e, ErrorObjectType::Observation)?,
                b"Value" => raw_value = read_trimmed(reader, &e, ErrorObjectType::Observation)?,
                b"ValueType" => observation.value_type = read_trimmed(reader, &e, ErrorObjectType::Observation)?,
                _ => skip_element(reader, &e, ErrorObjectType::Observation)?,
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"Observation" => break,
            Ok(Event::Eof) => {
                return Err(malformed(ErrorObjectType::Observation, None, "unexpected end of document inside <Observation>"));
            }
            Ok(_) => {}
            Err(e) => return Err(malformed(ErrorObjectType::Observation, None, e.to_string())),
        }
    }

    let is_file = observation.obs_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("file"));
    if is_file {
        let file = raw_value.map(|base64_value| FilePayload {
            file_name: observation.code.clone(),
            base64_value,
        });
        Ok((observation, file))
    } else {
        observation.value = raw_value;
        Ok((observation, None))
    }
}

fn parse_resubmission(reader: &mut Reader<&[u8]>, claim_id: Option<String>) -> Result<ResubmissionDto, IngestError> {
    let mut resubmission = ResubmissionDto::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"Type" => resubmission.resubmission_type = read_trimmed(reader, &e, ErrorObjectType::Resubmission)?,
                b"Comment" => resubmission.comment = read_trimmed(reader, &e, ErrorObjectType::Resubmission)?,
                b"Attachment" => {
                    if let Some(text) = read_trimmed(reader, &e, ErrorObjectType::Resubmission)? {
                        let bytes = BASE64.decode(text.as_bytes()).map_err(|err| {
                            IngestError::parse(
                                "INVALID_ATTACHMENT",
                                ErrorObjectType::Resubmission,
                                claim_id.clone(),
                                format!("resubmission attachment is not base64: {err}"),
                            )
                        })?;
                        resubmission.attachment = Some(bytes);
                    }
                }
                _ => skip_element(reader, &e, ErrorObjectType::Resubmission)?,
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"Resubmission" => break,
            Ok(Event::Eof) => {
                return Err(malformed(ErrorObjectType::Resubmission, claim_id, "unexpected end of document inside <Resubmission>"));
            }
            Ok(_) => {}
            Err(e) => return Err(malformed(ErrorObjectType::Resubmission, claim_id, e.to_string())),
        }
    }
    Ok(resubmission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    const HAPPY_SUBMISSION: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Claim.Submission>
  <Header>
    <SenderID>PROV1</SenderID>
    <ReceiverID>PAYER1</ReceiverID>
    <TransactionDate>14/02/2025 12:00</TransactionDate>
    <RecordCount>1</RecordCount>
    <DispositionFlag>PRODUCTION</DispositionFlag>
  </Header>
  <Claim>
    <ID>C-1</ID>
    <IDPayer>IP-77</IDPayer>
    <MemberID>M-5</MemberID>
    <PayerID>PAYER1</PayerID>
    <ProviderID>PROV1</ProviderID>
    <EmiratesIDNumber>784-1987-1234567-1</EmiratesIDNumber>
    <Gross>250.00</Gross>
    <PatientShare>35.87</PatientShare>
    <Net>214.13</Net>
    <Encounter>
      <FacilityID>F-001</FacilityID>
      <Type>1</Type>
      <PatientID>PT-9</PatientID>
      <Start>14/02/2025 09:30</Start>
    </Encounter>
    <Diagnosis>
      <Type>Principal</Type>
      <Code>J45.0</Code>
    </Diagnosis>
    <Activity>
      <ID>A-1</ID>
      <Start>14/02/2025 09:30</Start>
      <Type>3</Type>
      <Code>17999</Code>
      <Quantity>1</Quantity>
      <Net>214.13</Net>
      <Clinician>GD12345</Clinician>
      <Observation>
        <Type>LOINC</Type>
        <Code>718-7</Code>
        <Value>13.5</Value>
        <ValueType>g/dL</ValueType>
      </Observation>
    </Activity>
  </Claim>
</Claim.Submission>"#;

    #[test]
    fn parses_the_complete_claim_tree() {
        let doc = parse_submission(HAPPY_SUBMISSION).unwrap();

        assert_eq!(doc.header.sender_id.as_deref(), Some("PROV1"));
        assert_eq!(doc.header.record_count, Some(1));
        assert_eq!(doc.claims.len(), 1);

        let claim = &doc.claims[0];
        assert_eq!(claim.id.as_deref(), Some("C-1"));
        assert_eq!(claim.net, Some("214.13".parse::<Decimal>().unwrap()));
        assert_eq!(claim.encounter.as_ref().unwrap().facility_id.as_deref(), Some("F-001"));
        assert_eq!(claim.diagnoses.len(), 1);
        assert_eq!(claim.activities.len(), 1);

        let activity = &claim.activities[0];
        assert_eq!(activity.id.as_deref(), Some("A-1"));
        assert_eq!(activity.clinician.as_deref(), Some("GD12345"));
        assert_eq!(activity.observations.len(), 1);
        assert_eq!(activity.observations[0].value.as_deref(), Some("13.5"));
        assert!(doc.attachments.is_empty());
        assert!(claim.resubmission.is_none());
    }

    #[test]
    fn extracts_file_observations_as_attachments() {
        let xml = r#"<Claim.Submission>
  <Header>
    <SenderID>P</SenderID><ReceiverID>R</ReceiverID>
    <TransactionDate>14/02/2025 12:00</TransactionDate>
    <RecordCount>1</RecordCount><DispositionFlag>T</DispositionFlag>
  </Header>
  <Claim>
    <ID>C-2</ID>
    <Activity>
      <ID>A-1</ID>
      <Observation>
        <Type>File</Type>
        <Code>report.pdf</Code>
        <Value>aGVsbG8=</Value>
        <ValueType>PDF</ValueType>
      </Observation>
    </Activity>
  </Claim>
</Claim.Submission>"#;

        let doc = parse_submission(xml).unwrap();
        assert_eq!(doc.attachments.len(), 1);
        let attachment = &doc.attachments[0];
        assert_eq!(attachment.claim_id, "C-2");
        assert_eq!(attachment.file_name, "report.pdf");
        assert_eq!(attachment.bytes, b"hello");
        // The observation row keeps metadata but not the blob.
        assert_eq!(doc.claims[0].activities[0].observations[0].value, None);
    }

    #[test]
    fn parses_resubmission_payload() {
        let xml = r#"<Claim.Submission>
  <Header>
    <SenderID>P</SenderID><ReceiverID>R</ReceiverID>
    <TransactionDate>14/02/2025 12:00</TransactionDate>
    <RecordCount>1</RecordCount><DispositionFlag>T</DispositionFlag>
  </Header>
  <Claim>
    <ID>C-3</ID>
    <Resubmission>
      <Type>correction</Type>
      <Comment>corrected quantity</Comment>
      <Attachment>aGVsbG8=</Attachment>
    </Resubmission>
  </Claim>
</Claim.Submission>"#;

        let doc = parse_submission(xml).unwrap();
        let resubmission = doc.claims[0].resubmission.as_ref().unwrap();
        assert_eq!(resubmission.resubmission_type.as_deref(), Some("correction"));
        assert_eq!(resubmission.comment.as_deref(), Some("corrected quantity"));
        assert_eq!(resubmission.attachment.as_deref(), Some(b"hello".as_slice()));
    }

    #[test]
    fn missing_header_is_a_parse_error() {
        let err = parse_submission("<Claim.Submission><Claim><ID>C-1</ID></Claim></Claim.Submission>").unwrap_err();
        assert!(err.to_string().contains("MISSING_HEADER"));
    }

    #[test]
    fn bad_amount_aborts_with_object_context() {
        let xml = r#"<Claim.Submission>
  <Header>
    <SenderID>P</SenderID><ReceiverID>R</ReceiverID>
    <TransactionDate>14/02/2025 12:00</TransactionDate>
    <RecordCount>1</RecordCount><DispositionFlag>T</DispositionFlag>
  </Header>
  <Claim><ID>C-4</ID><Net>not-a-number</Net></Claim>
</Claim.Submission>"#;
        let err = parse_submission(xml).unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("INVALID_AMOUNT"));
        assert!(rendered.contains("C-4"));
    }

    #[test]
    fn unknown_elements_are_skipped() {
        let xml = r#"<Claim.Submission>
  <Header>
    <SenderID>P</SenderID><ReceiverID>R</ReceiverID>
    <TransactionDate>14/02/2025 12:00</TransactionDate>
    <RecordCount>1</RecordCount><DispositionFlag>T</DispositionFlag>
  </Header>
  <FutureBlock><Nested><Deep>x</Deep></Nested></FutureBlock>
  <Claim><ID>C-5</ID><NewField>ignored</NewField></Claim>
</Claim.Submission>"#;
        let doc = parse_submission(xml).unwrap();
        assert_eq!(doc.claims[0].id.as_deref(), Some("C-5"));
    }
}
