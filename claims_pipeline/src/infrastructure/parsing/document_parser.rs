// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Document Parser Entry Point
//!
//! Normalizes the payload, sniffs the document root, and dispatches to the
//! submission or remittance parser. Shared leaf-reading helpers for both
//! parsers live here: trimmed text, exact decimals, and the transaction
//! date formats the upstream service emits.

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rust_decimal::Decimal;

use claims_pipeline_domain::entities::{FileHeader, ParseOutcome};
use claims_pipeline_domain::value_objects::pipeline_stage::ErrorObjectType;
use claims_pipeline_domain::IngestError;

use crate::infrastructure::parsing::charset::normalize_to_utf8;
use crate::infrastructure::parsing::remittance_parser::parse_remittance;
use crate::infrastructure::parsing::submission_parser::parse_submission;

/// Parses one staged payload into a typed document.
pub fn parse_document(raw: &[u8]) -> Result<ParseOutcome, IngestError> {
    let normalized = normalize_to_utf8(raw)?;
    // normalize_to_utf8 guarantees valid UTF-8.
    let xml = std::str::from_utf8(&normalized)
        .map_err(|e| IngestError::parse("INVALID_UTF8", ErrorObjectType::File, None, e.to_string()))?;

    match sniff_root(xml)? {
        RootName::Submission => Ok(ParseOutcome::Submission(parse_submission(xml)?)),
        RootName::Remittance => Ok(ParseOutcome::Remittance(parse_remittance(xml)?)),
    }
}

enum RootName {
    Submission,
    Remittance,
}

/// Finds the first element name without parsing the body.
fn sniff_root(xml: &str) -> Result<RootName, IngestError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return match e.local_name().as_ref() {
                    b"Claim.Submission" => Ok(RootName::Submission),
                    b"Remittance.Advice" => Ok(RootName::Remittance),
                    other => Err(IngestError::parse(
                        "UNKNOWN_ROOT",
                        ErrorObjectType::File,
                        None,
                        format!("unexpected document root <{}>", String::from_utf8_lossy(other)),
                    )),
                };
            }
            Ok(Event::Eof) => {
                return Err(IngestError::parse(
                    "MISSING_ROOT",
                    ErrorObjectType::File,
                    None,
                    "document has no root element",
                ));
            }
            Ok(_) => {}
            Err(e) => {
                return Err(IngestError::parse(
                    "MALFORMED_XML",
                    ErrorObjectType::File,
                    None,
                    e.to_string(),
                ));
            }
        }
    }
}

// --- shared leaf helpers -----------------------------------------------------

pub(crate) fn malformed(object_type: ErrorObjectType, object_key: Option<String>, cause: impl Into<String>) -> IngestError {
    IngestError::parse("MALFORMED_XML", object_type, object_key, cause)
}

/// Reads the trimmed text content of a leaf element; empty becomes `None`.
pub(crate) fn read_trimmed(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    object_type: ErrorObjectType,
) -> Result<Option<String>, IngestError> {
    let text = reader
        .read_text(start.name())
        .map_err(|e| malformed(object_type, None, e.to_string()))?;
    let trimmed = text.trim();
    Ok(if trimmed.is_empty() { None } else { Some(trimmed.to_string()) })
}

/// Reads a leaf element as an exact decimal.
pub(crate) fn read_decimal(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    object_type: ErrorObjectType,
    object_key: Option<String>,
) -> Result<Option<Decimal>, IngestError> {
    match read_trimmed(reader, start, object_type)? {
        Some(text) => text
            .parse::<Decimal>()
            .map(Some)
            .map_err(|e| IngestError::parse("INVALID_AMOUNT", object_type, object_key, format!("{text:?}: {e}"))),
        None => Ok(None),
    }
}

/// Skips an element and everything inside it.
pub(crate) fn skip_element(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    object_type: ErrorObjectType,
) -> Result<(), IngestError> {
    reader
        .read_to_end(start.name())
        .map_err(|e| malformed(object_type, None, e.to_string()))?;
    Ok(())
}

/// Transaction date formats accepted from the wire: the service's
/// `dd/MM/yyyy HH:mm[:ss]` plus RFC 3339 for tooling-generated files.
/// Naive timestamps are taken as UTC.
pub(crate) fn parse_transaction_date(text: &str) -> Result<DateTime<Utc>, IngestError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(IngestError::parse(
        "INVALID_TRANSACTION_DATE",
        ErrorObjectType::Header,
        None,
        format!("unrecognized timestamp {text:?}"),
    ))
}

/// Parses the `<Header>` shared by both document types. The caller has just
/// consumed the `Header` start tag.
pub(crate) fn parse_header(reader: &mut Reader<&[u8]>) -> Result<FileHeader, IngestError> {
    let mut header = FileHeader::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"SenderID" => header.sender_id = read_trimmed(reader, &e, ErrorObjectType::Header)?,
                b"ReceiverID" => header.receiver_id = read_trimmed(reader, &e, ErrorObjectType::Header)?,
                b"TransactionDate" => {
                    if let Some(text) = read_trimmed(reader, &e, ErrorObjectType::Header)? {
                        header.transaction_date = Some(parse_transaction_date(&text)?);
                    }
                }
                b"RecordCount" => {
                    if let Some(text) = read_trimmed(reader, &e, ErrorObjectType::Header)? {
                        header.record_count = Some(text.parse::<i64>().map_err(|e| {
                            IngestError::parse(
                                "INVALID_RECORD_COUNT",
                                ErrorObjectType::Header,
                                None,
                                format!("{text:?}: {e}"),
                            )
                        })?);
                    }
                }
                b"DispositionFlag" => header.disposition_flag = read_trimmed(reader, &e, ErrorObjectType::Header)?,
                _ => skip_element(reader, &e, ErrorObjectType::Header)?,
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"Header" => break,
            Ok(Event::Eof) => {
                return Err(malformed(ErrorObjectType::Header, None, "unexpected end of document inside <Header>"));
            }
            Ok(_) => {}
            Err(e) => return Err(malformed(ErrorObjectType::Header, None, e.to_string())),
        }
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims_pipeline_domain::entities::RootType;

    #[test]
    fn dispatches_on_root_element() {
        let submission = parse_document(
            b"<Claim.Submission><Header><SenderID>P</SenderID><ReceiverID>R</ReceiverID>\
              <TransactionDate>14/02/2025 12:00</TransactionDate><RecordCount>0</RecordCount>\
              <DispositionFlag>TEST</DispositionFlag></Header></Claim.Submission>",
        )
        .unwrap();
        assert_eq!(submission.root_type(), RootType::Submission);

        let remittance = parse_document(
            b"<Remittance.Advice><Header><SenderID>P</SenderID><ReceiverID>R</ReceiverID>\
              <TransactionDate>14/02/2025 12:00</TransactionDate><RecordCount>0</RecordCount>\
              <DispositionFlag>TEST</DispositionFlag></Header></Remittance.Advice>",
        )
        .unwrap();
        assert_eq!(remittance.root_type(), RootType::Remittance);
    }

    #[test]
    fn unknown_root_is_a_parse_error() {
        let err = parse_document(b"<SomethingElse/>").unwrap_err();
        assert!(err.to_string().contains("UNKNOWN_ROOT"));
    }

    #[test]
    fn transaction_date_accepts_wire_and_rfc3339_formats() {
        let wire = parse_transaction_date("14/02/2025 12:00").unwrap();
        let with_seconds = parse_transaction_date("14/02/2025 12:00:00").unwrap();
        let rfc = parse_transaction_date("2025-02-14T12:00:00Z").unwrap();
        assert_eq!(wire, rfc);
        assert_eq!(with_seconds, rfc);
        assert!(parse_transaction_date("02/30/2025 99:00").is_err());
    }
}
