// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Charset and Container Normalization
//!
//! Inbound payloads arrive in more shapes than the parser wants to know
//! about: UTF-8 with or without BOM, UTF-16 in either endianness, and
//! gzip- or zip-wrapped single entries of any of those. This module
//! normalizes everything to BOM-less UTF-8 bytes before parse, or fails
//! with a precise reason.
//!
//! Container unwrapping recurses once per layer, bounded so a zip-of-a-zip
//! chain cannot loop forever.

use flate2::read::GzDecoder;
use std::io::{Cursor, Read};

use claims_pipeline_domain::value_objects::pipeline_stage::ErrorObjectType;
use claims_pipeline_domain::IngestError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Containers are unwrapped at most this many times.
const MAX_CONTAINER_DEPTH: usize = 3;

fn charset_err(code: &str, cause: impl Into<String>) -> IngestError {
    IngestError::parse(code, ErrorObjectType::File, None, cause)
}

/// Normalizes a raw payload to BOM-less UTF-8.
pub fn normalize_to_utf8(bytes: &[u8]) -> Result<Vec<u8>, IngestError> {
    normalize_inner(bytes, 0)
}

fn normalize_inner(bytes: &[u8], depth: usize) -> Result<Vec<u8>, IngestError> {
    if bytes.is_empty() {
        return Err(charset_err("EMPTY_PAYLOAD", "payload is empty"));
    }

    if bytes.starts_with(GZIP_MAGIC) || bytes.starts_with(ZIP_MAGIC) {
        if depth >= MAX_CONTAINER_DEPTH {
            return Err(charset_err("NESTED_CONTAINERS", "container nesting exceeds supported depth"));
        }
        let unwrapped = if bytes.starts_with(GZIP_MAGIC) {
            unwrap_gzip(bytes)?
        } else {
            unwrap_zip(bytes)?
        };
        return normalize_inner(&unwrapped, depth + 1);
    }

    decode_text(bytes)
}

fn unwrap_gzip(bytes: &[u8]) -> Result<Vec<u8>, IngestError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| charset_err("GZIP_DECODE_FAILED", format!("gzip payload is corrupt: {e}")))?;
    Ok(out)
}

fn unwrap_zip(bytes: &[u8]) -> Result<Vec<u8>, IngestError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| charset_err("ZIP_DECODE_FAILED", format!("zip payload is corrupt: {e}")))?;

    if archive.len() != 1 {
        return Err(charset_err(
            "ZIP_ENTRY_COUNT",
            format!("expected exactly one zip entry, found {}", archive.len()),
        ));
    }

    let mut entry = archive
        .by_index(0)
        .map_err(|e| charset_err("ZIP_DECODE_FAILED", format!("zip entry is unreadable: {e}")))?;
    let mut out = Vec::new();
    entry
        .read_to_end(&mut out)
        .map_err(|e| charset_err("ZIP_DECODE_FAILED", format!("zip entry is unreadable: {e}")))?;
    Ok(out)
}

fn decode_text(bytes: &[u8]) -> Result<Vec<u8>, IngestError> {
    // BOM-declared encodings first.
    if bytes.starts_with(UTF8_BOM) {
        return validate_utf8(bytes[UTF8_BOM.len()..].to_vec());
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return decode_utf16(&bytes[2..], true);
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return decode_utf16(&bytes[2..], false);
    }

    // BOM-less UTF-16 shows its endianness in the leading '<'.
    if bytes.len() >= 2 && bytes[0] == b'<' && bytes[1] == 0x00 {
        return decode_utf16(bytes, true);
    }
    if bytes.len() >= 2 && bytes[0] == 0x00 && bytes[1] == b'<' {
        return decode_utf16(bytes, false);
    }

    validate_utf8(bytes.to_vec())
}

fn validate_utf8(bytes: Vec<u8>) -> Result<Vec<u8>, IngestError> {
    match std::str::from_utf8(&bytes) {
        Ok(_) => Ok(bytes),
        Err(e) => Err(charset_err(
            "INVALID_UTF8",
            format!("payload is not valid UTF-8 at byte {}", e.valid_up_to()),
        )),
    }
}

fn decode_utf16(bytes: &[u8], little_endian: bool) -> Result<Vec<u8>, IngestError> {
    if bytes.len() % 2 != 0 {
        return Err(charset_err("INVALID_UTF16", "UTF-16 payload has odd byte length"));
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();

    let decoded = String::from_utf16(&units)
        .map_err(|e| charset_err("INVALID_UTF16", format!("UTF-16 payload is malformed: {e}")))?;
    Ok(decoded.into_bytes())
}
