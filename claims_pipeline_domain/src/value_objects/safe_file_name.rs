// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File Id Derivation
//!
//! Staged files are addressed by a safe identifier. A server-provided name is
//! used only when it looks like a plain `.xml` file name with no path
//! separators and no traversal segments; anything else falls back to the
//! SHA-256 of the payload bytes.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

static SAFE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 ._\-]*\.xml$").expect("safe-name regex is valid"));

/// Checks whether a server-provided file name is safe to use verbatim.
pub fn is_safe_name(name: &str) -> bool {
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return false;
    }
    SAFE_NAME.is_match(name)
}

/// Derives the staging/storage identifier for a payload.
///
/// Prefers the server-provided name when it passes the safe-name check;
/// otherwise hashes the bytes and appends `.xml`.
pub fn derive_file_id(server_name: Option<&str>, bytes: &[u8]) -> String {
    if let Some(name) = server_name {
        let trimmed = name.trim();
        if is_safe_name(trimmed) {
            return trimmed.to_string();
        }
    }
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{}.xml", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_xml_names() {
        assert!(is_safe_name("SUB-20250214-001.xml"));
        assert!(is_safe_name("remit 44.xml"));
    }

    #[test]
    fn rejects_traversal_and_separators() {
        assert!(!is_safe_name("../evil.xml"));
        assert!(!is_safe_name("a/b.xml"));
        assert!(!is_safe_name("a\\b.xml"));
        assert!(!is_safe_name("payload.exe"));
        assert!(!is_safe_name(".hidden.xml"));
    }

    #[test]
    fn falls_back_to_content_hash() {
        let id = derive_file_id(Some("../evil.xml"), b"payload");
        assert!(id.ends_with(".xml"));
        assert_eq!(id.len(), 64 + 4);
        // Deterministic for identical bytes.
        assert_eq!(id, derive_file_id(None, b"payload"));
    }

    #[test]
    fn prefers_safe_server_name() {
        assert_eq!(derive_file_id(Some("file-1.xml"), b"x"), "file-1.xml");
    }
}
