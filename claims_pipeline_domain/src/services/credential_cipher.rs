// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Credential Cipher Port (AME)
//!
//! Application-managed envelope encryption of facility credentials. Each
//! facility row stores two AES-256-GCM blobs (username, password), each
//! sealed with an independent 96-bit IV and bound to the facility code via
//! AAD, plus a JSON metadata envelope describing how to open them again.
//!
//! Decrypted credentials are wrapped in a zeroize-on-drop holder so they do
//! not linger in memory after the SOAP call that needed them.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::IngestError;

/// One encrypted field as persisted: IV-prefixed ciphertext plus the
/// parameters needed to reverse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    /// 96-bit IV, also mirrored in [`CryptoMetadata`].
    pub iv: Vec<u8>,
    /// Ciphertext including the GCM tag.
    pub ciphertext: Vec<u8>,
    pub tag_bits: u32,
    pub key_id: String,
}

/// JSON metadata stored next to the blobs (`crypto_meta` column).
///
/// Field names follow the persisted wire format, hence the serde renames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoMetadata {
    pub alg: String,
    #[serde(rename = "ivLogin")]
    pub iv_login: String,
    #[serde(rename = "ivPwd")]
    pub iv_pwd: String,
    #[serde(rename = "keyId")]
    pub key_id: String,
    /// AAD binding; always the facility code.
    pub aad: String,
    #[serde(rename = "tagBits")]
    pub tag_bits: u32,
}

/// Decrypted credential pair, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PlainCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for PlainCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secrets, even at debug level.
        f.debug_struct("PlainCredentials").finish_non_exhaustive()
    }
}

/// AES-GCM envelope operations over facility credentials.
pub trait CredentialCipher: Send + Sync {
    /// Encrypts a credential pair for `facility_code`, producing the two
    /// field blobs and the metadata envelope.
    fn encrypt_credentials(
        &self,
        facility_code: &str,
        credentials: &PlainCredentials,
    ) -> Result<(EncryptedField, EncryptedField, CryptoMetadata), IngestError>;

    /// Decrypts a credential pair using the in-row metadata (so rows sealed
    /// under a retired key id keep working during rotation).
    fn decrypt_credentials(
        &self,
        facility_code: &str,
        username_enc: &EncryptedField,
        password_enc: &EncryptedField,
        metadata: &CryptoMetadata,
    ) -> Result<PlainCredentials, IngestError>;

    /// Identifier of the key new encryptions are sealed under.
    fn active_key_id(&self) -> &str;
}
