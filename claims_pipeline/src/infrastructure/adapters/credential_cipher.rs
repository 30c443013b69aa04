// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # AME Credential Cipher
//!
//! AES-256-GCM envelope encryption of facility credentials. Each field gets
//! an independent 96-bit random IV; the AAD is the facility code, which
//! binds a blob to its row — moving ciphertext between facilities fails
//! authentication. The GCM tag rides at the end of the ciphertext.
//!
//! ## Key material
//!
//! The key-encryption key is loaded once at startup from either a raw
//! 32-byte key file or a JSON keyring mapping key ids to base64 keys. A
//! keyring may carry a passphrase digest; when the configuration names a
//! passphrase environment variable, its value must hash to that digest
//! before the keyring is accepted. Retired keys stay in the keyring so
//! rows sealed under them remain readable until the rotation job has
//! re-encrypted everything.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use zeroize::Zeroizing;

use claims_pipeline_domain::services::{CredentialCipher, CryptoMetadata, EncryptedField, PlainCredentials};
use claims_pipeline_domain::IngestError;

use crate::infrastructure::config::{AmeConfig, KeystoreKind};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

const GCM_IV_LEN: usize = 12;
const KEY_LEN: usize = 32;
/// The only tag size this implementation produces.
const SUPPORTED_TAG_BITS: u32 = 128;

/// Loaded key material: every known KEK, indexed by key id.
pub struct Keyring {
    keys: HashMap<String, Zeroizing<[u8; KEY_LEN]>>,
}

/// On-disk JSON shape of a keyring file.
#[derive(Deserialize)]
struct KeyringFile {
    /// Hex SHA-256 of the passphrase, when the keyring is passphrase-gated.
    #[serde(default)]
    password_sha256: Option<String>,
    /// key id → base64-encoded 32-byte key.
    keys: HashMap<String, String>,
}

impl Keyring {
    /// Loads key material according to the AME configuration.
    pub fn load(config: &AmeConfig) -> Result<Self, IngestError> {
        match config.keystore.kind {
            KeystoreKind::Raw => Self::load_raw(&config.keystore.path, &config.key_id),
            KeystoreKind::Keyring => {
                Self::load_keyring(&config.keystore.path, config.keystore.password_env.as_deref())
            }
        }
    }

    fn load_raw(path: &Path, key_id: &str) -> Result<Self, IngestError> {
        let bytes = std::fs::read(path)
            .map_err(|e| IngestError::crypto(format!("cannot read key file {}: {e}", path.display())))?;
        let key: [u8; KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| IngestError::crypto(format!("key file must hold exactly {KEY_LEN} bytes, found {}", bytes.len())))?;

        let mut keys = HashMap::new();
        keys.insert(key_id.to_string(), Zeroizing::new(key));
        Ok(Self { keys })
    }

    fn load_keyring(path: &Path, password_env: Option<&str>) -> Result<Self, IngestError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| IngestError::crypto(format!("cannot read keyring {}: {e}", path.display())))?;
        let file: KeyringFile =
            serde_json::from_str(&raw).map_err(|e| IngestError::crypto(format!("keyring is not valid JSON: {e}")))?;

        if let Some(expected) = &file.password_sha256 {
            let var = password_env
                .ok_or_else(|| IngestError::crypto("keyring is passphrase-gated but no password_env is configured"))?;
            let passphrase = std::env::var(var)
                .map_err(|_| IngestError::crypto(format!("passphrase environment variable {var} is not set")))?;
            let digest = hex::encode(Sha256::digest(passphrase.as_bytes()));
            if !digest.eq_ignore_ascii_case(expected) {
                return Err(IngestError::crypto("keyring passphrase does not match"));
            }
        }

        let mut keys = HashMap::new();
        for (key_id, encoded) in file.keys {
            let decoded = BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| IngestError::crypto(format!("key {key_id} is not base64: {e}")))?;
            let key: [u8; KEY_LEN] = decoded
                .as_slice()
                .try_into()
                .map_err(|_| IngestError::crypto(format!("key {key_id} must decode to {KEY_LEN} bytes")))?;
            keys.insert(key_id, Zeroizing::new(key));
        }

        if keys.is_empty() {
            return Err(IngestError::crypto("keyring holds no keys"));
        }
        Ok(Self { keys })
    }

    /// Builds a keyring from in-memory material; used by tests and tooling.
    pub fn from_keys(keys: impl IntoIterator<Item = (String, [u8; KEY_LEN])>) -> Self {
        Self {
            keys: keys.into_iter().map(|(id, key)| (id, Zeroizing::new(key))).collect(),
        }
    }

    fn key(&self, key_id: &str) -> Result<&Zeroizing<[u8; KEY_LEN]>, IngestError> {
        self.keys
            .get(key_id)
            .ok_or_else(|| IngestError::crypto(format!("no key material for key id {key_id:?}")))
    }
}

/// The application-managed-encryption cipher.
pub struct AmeCipher {
    keyring: Keyring,
    active_key_id: String,
    tag_bits: u32,
    rng: SystemRandom,
}

impl AmeCipher {
    pub fn new(keyring: Keyring, active_key_id: impl Into<String>, tag_bits: u32) -> Result<Self, IngestError> {
        if tag_bits != SUPPORTED_TAG_BITS {
            return Err(IngestError::crypto(format!(
                "unsupported GCM tag size {tag_bits}; this implementation produces {SUPPORTED_TAG_BITS}-bit tags"
            )));
        }
        let active_key_id = active_key_id.into();
        // Fail at construction, not at first encrypt.
        keyring.key(&active_key_id)?;
        Ok(Self {
            keyring,
            active_key_id,
            tag_bits,
            rng: SystemRandom::new(),
        })
    }

    /// Convenience constructor wiring the configuration end to end.
    pub fn from_config(config: &AmeConfig) -> Result<Self, IngestError> {
        Self::new(Keyring::load(config)?, config.key_id.clone(), config.gcm_tag_bits)
    }

    fn generate_iv(&self) -> Result<[u8; GCM_IV_LEN], IngestError> {
        let mut iv = [0u8; GCM_IV_LEN];
        self.rng
            .fill(&mut iv)
            .map_err(|e| IngestError::crypto(format!("failed to generate IV: {e:?}")))?;
        Ok(iv)
    }

    fn encrypt_field(&self, facility_code: &str, plaintext: &[u8]) -> Result<EncryptedField, IngestError> {
        let key = self.keyring.key(&self.active_key_id)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));
        let iv = self.generate_iv()?;

        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: plaintext,
                    aad: facility_code.as_bytes(),
                },
            )
            .map_err(|_| IngestError::crypto("AES-GCM encryption failed"))?;

        Ok(EncryptedField {
            iv: iv.to_vec(),
            ciphertext,
            tag_bits: self.tag_bits,
            key_id: self.active_key_id.clone(),
        })
    }

    fn decrypt_field(&self, facility_code: &str, field: &EncryptedField) -> Result<Vec<u8>, IngestError> {
        if field.iv.len() != GCM_IV_LEN {
            return Err(IngestError::crypto(format!(
                "encrypted field carries a {}-byte IV, expected {GCM_IV_LEN}",
                field.iv.len()
            )));
        }
        let key = self.keyring.key(&field.key_id)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));

        cipher
            .decrypt(
                Nonce::from_slice(&field.iv),
                Payload {
                    msg: &field.ciphertext,
                    aad: facility_code.as_bytes(),
                },
            )
            .map_err(|_| IngestError::crypto("AES-GCM decryption failed (wrong key, AAD, or tampered data)"))
    }
}

impl CredentialCipher for AmeCipher {
    fn encrypt_credentials(
        &self,
        facility_code: &str,
        credentials: &PlainCredentials,
    ) -> Result<(EncryptedField, EncryptedField, CryptoMetadata), IngestError> {
        let username_enc = self.encrypt_field(facility_code, credentials.username.as_bytes())?;
        let password_enc = self.encrypt_field(facility_code, credentials.password.as_bytes())?;

        let metadata = CryptoMetadata {
            alg: "AES-256-GCM".to_string(),
            iv_login: BASE64.encode(&username_enc.iv),
            iv_pwd: BASE64.encode(&password_enc.iv),
            key_id: self.active_key_id.clone(),
            aad: facility_code.to_string(),
            tag_bits: self.tag_bits,
        };

        Ok((username_enc, password_enc, metadata))
    }

    fn decrypt_credentials(
        &self,
        facility_code: &str,
        username_enc: &EncryptedField,
        password_enc: &EncryptedField,
        metadata: &CryptoMetadata,
    ) -> Result<PlainCredentials, IngestError> {
        if metadata.aad != facility_code {
            return Err(IngestError::crypto(format!(
                "metadata AAD {:?} does not match facility {:?}",
                metadata.aad, facility_code
            )));
        }

        let username = self.decrypt_field(facility_code, username_enc)?;
        let password = self.decrypt_field(facility_code, password_enc)?;

        Ok(PlainCredentials {
            username: String::from_utf8(username)
                .map_err(|e| IngestError::crypto(format!("decrypted username is not UTF-8: {e}")))?,
            password: String::from_utf8(password)
                .map_err(|e| IngestError::crypto(format!("decrypted password is not UTF-8: {e}")))?,
        })
    }

    fn active_key_id(&self) -> &str {
        &self.active_key_id
    }
}
