// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain services and infrastructure ports.
//!
//! Synchronous, deterministic business logic (validation, status derivation)
//! lives here alongside the async ports that infrastructure adapters
//! implement (reference resolution, credential encryption, the DHPO
//! transaction gateway, toggles).

pub mod credential_cipher;
pub mod dto_validator;
pub mod reference_resolver;
pub mod status_derivation;
pub mod toggle_store;
pub mod transaction_gateway;

pub use credential_cipher::{CredentialCipher, CryptoMetadata, EncryptedField, PlainCredentials};
pub use dto_validator::{
    activity_missing_fields, claim_missing_fields, diagnosis_missing_fields, header_missing_fields,
    remittance_activity_missing_fields, remittance_claim_missing_fields,
};
pub use reference_resolver::{CodeKind, DiscoveryContext, ReferenceResolver};
pub use status_derivation::derive_remittance_status;
pub use toggle_store::ToggleStore;
pub use transaction_gateway::{
    DownloadedFile, FacilityCredentials, SearchWindow, TransactionGateway, TransactionHandle,
};
