// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Outbound adapters: the AME credential cipher, the SOAP gateway, the DHPO
//! client, and the download registry.

pub mod credential_cipher;
pub mod dhpo_client;
pub mod dhpo_file_registry;
pub mod soap_gateway;

pub use credential_cipher::{AmeCipher, Keyring};
pub use dhpo_client::DhpoGateway;
pub use dhpo_file_registry::DhpoFileRegistry;
pub use soap_gateway::{HttpSoapGateway, SoapResponse, SoapVersion};
