// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DHPO Transaction Gateway Port
//!
//! The four facility-authenticated SOAP operations the fetch coordinator
//! drives: delta listing, windowed search, file download, and the
//! post-verify downloaded acknowledgement. Implementations own envelope
//! construction, transport retries, and result-code extraction; callers see
//! typed results and [`crate::IngestError`] failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::services::credential_cipher::PlainCredentials;
use crate::value_objects::result_code::DhpoResultCode;
use crate::IngestError;

/// Per-facility call parameters: endpoint plus decrypted credentials.
#[derive(Debug, Clone)]
pub struct FacilityCredentials {
    pub facility_code: String,
    pub endpoint_url: String,
    pub credentials: PlainCredentials,
}

/// One transaction listed by `GetNewTransactions` or `SearchTransactions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHandle {
    pub file_id: String,
    pub file_name: Option<String>,
    pub is_downloaded: Option<bool>,
}

/// Result of `DownloadTransactionFile`.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
    /// Wall-clock transport latency, input to the staging policy.
    pub download_millis: u64,
}

/// Search window and paging for `SearchTransactions`.
#[derive(Debug, Clone, Copy)]
pub struct SearchWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// DHPO transaction id: 2 = submissions sent, 8 = remittances received.
    pub transaction_id: i32,
    /// 1 = sent by the facility, 2 = received by it.
    pub direction: i32,
    pub skip: i32,
    pub take: i32,
}

/// Facility-authenticated DHPO operations.
#[async_trait]
pub trait TransactionGateway: Send + Sync {
    /// Lists transactions not yet marked downloaded for this facility.
    async fn get_new_transactions(
        &self,
        facility: &FacilityCredentials,
    ) -> Result<(DhpoResultCode, Vec<TransactionHandle>), IngestError>;

    /// Searches a time window for a direction/transaction pair.
    async fn search_transactions(
        &self,
        facility: &FacilityCredentials,
        window: &SearchWindow,
    ) -> Result<(DhpoResultCode, Vec<TransactionHandle>), IngestError>;

    /// Downloads one transaction file.
    async fn download_transaction_file(
        &self,
        facility: &FacilityCredentials,
        file_id: &str,
    ) -> Result<(DhpoResultCode, DownloadedFile), IngestError>;

    /// Acknowledges a fully-verified download.
    async fn set_transaction_downloaded(
        &self,
        facility: &FacilityCredentials,
        file_id: &str,
    ) -> Result<(DhpoResultCode, Option<String>), IngestError>;
}
