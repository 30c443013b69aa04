// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DHPO Client
//!
//! Operation-specific layer over the SOAP gateway implementing the four
//! facility-authenticated DHPO operations. Each call extracts its result
//! code and payload fields from the generic envelope; file lists arrive as
//! escaped XML inside a single field and are re-parsed here.
//!
//! Application-level retry policy: a `-4` result is retried once per call;
//! every other negative code is returned to the coordinator, which logs it
//! and skips the facility for the cycle. Transport retries live below, in
//! the gateway.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::time::Instant;
use tracing::{debug, warn};

use claims_pipeline_domain::services::{
    DownloadedFile, FacilityCredentials, SearchWindow, TransactionGateway, TransactionHandle,
};
use claims_pipeline_domain::value_objects::result_code::DhpoResultCode;
use claims_pipeline_domain::IngestError;

use crate::infrastructure::adapters::soap_gateway::{HttpSoapGateway, SoapResponse, SoapVersion};
use crate::infrastructure::metrics::IngestionMetrics;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::sync::Arc;

const SERVICE_NAMESPACE: &str = "http://www.eclaimlink.ae/";
/// Timestamp format the search operation expects.
const SEARCH_TIME_FORMAT: &str = "%d%m%Y%H%M%S";

pub struct DhpoGateway {
    gateway: HttpSoapGateway,
    metrics: Arc<IngestionMetrics>,
}

impl DhpoGateway {
    pub fn new(gateway: HttpSoapGateway, metrics: Arc<IngestionMetrics>) -> Self {
        Self { gateway, metrics }
    }

    /// One operation call with the single `-4` application-level retry.
    async fn call_op(
        &self,
        facility: &FacilityCredentials,
        operation: &'static str,
        result_field: &str,
        params: &[(&str, &str)],
    ) -> Result<(DhpoResultCode, SoapResponse), IngestError> {
        let soap_action = format!("{SERVICE_NAMESPACE}{operation}");

        let mut retried = false;
        loop {
            let response = self
                .gateway
                .call(&facility.endpoint_url, SoapVersion::V11, SERVICE_NAMESPACE, &soap_action, operation, params)
                .await?;
            let code = DhpoResultCode(response.int_field(result_field)?);

            let outcome = if code.is_success() { "ok" } else { "error" };
            self.metrics.soap_calls.with_label_values(&[operation, outcome]).inc();

            if code.is_retryable() && !retried {
                retried = true;
                warn!(operation, facility = %facility.facility_code, "result code -4, retrying once");
                continue;
            }
            if let Some(message) = response.field("errorMessage") {
                if code.is_success() {
                    debug!(operation, facility = %facility.facility_code, "remote warning: {message}");
                }
            }
            return Ok((code, response));
        }
    }
}

/// Parses the escaped `<Files>` list carried inside a response field.
fn parse_file_list(xml: &str) -> Result<Vec<TransactionHandle>, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut files = Vec::new();
    let mut current: Option<TransactionHandle> = None;
    let mut leaf: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"File" => {
                    current = Some(TransactionHandle {
                        file_id: String::new(),
                        file_name: None,
                        is_downloaded: None,
                    });
                }
                other => leaf = Some(String::from_utf8_lossy(other).to_string()),
            },
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| IngestError::transport(format!("file list is malformed: {e}")))?;
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if let (Some(handle), Some(field)) = (current.as_mut(), leaf.as_deref()) {
                    match field {
                        "FileID" => handle.file_id = trimmed.to_string(),
                        "FileName" => handle.file_name = Some(trimmed.to_string()),
                        "IsDownloaded" => handle.is_downloaded = Some(trimmed.eq_ignore_ascii_case("true")),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"File" {
                    if let Some(handle) = current.take() {
                        if !handle.file_id.is_empty() {
                            files.push(handle);
                        }
                    }
                } else {
                    leaf = None;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(IngestError::transport(format!("file list is malformed: {e}"))),
        }
    }

    Ok(files)
}

fn files_from(response: &SoapResponse) -> Result<Vec<TransactionHandle>, IngestError> {
    match response.field("xmlTransaction") {
        Some(xml) if !xml.trim().is_empty() => parse_file_list(xml),
        _ => Ok(Vec::new()),
    }
}

#[async_trait]
impl TransactionGateway for DhpoGateway {
    async fn get_new_transactions(
        &self,
        facility: &FacilityCredentials,
    ) -> Result<(DhpoResultCode, Vec<TransactionHandle>), IngestError> {
        let (code, response) = self
            .call_op(
                facility,
                "GetNewTransactions",
                "GetNewTransactionsResult",
                &[
                    ("login", &facility.credentials.username),
                    ("pwd", &facility.credentials.password),
                ],
            )
            .await?;

        let files = if code.is_success() { files_from(&response)? } else { Vec::new() };
        Ok((code, files))
    }

    async fn search_transactions(
        &self,
        facility: &FacilityCredentials,
        window: &SearchWindow,
    ) -> Result<(DhpoResultCode, Vec<TransactionHandle>), IngestError> {
        let direction = window.direction.to_string();
        let transaction_id = window.transaction_id.to_string();
        let from = window.from.format(SEARCH_TIME_FORMAT).to_string();
        let to = window.to.format(SEARCH_TIME_FORMAT).to_string();
        let skip = window.skip.to_string();
        let take = window.take.to_string();

        let (code, response) = self
            .call_op(
                facility,
                "SearchTransactions",
                "SearchTransactionsResult",
                &[
                    ("login", &facility.credentials.username),
                    ("pwd", &facility.credentials.password),
                    ("direction", &direction),
                    ("callerLicense", &facility.facility_code),
                    ("ePartner", ""),
                    ("transactionID", &transaction_id),
                    ("transactionStatus", "1"),
                    ("transactionFileNameFrom", &from),
                    ("transactionFileNameTo", &to),
                    ("minRecordCount", &skip),
                    ("maxRecordCount", &take),
                ],
            )
            .await?;

        let files = if code.is_success() { files_from(&response)? } else { Vec::new() };
        Ok((code, files))
    }

    async fn download_transaction_file(
        &self,
        facility: &FacilityCredentials,
        file_id: &str,
    ) -> Result<(DhpoResultCode, DownloadedFile), IngestError> {
        let started = Instant::now();
        let (code, response) = self
            .call_op(
                facility,
                "DownloadTransactionFile",
                "DownloadTransactionFileResult",
                &[
                    ("login", &facility.credentials.username),
                    ("pwd", &facility.credentials.password),
                    ("fileId", file_id),
                ],
            )
            .await?;
        let download_millis = started.elapsed().as_millis() as u64;

        let bytes = if code.is_success() {
            let encoded = response
                .field("file")
                .ok_or_else(|| IngestError::transport("download response is missing <file>"))?;
            BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| IngestError::transport(format!("downloaded payload is not base64: {e}")))?
        } else {
            Vec::new()
        };

        Ok((
            code,
            DownloadedFile {
                file_name: response.field("fileName").map(String::from),
                bytes,
                download_millis,
            },
        ))
    }

    async fn set_transaction_downloaded(
        &self,
        facility: &FacilityCredentials,
        file_id: &str,
    ) -> Result<(DhpoResultCode, Option<String>), IngestError> {
        let (code, response) = self
            .call_op(
                facility,
                "SetTransactionDownloaded",
                "SetTransactionDownloadedResult",
                &[
                    ("login", &facility.credentials.username),
                    ("pwd", &facility.credentials.password),
                    ("fileId", file_id),
                ],
            )
            .await?;

        Ok((code, response.field("errorMessage").map(String::from)))
    }
}
