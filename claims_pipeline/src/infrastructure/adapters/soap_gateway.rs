// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SOAP Gateway
//!
//! Builds, sends, and retries SOAP envelopes over HTTP, and parses the
//! response envelope into a flat field map. The gateway is operation-
//! agnostic: the DHPO client layers operation-specific extraction (result
//! codes, file lists, payloads) on top of [`SoapResponse`].
//!
//! Transport failures are retried with exponential backoff up to the
//! configured attempt count; application-level result codes are not
//! interpreted here.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use claims_pipeline_domain::IngestError;

use crate::infrastructure::config::SoapConfig;

/// SOAP protocol version for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoapVersion {
    V11,
    V12,
}

impl SoapVersion {
    fn envelope_namespace(self) -> &'static str {
        match self {
            SoapVersion::V11 => "http://schemas.xmlsoap.org/soap/envelope/",
            SoapVersion::V12 => "http://www.w3.org/2003/05/soap-envelope",
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            SoapVersion::V11 => "text/xml; charset=utf-8",
            SoapVersion::V12 => "application/soap+xml; charset=utf-8",
        }
    }
}

/// Parsed response envelope: every leaf element's text, keyed by local
/// name. Later occurrences of a repeated name overwrite earlier ones;
/// repeated structures (file lists) travel as escaped XML inside a single
/// field and are re-parsed by the caller.
#[derive(Debug, Clone, Default)]
pub struct SoapResponse {
    fields: HashMap<String, String>,
}

impl SoapResponse {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Extracts a required integer field (typically the operation result).
    pub fn int_field(&self, name: &str) -> Result<i64, IngestError> {
        let raw = self
            .field(name)
            .ok_or_else(|| IngestError::transport(format!("response is missing <{name}>")))?;
        raw.trim()
            .parse::<i64>()
            .map_err(|e| IngestError::transport(format!("<{name}> is not an integer ({raw:?}): {e}")))
    }
}

/// Builds a SOAP envelope for `operation` in the service namespace with
/// simple text parameters, XML-escaping every value.
pub fn build_envelope(
    version: SoapVersion,
    service_namespace: &str,
    operation: &str,
    params: &[(&str, &str)],
) -> String {
    let mut body = String::new();
    for (name, value) in params {
        body.push_str(&format!("<{name}>{}</{name}>", escape(*value)));
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <soap:Envelope xmlns:soap=\"{env}\">\
         <soap:Body>\
         <{operation} xmlns=\"{ns}\">{body}</{operation}>\
         </soap:Body>\
         </soap:Envelope>",
        env = version.envelope_namespace(),
        ns = service_namespace,
    )
}

/// Parses a response envelope into a flat field map, surfacing SOAP faults
/// as transport errors.
pub fn parse_envelope(xml: &str) -> Result<SoapResponse, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut response = SoapResponse::default();
    let mut path: Vec<String> = Vec::new();
    let mut fault_text: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                path.push(name);
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| IngestError::transport(format!("response envelope is malformed: {e}")))?;
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if let Some(leaf) = path.last() {
                    if path.iter().any(|p| p == "Fault") && (leaf == "faultstring" || leaf == "Text") {
                        fault_text = Some(trimmed.to_string());
                    }
                    response.fields.insert(leaf.clone(), trimmed.to_string());
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(IngestError::transport(format!("response envelope is malformed: {e}"))),
        }
    }

    if let Some(fault) = fault_text {
        return Err(IngestError::transport(format!("SOAP fault: {fault}")));
    }
    Ok(response)
}

/// HTTP transport with retry/backoff.
pub struct HttpSoapGateway {
    client: reqwest::Client,
    config: SoapConfig,
}

impl HttpSoapGateway {
    pub fn new(config: SoapConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| IngestError::transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Sends one SOAP request, retrying transport failures with exponential
    /// backoff. Returns the parsed envelope of the first successful exchange.
    pub async fn call(
        &self,
        endpoint: &str,
        version: SoapVersion,
        service_namespace: &str,
        soap_action: &str,
        operation: &str,
        params: &[(&str, &str)],
    ) -> Result<SoapResponse, IngestError> {
        let envelope = build_envelope(version, service_namespace, operation, params);

        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(250);
        loop {
            attempt += 1;
            match self.send_once(endpoint, version, soap_action, &envelope).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt <= self.config.transport_retries && e.is_recoverable() => {
                    warn!(operation, attempt, "transport failure, retrying in {backoff:?}: {e}");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        endpoint: &str,
        version: SoapVersion,
        soap_action: &str,
        envelope: &str,
    ) -> Result<SoapResponse, IngestError> {
        debug!(endpoint, soap_action, "sending SOAP request");

        let mut request = self
            .client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, version.content_type())
            .body(envelope.to_string());
        if version == SoapVersion::V11 {
            request = request.header("SOAPAction", format!("\"{soap_action}\""));
        }

        let response = request
            .send()
            .await
            .map_err(|e| IngestError::transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| IngestError::transport(format!("failed to read response body: {e}")))?;

        // SOAP faults ride on 500s; parse the envelope either way so the
        // fault text survives into the error.
        if !status.is_success() && !status.is_server_error() {
            return Err(IngestError::transport(format!("HTTP status {status}")));
        }

        parse_envelope(&body)
    }
}
