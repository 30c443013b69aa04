// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingestion Error System
//!
//! Hierarchical error type for the claims ingestion domain. Variants map
//! one-to-one onto the operational error taxonomy recorded in the
//! `claims_ingestion_error` table: parse, validate, persist, verify, ack,
//! transport, and crypto failures, plus the infrastructure categories
//! (database, I/O, configuration, timeout, cancellation, backpressure).
//!
//! ## Design
//!
//! - **Domain-specific**: variants describe ingestion failures, not library
//!   failures; adapters convert driver errors at the boundary.
//! - **Actionable**: parse errors carry the offending object type and key so
//!   operators can locate the bad element inside a multi-claim file.
//! - **Recoverability-aware**: [`IngestError::is_recoverable`] drives the
//!   `retryable` flag on persisted error records.

use thiserror::Error;

use crate::value_objects::pipeline_stage::ErrorObjectType;

/// Structured payload carried by parse failures.
///
/// A parse failure aborts the whole file; the object type/key locate the
/// element the reader was inside when the document stopped making sense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    /// Stable error code, e.g. `MALFORMED_XML`, `MISSING_HEADER`.
    pub code: String,
    /// The element class being parsed when the failure occurred.
    pub object_type: ErrorObjectType,
    /// Business key of the offending object, when known (claim id, activity id).
    pub object_key: Option<String>,
    /// Human-readable cause.
    pub cause: String,
}

impl ParseFailure {
    pub fn new(
        code: impl Into<String>,
        object_type: ErrorObjectType,
        object_key: Option<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            object_type,
            object_key,
            cause: cause.into(),
        }
    }
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.object_key {
            Some(key) => write!(f, "{} at {}[{}]: {}", self.code, self.object_type, key, self.cause),
            None => write!(f, "{} at {}: {}", self.code, self.object_type, self.cause),
        }
    }
}

/// Errors raised anywhere in the ingestion domain.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IngestError {
    #[error("Parse error: {0}")]
    Parse(ParseFailure),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Verification error: {0}")]
    Verification(String),

    #[error("Acknowledgement error: {0}")]
    Ack(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote fault (code {code}): {message}")]
    RemoteFault { code: i64, message: String },

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Staging error: {0}")]
    Staging(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Work queue is full")]
    QueueFull,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Facility not found: {0}")]
    FacilityNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Creates a parse error from its structured parts.
    pub fn parse(
        code: impl Into<String>,
        object_type: ErrorObjectType,
        object_key: Option<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self::Parse(ParseFailure::new(code, object_type, object_key, cause))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether an operational rerun of the same work item is expected to
    /// succeed. Drives the `retryable` flag on recorded errors.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IngestError::Transport(_)
                | IngestError::Timeout(_)
                | IngestError::Io(_)
                | IngestError::QueueFull
                | IngestError::RemoteFault { code: -4, .. }
        )
    }

    /// Coarse category used for structured logging and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            IngestError::Parse(_) => "parse",
            IngestError::Validation(_) => "validate",
            IngestError::Persistence(_) | IngestError::Database(_) => "persist",
            IngestError::Verification(_) => "verify",
            IngestError::Ack(_) => "ack",
            IngestError::Transport(_) | IngestError::RemoteFault { .. } | IngestError::Timeout(_) => "transport",
            IngestError::Crypto(_) => "crypto",
            IngestError::Staging(_) | IngestError::Io(_) => "io",
            IngestError::InvalidConfiguration(_) => "configuration",
            IngestError::QueueFull => "backpressure",
            IngestError::Cancelled(_) => "cancelled",
            IngestError::FacilityNotFound(_) => "configuration",
            IngestError::Internal(_) => "internal",
        }
    }
}
