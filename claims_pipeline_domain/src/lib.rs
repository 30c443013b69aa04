// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Claims Pipeline Domain Layer
//!
//! Pure business logic for healthcare claim ingestion: the parsed document
//! model (submissions and remittances), the value objects shared across the
//! pipeline (statuses, event types, stages, result codes, staged payloads),
//! shape-level validation, payment status derivation, and the ports that
//! infrastructure adapters implement.
//!
//! ## Layering Rules
//!
//! This crate depends on no async runtime, no database driver, and no HTTP
//! client. I/O-bound ports (`DocumentPersister`, `ReferenceResolver`,
//! `TransactionGateway`, ...) are `async_trait` traits implemented by the
//! infrastructure layer; everything else is synchronous and deterministic.
//!
//! ## Module Structure
//!
//! - [`entities`] - parsed document DTOs and the file envelope
//! - [`value_objects`] - statuses, stages, result codes, work items, staging
//! - [`services`] - validation, status derivation, and domain-facing ports
//! - [`repositories`] - persistence ports
//! - [`error`] - the [`IngestError`] hierarchy

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

// Primary re-exports so callers can use `claims_pipeline_domain::IngestError`.
pub use error::IngestError;
pub use value_objects::claim_status::ClaimStatus;
pub use value_objects::event_type::ClaimEventType;
pub use value_objects::pipeline_stage::{ErrorObjectType, PipelineStage};
pub use value_objects::result_code::DhpoResultCode;
pub use value_objects::staged_payload::StagedPayload;
pub use value_objects::work_item::{SourceHandle, WorkItem};
