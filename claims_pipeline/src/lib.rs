// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Claims Pipeline
//!
//! Application and infrastructure layers of the claims ingestion system.
//!
//! ## Overview
//!
//! The pipeline ingests healthcare claim XML documents from two sources (a
//! local filesystem drop zone and the DHPO SOAP service), parses them into
//! the normalized claim model, persists them idempotently with event and
//! status-timeline projection, and reconciles per-claim payment state across
//! the submission → remittance lifecycle.
//!
//! ## Architecture
//!
//! - **Application layer** ([`application`]): the orchestrator with its
//!   bounded work queue, the six-stage ingestion pipeline, the two fetch
//!   adapters, the payment recalculator, and the credential rotation job.
//! - **Infrastructure layer** ([`infrastructure`]): sqlx repositories over
//!   the operational and reference schemas, the quick-xml streaming parsers,
//!   the reqwest SOAP gateway, the AES-GCM credential cipher, the staging
//!   service, configuration, metrics, and runtime helpers.
//!
//! The domain model, validation, status derivation, and all ports live in
//! the `claims-pipeline-domain` crate; the binary entry point and shutdown
//! plumbing live in `claims-pipeline-bootstrap`.

pub mod application;
pub mod infrastructure;
