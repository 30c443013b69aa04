// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Persistence ports implemented by the infrastructure layer.

pub mod document_persister;
pub mod facility_directory;
pub mod ingestion_store;

pub use document_persister::DocumentPersister;
pub use facility_directory::{FacilityConfigRow, FacilityDirectory};
pub use ingestion_store::{IngestionErrorRecord, IngestionStore, PersistedCounts, RunStats};
