// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects shared across the ingestion pipeline.

pub mod claim_status;
pub mod event_type;
pub mod pipeline_stage;
pub mod result_code;
pub mod safe_file_name;
pub mod staged_payload;
pub mod work_item;

pub use claim_status::ClaimStatus;
pub use event_type::ClaimEventType;
pub use pipeline_stage::{ErrorObjectType, PipelineStage};
pub use result_code::DhpoResultCode;
pub use safe_file_name::derive_file_id;
pub use staged_payload::StagedPayload;
pub use work_item::{SourceHandle, WorkItem};
