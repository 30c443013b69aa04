// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Process-wide feature toggles backed by a persistent key/value table.
//! Lookups never block scheduling: unknown codes resolve to the caller's
//! fallback, and read failures degrade to the fallback with a logged error
//! on the implementation side.

use async_trait::async_trait;

use crate::IngestError;

/// Toggle codes used by the DHPO integration.
pub mod codes {
    pub const DHPO_GET_NEW_ENABLED: &str = "dhpo.client.getNewEnabled";
    pub const DHPO_SEARCH_ENABLED: &str = "dhpo.search.enabled";
    pub const DHPO_SET_DOWNLOADED_ENABLED: &str = "dhpo.setDownloaded.enabled";
}

/// Persistent feature-flag reads.
#[async_trait]
pub trait ToggleStore: Send + Sync {
    /// Reads one toggle; `default` when the code is absent.
    async fn is_enabled(&self, code: &str, default: bool) -> Result<bool, IngestError>;
}
