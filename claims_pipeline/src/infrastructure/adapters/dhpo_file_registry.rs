// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! In-memory registry memoizing which facility a downloaded file belongs
//! to, so the post-verify acknowledgement can find its way back to the
//! right DHPO endpoint. Entries are removed once acked.

use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct DhpoFileRegistry {
    entries: RwLock<HashMap<String, String>>,
}

impl DhpoFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, file_id: impl Into<String>, facility_code: impl Into<String>) {
        self.entries.write().insert(file_id.into(), facility_code.into());
    }

    pub fn facility_for(&self, file_id: &str) -> Option<String> {
        self.entries.read().get(file_id).cloned()
    }

    /// Removes and returns the owning facility, if registered.
    pub fn take(&self, file_id: &str) -> Option<String> {
        self.entries.write().remove(file_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
