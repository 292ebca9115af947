// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

/// # Journal options
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct JournalOptions {
    /// # Index density
    ///
    /// Only every n-th journal index is retained in the in-memory position index. A density of 1
    /// indexes every entry.
    pub index_density: NonZeroU64,

    /// # Maximum segment size
    ///
    /// A new segment file is started once the active one grows beyond this many bytes.
    pub max_segment_size: u64,

    /// # Flush on append
    ///
    /// Flush (fsync) the active segment after every single append. If disabled, appended entries
    /// become durable with the next explicit flush, which the partition processor issues once all
    /// follow-up records of a processed record were appended.
    pub flush_on_append: bool,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            index_density: NonZeroU64::new(100).expect("non-zero"),
            max_segment_size: 64 * 1024 * 1024,
            flush_on_append: false,
        }
    }
}
