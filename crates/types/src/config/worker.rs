// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::num::NonZeroU16;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retries::RetryPolicy;

/// # Worker options
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct WorkerOptions {
    /// # Partitions
    ///
    /// Number of partitions processing process instances on this node.
    pub num_partitions: NonZeroU16,

    /// # Internal queue for partition processor communication
    pub internal_queue_length: usize,

    /// # Store commit retry policy
    ///
    /// Retry policy applied when committing the state of a processed record fails with a
    /// transient error. Once exhausted, the partition stops processing.
    pub commit_retry_policy: RetryPolicy,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            num_partitions: NonZeroU16::new(4).expect("non-zero"),
            internal_queue_length: 64,
            commit_retry_policy: RetryPolicy::exponential(
                Duration::from_millis(50),
                2.0,
                Some(10),
                Some(Duration::from_secs(5)),
            ),
        }
    }
}
