// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod common;
mod journal;
mod worker;

pub use common::*;
pub use journal::*;
pub use worker::*;

use serde::{Deserialize, Serialize};

use crate::errors::GenericError;
use crate::identifiers::PartitionId;
use crate::retries::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum InvalidConfigurationError {
    #[error("worker.num-partitions must be at most {max}, got {actual}")]
    TooManyPartitions { max: u16, actual: u16 },
    #[error("worker.internal-queue-length must be greater than zero")]
    EmptyInternalQueue,
    #[error("journal.max-segment-size of {0} bytes is too small")]
    SegmentTooSmall(u64),
    #[error("worker.commit-retry-policy must be bounded, infinite retries would hide faults")]
    UnboundedCommitRetries,
}

/// Minimum size of a journal segment, enough to hold the segment header and a small frame.
pub const MIN_SEGMENT_SIZE: u64 = 4 * 1024;

/// # Tokenflow configuration file
///
/// Configuration for the tokenflow server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, derive_builder::Builder)]
#[builder(default)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    #[serde(flatten)]
    pub common: CommonOptions,
    pub journal: JournalOptions,
    pub worker: WorkerOptions,
}

impl Configuration {
    pub fn node_name(&self) -> &str {
        self.common.node_name()
    }

    pub fn validate(&self) -> Result<(), InvalidConfigurationError> {
        let num_partitions = self.worker.num_partitions.get();
        // partition ids are zero based
        if num_partitions - 1 > *PartitionId::MAX {
            return Err(InvalidConfigurationError::TooManyPartitions {
                max: *PartitionId::MAX + 1,
                actual: num_partitions,
            });
        }

        if self.worker.internal_queue_length == 0 {
            return Err(InvalidConfigurationError::EmptyInternalQueue);
        }

        if self.journal.max_segment_size < MIN_SEGMENT_SIZE {
            return Err(InvalidConfigurationError::SegmentTooSmall(
                self.journal.max_segment_size,
            ));
        }

        if !matches!(self.worker.commit_retry_policy, RetryPolicy::None)
            && self.worker.commit_retry_policy.max_attempts().is_none()
        {
            return Err(InvalidConfigurationError::UnboundedCommitRetries);
        }

        Ok(())
    }

    /// Dumps the configuration to a string
    pub fn dump(&self) -> Result<String, GenericError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
