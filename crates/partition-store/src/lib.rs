// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

pub mod deferred_event_table;
pub mod element_instance_table;
pub mod fsm_table;
pub mod keys;
mod partition_store;

#[cfg(test)]
mod tests;

pub use partition_store::{PartitionStore, PartitionStoreTransaction};
