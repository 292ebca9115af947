// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Process instance execution: deployed processes, the BPMN step processor and the partition
//! processors running it.

mod exporter;
pub mod partition;
mod partition_processor_manager;
mod process_repository;

pub use crate::exporter::{Exporter, ExporterDirector, LoggingExporter};
pub use crate::partition::{
    CommandOutcome, PartitionError, PartitionProcessor, PartitionProcessorHandle,
    PartitionProcessorRpc, PartitionStatus, ProcessorError,
};
pub use crate::partition_processor_manager::PartitionProcessorManager;
pub use crate::process_repository::{DeployedProcess, ProcessRepository};
