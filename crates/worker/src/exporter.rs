// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Projection of committed records to external systems.

use tracing::{debug, trace, warn};

use tokenflow_journal::Journal;
use tokenflow_types::identifiers::{PartitionId, Position};
use tokenflow_types::record::Record;
use tokenflow_types::storage::StorageCodec;

/// Receives every record of a partition in journal order, at least once.
pub trait Exporter: Send {
    fn id(&self) -> &str;

    /// Exports a single record. On failure, the record and all records after it are exported
    /// again on the next attempt.
    fn export(&mut self, record: &Record) -> anyhow::Result<()>;
}

/// Logs every exported record.
#[derive(Debug, Default)]
pub struct LoggingExporter;

impl Exporter for LoggingExporter {
    fn id(&self) -> &str {
        "logging"
    }

    fn export(&mut self, record: &Record) -> anyhow::Result<()> {
        debug!(
            position = record.position,
            record_type = %record.record_type,
            intent = %record.intent,
            key = ?record.key,
            element_id = %record.value.element_id,
            "Exported record"
        );
        Ok(())
    }
}

struct ExporterContainer {
    exporter: Box<dyn Exporter>,
    /// Journal index of the next record to export.
    next_index: u64,
    exported_position: Option<Position>,
}

/// Pushes the committed records of a partition to its exporters.
///
/// Every exporter has its own watermark. An exporter which failed stays behind and catches up
/// from the journal on the next call to [`ExporterDirector::export`], independently of the other
/// exporters. Watermarks are not persisted, after a restart all records still held by the
/// journal are exported again.
pub struct ExporterDirector {
    partition_id: PartitionId,
    exporters: Vec<ExporterContainer>,
}

impl ExporterDirector {
    pub fn new(partition_id: PartitionId, exporters: Vec<Box<dyn Exporter>>) -> Self {
        Self {
            partition_id,
            exporters: exporters
                .into_iter()
                .map(|exporter| ExporterContainer {
                    exporter,
                    next_index: 0,
                    exported_position: None,
                })
                .collect(),
        }
    }

    /// Position up to which the exporter with the given id has exported.
    pub fn exported_position(&self, exporter_id: &str) -> Option<Position> {
        self.exporters
            .iter()
            .find(|container| container.exporter.id() == exporter_id)
            .and_then(|container| container.exported_position)
    }

    /// Whether any exporter has not yet exported all entries of the journal.
    pub fn is_lagging<J: Journal>(&self, journal: &J) -> bool {
        let next_index = journal.next_index();
        self.exporters
            .iter()
            .any(|container| container.next_index.max(journal.first_index()) < next_index)
    }

    /// Exports all entries of the journal up to its end. Every entry of the journal is expected
    /// to be durable.
    pub fn export<J: Journal>(&mut self, journal: &J) {
        for container in &mut self.exporters {
            if let Err(err) = Self::export_pending(container, journal) {
                warn!(
                    partition_id = %self.partition_id,
                    exporter = container.exporter.id(),
                    next_index = container.next_index,
                    "Export failed, retrying later: {err:#}"
                );
            }
        }
    }

    fn export_pending<J: Journal>(
        container: &mut ExporterContainer,
        journal: &J,
    ) -> anyhow::Result<()> {
        container.next_index = container.next_index.max(journal.first_index());
        for entry in journal.reader(container.next_index) {
            let entry = entry?;
            let mut record: Record =
                StorageCodec::decode(&mut entry.payload.clone())?;
            record.position = entry.position;

            container.exporter.export(&record)?;
            trace!(
                exporter = container.exporter.id(),
                index = entry.index,
                "Exported"
            );
            container.next_index = entry.index + 1;
            container.exported_position = Some(entry.position);
        }
        Ok(())
    }
}
