// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use tokenflow_types::identifiers::ProcessDefinitionKey;
use tokenflow_types::process::ExecutableProcess;

/// A process model together with the identity it was deployed under.
#[derive(Debug)]
pub struct DeployedProcess {
    pub key: ProcessDefinitionKey,
    pub version: u32,
    pub process: ExecutableProcess,
}

impl DeployedProcess {
    pub fn bpmn_process_id(&self) -> &str {
        self.process.bpmn_process_id()
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_key: i64,
    by_key: HashMap<ProcessDefinitionKey, Arc<DeployedProcess>>,
    /// Versions of every bpmn process id, ascending.
    versions: HashMap<String, BTreeMap<u32, ProcessDefinitionKey>>,
}

/// Read-only lookup of deployed processes for the step processors of all partitions.
///
/// Definition keys and versions are handed out in deployment order, so deploying the same
/// models in the same order always yields the same keys.
#[derive(Debug, Clone, Default)]
pub struct ProcessRepository {
    inner: Arc<RwLock<Inner>>,
}

impl ProcessRepository {
    pub fn deploy(&self, process: ExecutableProcess) -> Arc<DeployedProcess> {
        let mut inner = self.inner.write();
        inner.next_key += 1;
        let key = ProcessDefinitionKey::new(inner.next_key);

        let versions = inner
            .versions
            .entry(process.bpmn_process_id().to_owned())
            .or_default();
        let version = versions.keys().next_back().map_or(1, |latest| latest + 1);
        versions.insert(version, key);

        let deployed = Arc::new(DeployedProcess {
            key,
            version,
            process,
        });
        inner.by_key.insert(key, Arc::clone(&deployed));

        info!(
            bpmn_process_id = deployed.bpmn_process_id(),
            %key,
            version,
            "Deployed process"
        );
        deployed
    }

    pub fn get_by_key(&self, key: ProcessDefinitionKey) -> Option<Arc<DeployedProcess>> {
        self.inner.read().by_key.get(&key).cloned()
    }

    pub fn get_latest(&self, bpmn_process_id: &str) -> Option<Arc<DeployedProcess>> {
        let inner = self.inner.read();
        let (_, key) = inner.versions.get(bpmn_process_id)?.last_key_value()?;
        inner.by_key.get(key).cloned()
    }

    pub fn get_version(&self, bpmn_process_id: &str, version: u32) -> Option<Arc<DeployedProcess>> {
        let inner = self.inner.read();
        let key = inner.versions.get(bpmn_process_id)?.get(&version)?;
        inner.by_key.get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_key.is_empty()
    }
}
