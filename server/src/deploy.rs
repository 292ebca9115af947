// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Loading of process models from their JSON definition files.

use std::path::{Path, PathBuf};

use tracing::info;

use tokenflow_types::process::{ElementDefinition, ExecutableProcess, ModelError};
use tokenflow_worker::ProcessRepository;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("failed reading process definition '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed parsing process definition '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid process definition '{}': {source}", path.display())]
    Invalid { path: PathBuf, source: ModelError },
}

pub fn load_process(path: &Path) -> Result<ExecutableProcess, DeployError> {
    let content = std::fs::read(path).map_err(|source| DeployError::Read {
        path: path.to_owned(),
        source,
    })?;
    let definition: ElementDefinition =
        serde_json::from_slice(&content).map_err(|source| DeployError::Parse {
            path: path.to_owned(),
            source,
        })?;
    ExecutableProcess::try_from(definition).map_err(|source| DeployError::Invalid {
        path: path.to_owned(),
        source,
    })
}

/// Deploys the given files in order. All files are validated before the first one is deployed.
pub fn deploy_all(processes: &ProcessRepository, paths: &[PathBuf]) -> Result<(), DeployError> {
    let loaded = paths
        .iter()
        .map(|path| load_process(path))
        .collect::<Result<Vec<_>, _>>()?;

    for process in loaded {
        let deployed = processes.deploy(process);
        info!(
            bpmn_process_id = %deployed.bpmn_process_id(),
            version = deployed.version,
            key = %deployed.key,
            "Deployed process"
        );
    }
    Ok(())
}
