// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const DEFAULT_STORAGE_DIRECTORY: &str = "tokenflow-data";

/// # Common options
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct CommonOptions {
    /// # Node name
    ///
    /// Used in log output and as sub-directory of the base directory.
    node_name: String,

    /// # Base directory
    ///
    /// Directory under which journals are stored. Defaults to `./tokenflow-data`.
    #[builder(setter(strip_option))]
    base_dir: Option<PathBuf>,

    /// # Logging filter
    ///
    /// Log filter configuration. Can be overridden by the `RUST_LOG` environment variable.
    /// Check the [`RUST_LOG` documentation](https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html) for more details how to configure it.
    pub log_filter: String,

    /// # Logging format
    ///
    /// Format to use when logging.
    pub log_format: LogFormat,

    /// # Disable ANSI in log output
    pub log_disable_ansi_codes: bool,
}

impl CommonOptions {
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn set_base_dir(&mut self, path: PathBuf) {
        self.base_dir = Some(path);
    }

    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_default()
                .join(DEFAULT_STORAGE_DIRECTORY)
        })
    }

    /// Directory holding all data of this node.
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir().join(&self.node_name)
    }
}

impl Default for CommonOptions {
    fn default() -> Self {
        Self {
            node_name: "node-1".to_owned(),
            base_dir: None,
            log_filter: "warn,tokenflow=info".to_owned(),
            log_format: Default::default(),
            log_disable_ansi_codes: false,
        }
    }
}

/// # Log format
#[derive(Debug, Clone, Copy, Hash, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// # Pretty
    ///
    /// Enables verbose logging. Not recommended in production.
    #[default]
    Pretty,
    /// # Compact
    ///
    /// Enables compact logging.
    Compact,
    /// # Json
    ///
    /// Enables json logging. You can use a json log collector to ingest these logs and further process them.
    Json,
}
