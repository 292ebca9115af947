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

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;

use crate::config::{Configuration, InvalidConfigurationError};

#[derive(thiserror::Error, Debug)]
pub enum ConfigLoadError {
    #[error("configuration loading error: {0}")]
    Figment(Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] InvalidConfigurationError),
}

// Because thiserror doesn't support auto-boxing or auto implements From with boxing.
impl From<figment::Error> for ConfigLoadError {
    fn from(value: figment::Error) -> Self {
        Self::Figment(Box::new(value))
    }
}

/// Loads the [`Configuration`] by layering defaults, an optional TOML file and `TOKENFLOW_`
/// prefixed environment variables, in this order.
#[derive(Debug, Default, derive_builder::Builder)]
#[builder(default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    load_env: bool,
    #[builder(setter(strip_option))]
    custom_default: Option<Configuration>,
}

impl ConfigLoader {
    pub fn load_once(&self) -> Result<Configuration, ConfigLoadError> {
        let defaults = self.custom_default.clone().unwrap_or_default();

        let mut figment = Figment::from(Serialized::defaults(defaults));
        // Load configuration file
        if let Some(path) = &self.path {
            figment = figment.merge(Toml::file_exact(path.as_path()));
        }

        // Merge with environment variables
        if self.load_env {
            figment = Self::merge_with_env(figment);
        }

        let config: Configuration = figment.extract()?;
        config.validate()?;

        Ok(config)
    }

    fn merge_with_env(figment: Figment) -> Figment {
        figment
            .merge(
                Env::prefixed("TOKENFLOW_")
                    .split("__")
                    .map(|k| k.as_str().replace('_', "-").into()),
            )
            // Override the log filter with RUST_LOG, if present
            .merge(Env::raw().only(&["RUST_LOG"]).map(|_| "log-filter".into()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::num::NonZeroU16;
    use std::time::Duration;

    use googletest::prelude::*;

    use super::*;
    use crate::config::LogFormat;
    use crate::retries::RetryPolicy;

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
log-format = "json"

[journal]
index-density = 10

[worker]
num-partitions = 2

[worker.commit-retry-policy]
type = "fixed-delay"
interval = "20ms"
max-attempts = 3
"#
        )
        .unwrap();

        let config = ConfigLoaderBuilder::default()
            .path(Some(file.path().to_path_buf()))
            .build()
            .unwrap()
            .load_once()
            .unwrap();

        assert_that!(config.common.log_format, eq(LogFormat::Json));
        assert_that!(config.journal.index_density.get(), eq(10));
        assert_that!(
            config.worker.num_partitions,
            eq(NonZeroU16::new(2).unwrap())
        );
        assert_that!(
            config.worker.commit_retry_policy,
            eq(&RetryPolicy::fixed_delay(Duration::from_millis(20), Some(3)))
        );
        // untouched values keep their defaults
        assert_that!(config.worker.internal_queue_length, eq(64));
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[worker]
internal-queue-length = 0
"#
        )
        .unwrap();

        let result = ConfigLoaderBuilder::default()
            .path(Some(file.path().to_path_buf()))
            .build()
            .unwrap()
            .load_once();

        assert!(matches!(
            result,
            Err(ConfigLoadError::InvalidConfiguration(
                InvalidConfigurationError::EmptyInternalQueue
            ))
        ));
    }

    #[test]
    fn missing_file_fails() {
        let result = ConfigLoaderBuilder::default()
            .path(Some(PathBuf::from("/definitely/not/here.toml")))
            .build()
            .unwrap()
            .load_once();

        assert!(matches!(result, Err(ConfigLoadError::Figment(_))));
    }
}
