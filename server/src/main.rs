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

use clap::Parser;
use tracing::{error, info, warn};

use tokenflow_types::config::Configuration;
use tokenflow_types::config_loader::ConfigLoaderBuilder;
use tokenflow_worker::{PartitionProcessorManager, ProcessRepository};

mod build_info;
mod deploy;
mod logging;
mod signal;

const EXIT_CODE_FAILURE: i32 = 1;

#[derive(Debug, clap::Parser)]
#[command(author, version, about)]
struct TokenflowArguments {
    /// Set a configuration file to use for tokenflow.
    #[arg(
        short,
        long = "config-file",
        env = "TOKENFLOW_CONFIG",
        value_name = "FILE"
    )]
    config_file: Option<PathBuf>,

    /// Dumps the loaded configuration (or default if no config-file is set) to stdout and exits.
    /// Defaults will include any values overridden by environment variables.
    #[clap(long)]
    dump_config: bool,

    /// Process definition files (JSON) to deploy on start.
    ///
    /// The journals of all partitions refer to deployed processes by their definition key, so a
    /// restarted server must be given the same files in the same order.
    #[arg(long = "deploy", value_name = "FILE", num_args = 1..)]
    deploy: Vec<PathBuf>,
}

fn main() {
    let cli_args = TokenflowArguments::parse();

    let config = match load_configuration(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            // We cannot use tracing here as it's not configured yet
            eprintln!("{err:#}");
            std::process::exit(EXIT_CODE_FAILURE);
        }
    };
    if cli_args.dump_config {
        match config.dump() {
            Ok(dump) => {
                println!("{dump}");
                std::process::exit(0);
            }
            Err(err) => {
                eprintln!("Failed to dump configuration: {err}");
                std::process::exit(EXIT_CODE_FAILURE);
            }
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tokenflow")
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to build Tokio runtime: {err}");
            std::process::exit(EXIT_CODE_FAILURE);
        }
    };

    let exit_code = runtime.block_on(async move {
        if let Err(err) = logging::init_logging(&config.common) {
            eprintln!("Failed to configure logging: {err}");
            return EXIT_CODE_FAILURE;
        }

        info!("Starting {}", build_info::build_info());
        match &cli_args.config_file {
            Some(path) => info!("Loading configuration file from {}", path.display()),
            None => info!("Loading default built-in configuration"),
        }

        match run(&config, &cli_args.deploy).await {
            Ok(()) => {
                info!("Tokenflow has been gracefully shut down.");
                0
            }
            Err(err) => {
                error!("Tokenflow application failed: {err:#}");
                EXIT_CODE_FAILURE
            }
        }
    });
    std::process::exit(exit_code);
}

fn load_configuration(cli_args: &TokenflowArguments) -> anyhow::Result<Configuration> {
    // We capture the absolute path of the config file on startup, relative paths would
    // otherwise depend on the working directory
    let config_path = cli_args
        .config_file
        .as_ref()
        .map(std::fs::canonicalize)
        .transpose()?;

    let config = ConfigLoaderBuilder::default()
        .load_env(true)
        .path(config_path)
        .build()?
        .load_once()?;
    Ok(config)
}

async fn run(config: &Configuration, deploy: &[PathBuf]) -> anyhow::Result<()> {
    let processes = ProcessRepository::default();
    deploy::deploy_all(&processes, deploy)?;
    if processes.is_empty() {
        warn!("No process definitions deployed, all process instance commands will be rejected");
    }

    let mut manager = PartitionProcessorManager::start(config, processes)?;

    let mut failure = None;
    tokio::select! {
        signal_name = signal::shutdown() => {
            info!("Received shutdown signal {signal_name}.");
        },
        _ = signal::sigusr1_dump_config(config) => {},
        Some((partition_id, result)) = manager.next_stopped() => {
            match result {
                Ok(()) => warn!(%partition_id, "Partition processor stopped unexpectedly"),
                Err(err) => {
                    error!(%partition_id, %err, "Partition processor failed, shutting down");
                    failure = Some(anyhow::anyhow!("partition {partition_id} failed: {err}"));
                }
            }
        }
    }

    manager.shutdown().await?;
    failure.map_or(Ok(()), Err)
}
