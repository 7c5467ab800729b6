// SPDX-License-Identifier: AGPL-3.0-or-later
// AccelRT - Host-side Acceleration Runtime
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! AccelRT diagnostic CLI
//!
//! Inspects configuration and backend loading of the acceleration runtime.
//!
//! ## Usage
//!
//! ```bash
//! # Show the configuration resolved from ACCELRT_* variables
//! accelrt config
//!
//! # Load backends and list what they implement
//! accelrt plugins --backends /usr/lib/libaccelrt_plugin_noop.so
//!
//! # Ask which backend serves an operation
//! accelrt resolve noop --hint generic
//! ```

use accelrt_kernel::config::parse_backend_list;
use accelrt_kernel::{ops, BackendKind, OpType, Runtime, RuntimeConfig, SessionFlags};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// AccelRT - inspect the acceleration runtime
#[derive(Parser)]
#[command(name = "accelrt")]
#[command(about = "Diagnostics for the AccelRT acceleration runtime")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Parent directory for the run directory (overrides ACCELRT_RUNDIR)
    #[arg(long, global = true)]
    rundir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved runtime configuration as JSON
    Config,

    /// Load backends and list registered plugins
    Plugins {
        /// Colon-separated backend libraries (overrides ACCELRT_BACKENDS)
        #[arg(short, long)]
        backends: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Report which backend serves an operation
    Resolve {
        /// Operation type (noop, exec, vector-add, tensor-inference, ...)
        op: String,

        /// Colon-separated backend libraries (overrides ACCELRT_BACKENDS)
        #[arg(short, long)]
        backends: Option<String>,

        /// Preferred backend kind (generic, cpu, gpu, fpga, remote)
        #[arg(long)]
        hint: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = RuntimeConfig::from_env().context("invalid ACCELRT_* environment")?;
    if cli.verbose {
        config.debug_level = 4;
    }
    if let Some(root) = cli.rundir {
        config.rundir_root = Some(root);
    }

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Plugins { backends, json } => {
            list_plugins(with_backends(config, backends), json)?;
        }
        Commands::Resolve { op, backends, hint } => {
            resolve(with_backends(config, backends), &op, hint.as_deref())?;
        }
    }

    Ok(())
}

fn with_backends(mut config: RuntimeConfig, backends: Option<String>) -> RuntimeConfig {
    if let Some(list) = backends {
        config.backends = parse_backend_list(&list);
    }
    config
}

fn bootstrap(config: RuntimeConfig) -> Result<Runtime> {
    let root = config.rundir_root();
    Runtime::bootstrap(config)
        .with_context(|| format!("failed to bootstrap runtime under {}", root.display()))
}

fn list_plugins(config: RuntimeConfig, json: bool) -> Result<()> {
    let runtime = bootstrap(config)?;
    let plugins = runtime.plugins().list_plugins();

    if json {
        println!("{}", serde_json::to_string_pretty(&plugins)?);
        return Ok(());
    }

    if plugins.is_empty() {
        println!("no plugins loaded");
        return Ok(());
    }

    println!("{:<4} {:<20} {:<10} {:<8} OPERATIONS", "ID", "NAME", "VERSION", "KIND");
    for plugin in &plugins {
        let ops: Vec<&str> = plugin.ops.iter().map(|op| op.name()).collect();
        println!(
            "{:<4} {:<20} {:<10} {:<8} {}",
            plugin.id,
            plugin.name,
            plugin.version,
            plugin.kind,
            ops.join(",")
        );
    }

    runtime.shutdown();
    Ok(())
}

fn resolve(config: RuntimeConfig, op: &str, hint: Option<&str>) -> Result<()> {
    let op: OpType = op.parse()?;
    let hint = hint.map(str::parse::<BackendKind>).transpose()?;

    let runtime = bootstrap(config)?;
    let names = ops::get_plugins(&runtime, op)?;
    println!("{}: {} implementation(s) {:?}", op, names.len(), names);

    match runtime.plugins().resolve_op(op, hint) {
        Some(resolved) => println!(
            "{} resolves to '{}' ({})",
            op, resolved.plugin_name, resolved.kind
        ),
        None => {
            println!("{} is not supported by any loaded backend", op);
            return Ok(());
        }
    }

    if op == OpType::NoOp {
        let flags = hint.map_or(SessionFlags::NONE, SessionFlags::with_hint);
        let session = runtime.sessions().sess_init(flags)?;
        ops::noop(&runtime, &session)?;
        runtime.sessions().sess_free(session)?;
        println!("noop dispatch ok");
    }

    runtime.shutdown();
    Ok(())
}
