// Copyright 2026 loopd contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use clap::Parser;
use loopd::cli::Cli;
use loopd::config::Config;
use loopd::controller::{self, Shared};
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Nagios-style "CRITICAL" exit status (spec.md §6: "Exit code CRIT on
/// fatal error, 0 never").
const EXIT_CRIT: i32 = 2;

fn init_logging(log_level: Option<&str>) {
    let filter = log_level
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(severity = "CRIT", "failed to load configuration: {e}");
            std::process::exit(EXIT_CRIT);
        }
    };

    let shared = Arc::new(Shared::new(config));

    // The Worker's lifecycle (spawn, pause-for-swap, respawn) is owned by
    // the Main Controller itself (spec.md §5's synchronous dataset-swap
    // barrier), not spawned independently here.
    let controller_handle = tokio::spawn(controller::run(shared.clone()));

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                tracing::error!(severity = "CRIT", "main controller task aborted: {e}");
                std::process::exit(EXIT_CRIT);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("received interrupt, shutting down");
        }
        _ = wait_for_sigterm() => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
