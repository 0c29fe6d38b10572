/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Subcommand implementations and the startup plumbing they share.

pub mod admin;
pub mod drain;
pub mod fire;
pub mod migrate;
pub mod sweep;
pub mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use cadence::{Database, InMemoryScheduler, ReconcilerConfig, SchedulerClient, DAL};
use tokio::sync::broadcast;
use tracing::info;

use crate::SchedulerKind;

/// Loads the reconciler knobs from the environment.
pub fn load_config() -> Result<ReconcilerConfig> {
    ReconcilerConfig::from_env().context("Invalid reconciler configuration")
}

/// Opens the pool and checks that the database answers.
pub async fn connect(database_url: &str, pool_size: u32) -> Result<DAL> {
    let database =
        Database::new(database_url, pool_size).context("Failed to create connection pool")?;
    database
        .get_connection()
        .await
        .context("Failed to connect to database")?;
    Ok(DAL::new(database))
}

/// Builds the scheduler client selected on the command line.
pub fn scheduler_client(kind: SchedulerKind) -> Result<Arc<dyn SchedulerClient>> {
    match kind {
        SchedulerKind::Memory => {
            info!("Using the in-memory scheduler; schedules will not outlive this process");
            Ok(Arc::new(InMemoryScheduler::new()))
        }
        #[cfg(feature = "temporal-http")]
        SchedulerKind::Temporal => {
            let config = cadence::TemporalHttpConfig::from_env();
            let client = cadence::TemporalHttpClient::new(config)
                .context("Invalid Temporal HTTP configuration")?;
            Ok(Arc::new(client))
        }
        #[cfg(not(feature = "temporal-http"))]
        SchedulerKind::Temporal => {
            anyhow::bail!("This build has no Temporal support; use --scheduler memory")
        }
    }
}

/// A receiver that fires on SIGINT or SIGTERM.
pub fn shutdown_signal() -> broadcast::Receiver<()> {
    let (tx, rx) = broadcast::channel(1);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested, finishing in-flight work");
        let _ = tx.send(());
    });
    rx
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
