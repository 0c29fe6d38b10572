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

//! Implementation of the `sweep` command.

use std::sync::Arc;

use anyhow::{Context, Result};
use cadence::{SchedulerGateway, Sweeper};
use chrono::Utc;
use tracing::info;

use super::{connect, load_config, scheduler_client};
use crate::SchedulerKind;

pub async fn run(database_url: &str, scheduler: SchedulerKind) -> Result<()> {
    let config = load_config()?;
    let dal = connect(database_url, config.db_pool_size()).await?;
    let gateway = SchedulerGateway::new(scheduler_client(scheduler)?, &config);

    let sweeper = Sweeper::new(Arc::new(dal.clone()), gateway, &config);
    let report = sweeper
        .sweep_once(Utc::now())
        .await
        .context("Sweep failed")?;
    info!(
        "Sweep found {} lapsed reminder(s): {} deleted, {} already gone, {} failed, {} disabled",
        report.lapsed, report.deleted, report.already_gone, report.failed, report.disabled
    );

    dal.database.close();
    Ok(())
}
