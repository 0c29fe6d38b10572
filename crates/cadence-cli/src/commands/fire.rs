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

//! Implementation of the `fire` command.
//!
//! Hosts of the reminder and rollover units of work call this with the
//! argument their schedule passed them.

use std::sync::Arc;

use anyhow::{Context, Result};
use cadence::{FireHandler, FirePayload};
use chrono::{DateTime, Utc};
use tracing::info;

use super::connect;

pub async fn run(database_url: &str, payload: &str, fired_at: Option<&str>) -> Result<()> {
    let fired_at = parse_fired_at(fired_at)?;
    let value: serde_json::Value =
        serde_json::from_str(payload).context("Payload is not valid JSON")?;
    let payload = FirePayload::from_args(&[value]).context("Payload is not a fire payload")?;

    let dal = connect(database_url, 1).await?;
    let handler = FireHandler::new(Arc::new(dal.clone()));
    let id = handler
        .on_fire(payload, fired_at)
        .await
        .context("Failed to record firing")?;
    info!("Recorded firing of {} as inbox row {}", payload.entity, id);

    dal.database.close();
    Ok(())
}

fn parse_fired_at(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        None => Ok(Utc::now()),
        Some(raw) => Ok(DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid --fired-at: '{}'", raw))?
            .with_timezone(&Utc)),
    }
}
