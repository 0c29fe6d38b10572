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

//! Implementation of the `admin` commands.

use anyhow::{bail, Context, Result};
use cadence::{QueueName, ReconcileStore};
use tracing::info;

use super::connect;
use crate::QueueArg;

fn queues(arg: QueueArg) -> Vec<QueueName> {
    match arg {
        QueueArg::Outbox => vec![QueueName::Outbox],
        QueueArg::Inbox => vec![QueueName::Inbox],
        QueueArg::All => vec![QueueName::Outbox, QueueName::Inbox],
    }
}

/// Prints row counts for both queues.
pub async fn stats(database_url: &str) -> Result<()> {
    let dal = connect(database_url, 1).await?;
    println!("{:<18} {:>10} {:>12} {:>10}", "QUEUE", "PENDING", "QUARANTINED", "PROCESSED");
    for queue in queues(QueueArg::All) {
        let stats = dal
            .queue_stats(queue)
            .await
            .with_context(|| format!("Failed to read stats for {}", queue))?;
        println!(
            "{:<18} {:>10} {:>12} {:>10}",
            queue.table(),
            stats.pending,
            stats.quarantined,
            stats.processed
        );
    }
    dal.database.close();
    Ok(())
}

/// Returns quarantined rows to the pending state.
pub async fn requeue(database_url: &str, queue: QueueArg, id: Option<i64>) -> Result<()> {
    if id.is_some() && queue == QueueArg::All {
        bail!("--id needs --queue outbox or --queue inbox");
    }
    let dal = connect(database_url, 1).await?;
    for queue in queues(queue) {
        let requeued = dal
            .requeue_quarantined(queue, id)
            .await
            .with_context(|| format!("Failed to requeue {}", queue))?;
        info!("Requeued {} quarantined row(s) in {}", requeued, queue.table());
    }
    dal.database.close();
    Ok(())
}
