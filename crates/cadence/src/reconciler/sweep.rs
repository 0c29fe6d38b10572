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

//! Expiry sweep.
//!
//! Recurring reminders whose `end_at` has passed would otherwise keep their
//! schedule until some unrelated mutation touched them. The sweep deletes
//! those schedules and disables the rows in one pass.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::config::ReconcilerConfig;
use crate::error::StoreError;
use crate::gateway::{DeleteOutcome, SchedulerGateway};
use crate::scheduler::ScheduleHandle;
use crate::store::ReconcileStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub lapsed: usize,
    pub deleted: usize,
    pub already_gone: usize,
    /// Deletes that failed; those rows stay enabled for the next sweep
    pub failed: usize,
    pub disabled: usize,
}

#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn ReconcileStore>,
    gateway: SchedulerGateway,
    concurrency: usize,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn ReconcileStore>,
        gateway: SchedulerGateway,
        config: &ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            concurrency: config.concurrency(),
        }
    }

    /// Retires every enabled recurring reminder whose window ended by `now`.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let ids = self.store.lapsed_reminders(now).await?;
        let mut report = SweepReport {
            lapsed: ids.len(),
            ..Default::default()
        };
        if ids.is_empty() {
            return Ok(report);
        }

        let results: Vec<_> = stream::iter(ids)
            .map(|id| async move {
                let handle = ScheduleHandle::reminder(id);
                (id, self.gateway.delete(&handle).await)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut retired = Vec::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(DeleteOutcome::Deleted) => {
                    report.deleted += 1;
                    retired.push(id);
                }
                Ok(DeleteOutcome::AlreadyGone) => {
                    report.already_gone += 1;
                    retired.push(id);
                }
                Err(e) => {
                    warn!(reminder_id = id, error = %e, "Sweep could not delete schedule");
                    report.failed += 1;
                }
            }
        }
        retired.sort_unstable();
        report.disabled = self.store.disable_reminders(&retired).await?;
        info!(?report, "Sweep finished");
        Ok(report)
    }
}
