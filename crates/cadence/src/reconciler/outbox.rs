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

//! The outbox drainer.
//!
//! Each claimed outbox row names an entity. The drainer re-reads that
//! entity, compiles it, and applies the decision through the gateway. The
//! row's `op` is only logged: the current row is the source of truth, so two
//! events for the same entity converge on whichever read happened last.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::sweep::Sweeper;
use super::{idle, run_batch, shutdown_requested, BatchReport};
use crate::compiler::{compile_reminder, compile_rollover, Decision, DeleteReason, DesiredSchedule, Lifecycle};
use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, StoreError};
use crate::gateway::{DeleteOutcome, SchedulerGateway, UpsertOutcome};
use crate::models::{EntityKind, EntityRef, OutboxEvent, QueueName};
use crate::scheduler::ScheduleHandle;
use crate::store::ReconcileStore;

/// What syncing one entity did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Upserted {
        outcome: UpsertOutcome,
        /// `None` when the scheduler could not say
        next_fire_at: Option<DateTime<Utc>>,
    },
    Deleted {
        reason: DeleteReason,
        outcome: DeleteOutcome,
    },
}

/// Drains the outbox and runs the periodic sweep.
#[derive(Clone)]
pub struct OutboxDrainer {
    store: Arc<dyn ReconcileStore>,
    gateway: SchedulerGateway,
    sweeper: Sweeper,
    config: ReconcilerConfig,
}

impl OutboxDrainer {
    pub fn new(
        store: Arc<dyn ReconcileStore>,
        gateway: SchedulerGateway,
        config: ReconcilerConfig,
    ) -> Self {
        let sweeper = Sweeper::new(store.clone(), gateway.clone(), &config);
        Self {
            store,
            gateway,
            sweeper,
            config,
        }
    }

    /// Runs the control loop until `shutdown` fires.
    ///
    /// The sweep runs first and then every `sweep_interval`. An in-flight
    /// batch always finishes before the loop exits.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            batch_size = self.config.batch_size(),
            concurrency = self.config.concurrency(),
            "Outbox drainer started"
        );
        let mut last_sweep: Option<Instant> = None;
        loop {
            if shutdown_requested(&mut shutdown) {
                break;
            }
            if last_sweep.map_or(true, |at| at.elapsed() >= self.config.sweep_interval()) {
                last_sweep = Some(Instant::now());
                if let Err(e) = self.sweeper.sweep_once(Utc::now()).await {
                    error!(error = %e, "Sweep failed");
                }
            }
            match self.drain_once().await {
                Ok(report) if report.claimed > 0 => {
                    debug!(?report, "Drained outbox batch");
                }
                Ok(_) => {
                    if idle(&mut shutdown, self.config.poll_interval()).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Outbox claim failed");
                    if idle(&mut shutdown, self.config.poll_interval()).await {
                        break;
                    }
                }
            }
        }
        info!("Outbox drainer stopped");
    }

    /// Claims one batch and processes it to completion.
    pub async fn drain_once(&self) -> Result<BatchReport, StoreError> {
        let events = self
            .store
            .claim_outbox(self.config.batch_size(), self.config.lease())
            .await?;
        if events.is_empty() {
            return Ok(BatchReport::default());
        }
        let rows = events
            .into_iter()
            .map(|event| (event.id, event.attempts, event))
            .collect::<Vec<_>>();
        let drainer = self.clone();
        let report = run_batch(
            self.store.clone(),
            &self.config,
            QueueName::Outbox,
            rows,
            move |event: OutboxEvent| {
                let drainer = drainer.clone();
                async move { drainer.process_event(&event).await.map(|_| ()) }
            },
        )
        .await;
        Ok(report)
    }

    async fn process_event(&self, event: &OutboxEvent) -> Result<SyncOutcome, ReconcileError> {
        debug!(
            outbox_id = event.id,
            op = event.op.as_str(),
            entity = %event.target,
            attempts = event.attempts,
            "Processing outbox event"
        );
        let outcome = self.sync(event.target).await?;
        info!(outbox_id = event.id, entity = %event.target, ?outcome, "Synced");
        Ok(outcome)
    }

    /// Brings the external schedule for `target` in line with storage.
    pub async fn sync(&self, target: EntityRef) -> Result<SyncOutcome, ReconcileError> {
        match target.kind {
            EntityKind::Reminder => self.sync_reminder(target.id).await,
            EntityKind::Rollover => self.sync_rollover(target.id).await,
        }
    }

    async fn sync_reminder(&self, id: i64) -> Result<SyncOutcome, ReconcileError> {
        let def = self.store.fetch_reminder(id).await?;
        let decision = match &def {
            Some(def) => compile_reminder(def, Utc::now()),
            None => Decision::Delete(DeleteReason::Missing),
        };
        match decision {
            Decision::Delete(reason) => {
                let outcome = self.gateway.delete(&ScheduleHandle::reminder(id)).await?;
                if def.as_ref().is_some_and(|d| d.next_fire_at.is_some()) {
                    self.store.set_next_fire_time(id, None).await?;
                }
                Ok(SyncOutcome::Deleted { reason, outcome })
            }
            Decision::Upsert(desired) => {
                let outcome = self.apply(&desired).await?;
                let next_fire_at = self.gateway.next_fire_time(&desired.handle).await?;
                self.store.set_next_fire_time(id, next_fire_at).await?;
                Ok(SyncOutcome::Upserted {
                    outcome,
                    next_fire_at,
                })
            }
        }
    }

    async fn sync_rollover(&self, task_id: i64) -> Result<SyncOutcome, ReconcileError> {
        let decision = match self.store.fetch_rollover(task_id).await? {
            Some(def) => compile_rollover(&def, Utc::now()),
            None => Decision::Delete(DeleteReason::Missing),
        };
        match decision {
            Decision::Delete(reason) => {
                if reason == DeleteReason::UnsupportedRolloverInterval {
                    warn!(task_id, "Interval rollovers are not supported, removing schedule");
                }
                let outcome = self.gateway.delete(&ScheduleHandle::rollover(task_id)).await?;
                Ok(SyncOutcome::Deleted { reason, outcome })
            }
            Decision::Upsert(desired) => {
                let outcome = self.apply(&desired).await?;
                Ok(SyncOutcome::Upserted {
                    outcome,
                    next_fire_at: None,
                })
            }
        }
    }

    async fn apply(&self, desired: &DesiredSchedule) -> Result<UpsertOutcome, ReconcileError> {
        if desired.tz_fallback {
            warn!(handle = %desired.handle, "Schedule compiled in UTC after timezone fallback");
        }
        let outcome = match desired.lifecycle {
            Lifecycle::Ephemeral => {
                self.gateway
                    .recreate(&desired.handle, &desired.schedule)
                    .await?
            }
            Lifecycle::SingleShot | Lifecycle::Recurring => {
                self.gateway
                    .upsert(&desired.handle, &desired.schedule)
                    .await?
            }
        };
        Ok(outcome)
    }
}
