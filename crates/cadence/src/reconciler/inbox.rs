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

//! The inbox drainer: scheduler facts flowing back into storage.
//!
//! Inbox rows are written by [`FireHandler`](crate::fire::FireHandler) and
//! drained here with the same claim and retry discipline as the outbox.
//! Handling an event only writes storage and deletes schedules that are
//! known to be finished. Any write that changes desired state appends an
//! outbox row on its own (trigger or store), which closes the loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::{idle, run_batch, shutdown_requested, BatchReport};
use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, StoreError};
use crate::gateway::SchedulerGateway;
use crate::models::{InboxEvent, InboxPayload, QueueName, ReminderKind};
use crate::scheduler::ScheduleHandle;
use crate::store::ReconcileStore;

/// What handling one inbox event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxOutcome {
    /// The reminder's schedule is finished; it was deleted and the row disabled
    Retired,
    /// A task-relative reminder fired; its schedule was deleted and the row
    /// stays enabled so the next due date re-arms it
    Consumed,
    /// The cached next fire time was refreshed (`None` if unknown)
    NextFireCached(Option<DateTime<Utc>>),
    /// The task's due date moved
    DueDateApplied,
    /// The task is done or gone; nothing was written
    DueDateIgnored,
    /// The reminder no longer exists
    Orphaned,
}

#[derive(Clone)]
pub struct InboxDrainer {
    store: Arc<dyn ReconcileStore>,
    gateway: SchedulerGateway,
    config: ReconcilerConfig,
}

impl InboxDrainer {
    pub fn new(
        store: Arc<dyn ReconcileStore>,
        gateway: SchedulerGateway,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Runs until `shutdown` fires, finishing any in-flight batch.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("Inbox drainer started");
        loop {
            if shutdown_requested(&mut shutdown) {
                break;
            }
            let wait = match self.drain_once().await {
                Ok(report) => {
                    if report.claimed > 0 {
                        debug!(?report, "Drained inbox batch");
                    }
                    report.claimed == 0
                }
                Err(e) => {
                    error!(error = %e, "Inbox claim failed");
                    true
                }
            };
            if wait && idle(&mut shutdown, self.config.poll_interval()).await {
                break;
            }
        }
        info!("Inbox drainer stopped");
    }

    pub async fn drain_once(&self) -> Result<BatchReport, StoreError> {
        let events = self
            .store
            .claim_inbox(self.config.batch_size(), self.config.lease())
            .await?;
        if events.is_empty() {
            return Ok(BatchReport::default());
        }
        let rows = events
            .into_iter()
            .map(|event| (event.id, event.attempts, event))
            .collect::<Vec<_>>();
        let drainer = self.clone();
        Ok(run_batch(
            self.store.clone(),
            &self.config,
            QueueName::Inbox,
            rows,
            move |event: InboxEvent| {
                let drainer = drainer.clone();
                async move {
                    let outcome = drainer.handle(&event.payload).await?;
                    info!(inbox_id = event.id, kind = event.payload.kind(), ?outcome, "Handled");
                    Ok::<(), ReconcileError>(())
                }
            },
        )
        .await)
    }

    /// Applies one scheduler fact.
    pub async fn handle(&self, payload: &InboxPayload) -> Result<InboxOutcome, ReconcileError> {
        match payload {
            InboxPayload::Fired {
                reminder_id,
                fired_at,
                delete_after,
            } => self.fired(*reminder_id, *fired_at, *delete_after).await,
            InboxPayload::Exhausted { reminder_id } => {
                match self.store.fetch_reminder(*reminder_id).await? {
                    Some(reminder) => self.finish(reminder.id, &reminder.kind).await,
                    None => self.orphaned(*reminder_id).await,
                }
            }
            InboxPayload::NextFireTime { reminder_id, at } => {
                if self.store.fetch_reminder(*reminder_id).await?.is_none() {
                    return Ok(InboxOutcome::Orphaned);
                }
                self.store.set_next_fire_time(*reminder_id, *at).await?;
                Ok(InboxOutcome::NextFireCached(*at))
            }
            InboxPayload::NextDueComputed { task_id, due } => {
                if self.store.apply_next_due_date(*task_id, *due).await? {
                    info!(task_id, %due, "Rolled task over");
                    Ok(InboxOutcome::DueDateApplied)
                } else {
                    debug!(task_id, "Task done or missing, rollover ignored");
                    Ok(InboxOutcome::DueDateIgnored)
                }
            }
        }
    }

    async fn fired(
        &self,
        reminder_id: i64,
        fired_at: DateTime<Utc>,
        delete_after: bool,
    ) -> Result<InboxOutcome, ReconcileError> {
        let Some(reminder) = self.store.fetch_reminder(reminder_id).await? else {
            return self.orphaned(reminder_id).await;
        };
        self.store.record_fire(reminder_id, fired_at).await?;
        if delete_after {
            return self.finish(reminder_id, &reminder.kind).await;
        }
        let handle = ScheduleHandle::reminder(reminder_id);
        match self.gateway.describe(&handle).await? {
            Some(description) if description.is_exhausted() => {
                self.finish(reminder_id, &reminder.kind).await
            }
            Some(description) => {
                let next = description.next_fire_times.first().copied();
                self.store.set_next_fire_time(reminder_id, next).await?;
                Ok(InboxOutcome::NextFireCached(next))
            }
            None => {
                self.store.set_next_fire_time(reminder_id, None).await?;
                Ok(InboxOutcome::NextFireCached(None))
            }
        }
    }

    async fn orphaned(&self, reminder_id: i64) -> Result<InboxOutcome, ReconcileError> {
        self.gateway
            .delete(&ScheduleHandle::reminder(reminder_id))
            .await?;
        Ok(InboxOutcome::Orphaned)
    }

    /// Tears down a schedule that has nothing left to fire.
    ///
    /// Task-relative reminders stay enabled: a rollover moves the due date
    /// and the resulting outbox intent schedules them again.
    async fn finish(
        &self,
        reminder_id: i64,
        kind: &ReminderKind,
    ) -> Result<InboxOutcome, ReconcileError> {
        let outcome = self
            .gateway
            .delete(&ScheduleHandle::reminder(reminder_id))
            .await?;
        self.store.set_next_fire_time(reminder_id, None).await?;
        if matches!(kind, ReminderKind::TaskDueBefore { .. }) {
            debug!(reminder_id, ?outcome, "Consumed task reminder");
            return Ok(InboxOutcome::Consumed);
        }
        self.store.disable_reminders(&[reminder_id]).await?;
        debug!(reminder_id, ?outcome, "Retired reminder");
        Ok(InboxOutcome::Retired)
    }
}
