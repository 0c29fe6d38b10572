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

//! Data Access Layer over PostgreSQL.
//!
//! [`DAL`] hands out borrowed per-table accessors:
//!
//! - [`reminders()`](DAL::reminders) for reminder reads and cache writes
//! - [`tasks()`](DAL::tasks) for rollover configuration and due dates
//! - [`outbox()`](DAL::outbox) and [`inbox()`](DAL::inbox) for appends and claims
//! - [`queue(name)`](DAL::queue) for terminal-state bookkeeping on either queue
//!
//! It also implements [`ReconcileStore`], which is all the loops depend on.

pub mod models;
pub mod queue;
pub mod reminders;
pub mod tasks;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::database::Database;
use crate::error::StoreError;
use crate::models::{
    EntityRef, InboxEvent, InboxPayload, OutboxEvent, OutboxOp, QueueName, QueueStats,
    ReminderDefinition, RolloverDefinition,
};
use crate::store::ReconcileStore;

pub use models::{NewReminder, NewTask, ReminderRow, TaskRow};
pub use queue::{InboxDAL, OutboxDAL, QueueDAL};
pub use reminders::ReminderDAL;
pub use tasks::TaskDAL;

/// The PostgreSQL storage collaborator.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        DAL { database }
    }

    pub fn reminders(&self) -> ReminderDAL<'_> {
        ReminderDAL::new(self)
    }

    pub fn tasks(&self) -> TaskDAL<'_> {
        TaskDAL::new(self)
    }

    pub fn outbox(&self) -> OutboxDAL<'_> {
        OutboxDAL::new(self)
    }

    pub fn inbox(&self) -> InboxDAL<'_> {
        InboxDAL::new(self)
    }

    pub fn queue(&self, queue: QueueName) -> QueueDAL<'_> {
        QueueDAL::new(self, queue)
    }
}

#[async_trait]
impl ReconcileStore for DAL {
    async fn claim_outbox(
        &self,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxEvent>, StoreError> {
        self.outbox().claim(limit, lease).await
    }

    async fn claim_inbox(
        &self,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<InboxEvent>, StoreError> {
        self.inbox().claim(limit, lease).await
    }

    async fn enqueue_outbox(&self, op: OutboxOp, target: EntityRef) -> Result<i64, StoreError> {
        self.outbox().enqueue(op, target).await
    }

    async fn record_inbox(&self, payload: &InboxPayload) -> Result<i64, StoreError> {
        self.inbox().record(payload).await
    }

    async fn mark_processed(&self, queue: QueueName, id: i64) -> Result<(), StoreError> {
        self.queue(queue).mark_processed(id).await
    }

    async fn mark_failed(
        &self,
        queue: QueueName,
        id: i64,
        error: &str,
        retry_in: Duration,
    ) -> Result<(), StoreError> {
        self.queue(queue).mark_failed(id, error, retry_in).await
    }

    async fn quarantine(&self, queue: QueueName, id: i64, error: &str) -> Result<(), StoreError> {
        self.queue(queue).quarantine(id, error).await
    }

    async fn queue_stats(&self, queue: QueueName) -> Result<QueueStats, StoreError> {
        self.queue(queue).stats().await
    }

    async fn requeue_quarantined(
        &self,
        queue: QueueName,
        id: Option<i64>,
    ) -> Result<usize, StoreError> {
        self.queue(queue).requeue_quarantined(id).await
    }

    async fn fetch_reminder(&self, id: i64) -> Result<Option<ReminderDefinition>, StoreError> {
        self.reminders().fetch(id).await
    }

    async fn fetch_rollover(&self, task_id: i64) -> Result<Option<RolloverDefinition>, StoreError> {
        self.tasks().fetch_rollover(task_id).await
    }

    async fn set_next_fire_time(
        &self,
        reminder_id: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.reminders().set_next_fire_time(reminder_id, at).await
    }

    async fn record_fire(
        &self,
        reminder_id: i64,
        fired_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.reminders().record_fire(reminder_id, fired_at).await
    }

    async fn disable_reminders(&self, ids: &[i64]) -> Result<usize, StoreError> {
        self.reminders().disable(ids).await
    }

    async fn lapsed_reminders(&self, now: DateTime<Utc>) -> Result<Vec<i64>, StoreError> {
        self.reminders().lapsed(now).await
    }

    async fn apply_next_due_date(
        &self,
        task_id: i64,
        due: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.tasks().apply_next_due_date(task_id, due).await
    }
}
