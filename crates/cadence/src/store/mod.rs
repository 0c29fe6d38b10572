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

//! The storage collaborator seam.
//!
//! The reconciliation loops only talk to storage through [`ReconcileStore`].
//! [`DAL`](crate::dal::DAL) implements it over PostgreSQL; [`MemoryStore`]
//! implements it in process with the same claim semantics.
//!
//! Contract shared by both implementations:
//!
//! - claims return at most `limit` rows that are unprocessed, not
//!   quarantined and whose `available_at` has passed, ordered by id; each
//!   returned row has had `attempts` incremented and `available_at` pushed
//!   forward by the lease before the call returns
//! - two concurrent claims never return the same row
//! - any write that changes a reminder's or rollover's desired scheduler
//!   state appends an outbox row (PostgreSQL does this with triggers)

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{
    EntityRef, InboxEvent, InboxPayload, OutboxEvent, OutboxOp, QueueName, QueueStats,
    ReminderDefinition, RolloverDefinition,
};

pub use memory::{MemoryStore, QueueRowState, StoredReminder, StoredTask};

#[async_trait]
pub trait ReconcileStore: Send + Sync {
    /// Claims up to `limit` outbox rows for `lease`.
    async fn claim_outbox(
        &self,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxEvent>, StoreError>;

    /// Claims up to `limit` inbox rows for `lease`.
    async fn claim_inbox(&self, limit: usize, lease: Duration)
        -> Result<Vec<InboxEvent>, StoreError>;

    /// Appends an outbox row and returns its id.
    async fn enqueue_outbox(&self, op: OutboxOp, target: EntityRef) -> Result<i64, StoreError>;

    /// Appends an inbox row and returns its id.
    async fn record_inbox(&self, payload: &InboxPayload) -> Result<i64, StoreError>;

    /// Terminal success: sets `processed_at` and clears `last_error`.
    async fn mark_processed(&self, queue: QueueName, id: i64) -> Result<(), StoreError>;

    /// Records `error` and makes the row available again after `retry_in`.
    async fn mark_failed(
        &self,
        queue: QueueName,
        id: i64,
        error: &str,
        retry_in: Duration,
    ) -> Result<(), StoreError>;

    /// Sets the row aside; claims skip it until it is requeued.
    async fn quarantine(&self, queue: QueueName, id: i64, error: &str) -> Result<(), StoreError>;

    async fn queue_stats(&self, queue: QueueName) -> Result<QueueStats, StoreError>;

    /// Returns quarantined rows (all, or just `id`) to the pending state with
    /// a fresh attempt counter. Returns the number of rows requeued.
    async fn requeue_quarantined(
        &self,
        queue: QueueName,
        id: Option<i64>,
    ) -> Result<usize, StoreError>;

    /// Reads a reminder with its owning task's due date and done flag.
    async fn fetch_reminder(&self, id: i64) -> Result<Option<ReminderDefinition>, StoreError>;

    /// Reads a task's rollover configuration.
    async fn fetch_rollover(&self, task_id: i64) -> Result<Option<RolloverDefinition>, StoreError>;

    /// Refreshes the cached next fire time. Does not enqueue outbox rows.
    async fn set_next_fire_time(
        &self,
        reminder_id: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Records that a reminder fired. Does not enqueue outbox rows.
    async fn record_fire(&self, reminder_id: i64, fired_at: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Disables the given reminders that are still enabled and returns how
    /// many changed.
    async fn disable_reminders(&self, ids: &[i64]) -> Result<usize, StoreError>;

    /// Enabled interval and cron reminders whose `end_at` is at or before `now`.
    async fn lapsed_reminders(&self, now: DateTime<Utc>) -> Result<Vec<i64>, StoreError>;

    /// Moves an open task's due date. Returns `false` if the task is missing
    /// or already done.
    async fn apply_next_due_date(
        &self,
        task_id: i64,
        due: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
