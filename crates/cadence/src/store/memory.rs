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

//! In-process [`ReconcileStore`].
//!
//! Besides the trait, [`MemoryStore`] exposes a small mutation API standing in
//! for the application's writes (`insert_reminder`, `update_task`, ...). Those
//! append outbox rows exactly where the PostgreSQL triggers would.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::ReconcileStore;
use crate::error::StoreError;
use crate::models::{
    EntityRef, InboxEvent, InboxPayload, OutboxEvent, OutboxOp, QueueName, QueueStats,
    ReminderDefinition, ReminderKind, RolloverDefinition, TaskContext,
};

/// A reminder row as the application stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReminder {
    pub id: i64,
    pub kind: ReminderKind,
    pub enabled: bool,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub tz: String,
    pub task_id: Option<i64>,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl StoredReminder {
    pub fn new(id: i64, kind: ReminderKind) -> Self {
        Self {
            id,
            kind,
            enabled: true,
            start_at: None,
            end_at: None,
            tz: "UTC".to_string(),
            task_id: None,
            next_fire_at: None,
            last_fired_at: None,
        }
    }

    /// Whether a change from `self` to `other` can alter desired scheduler state.
    fn schedule_relevant_change(&self, other: &StoredReminder) -> bool {
        self.kind != other.kind
            || self.enabled != other.enabled
            || self.start_at != other.start_at
            || self.end_at != other.end_at
            || self.tz != other.tz
            || self.task_id != other.task_id
    }
}

/// A task row with its rollover configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTask {
    pub id: i64,
    pub due_date: Option<DateTime<Utc>>,
    pub done: bool,
    pub roll: bool,
    pub roll_spec: Option<serde_json::Value>,
    pub roll_tz: Option<String>,
}

impl StoredTask {
    pub fn new(id: i64, due_date: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            due_date,
            done: false,
            roll: false,
            roll_spec: None,
            roll_tz: None,
        }
    }

    fn context(&self) -> TaskContext {
        TaskContext {
            id: self.id,
            due_date: self.due_date,
            done: self.done,
        }
    }
}

/// Bookkeeping columns of a queue row, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRowState {
    pub id: i64,
    pub attempts: i32,
    pub available_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub quarantined_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl QueueRowState {
    fn new(id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            attempts: 0,
            available_at: now,
            processed_at: None,
            quarantined_at: None,
            last_error: None,
        }
    }

    fn claimable(&self, now: DateTime<Utc>) -> bool {
        self.processed_at.is_none() && self.quarantined_at.is_none() && self.available_at <= now
    }

    fn claim(&mut self, now: DateTime<Utc>, lease: Duration) {
        self.attempts += 1;
        self.available_at = saturating_after(now, lease);
    }
}

#[derive(Debug, Clone)]
struct QueueRow<T> {
    state: QueueRowState,
    body: T,
}

#[derive(Debug, Default)]
struct State {
    tasks: BTreeMap<i64, StoredTask>,
    reminders: BTreeMap<i64, StoredReminder>,
    outbox: Vec<QueueRow<(OutboxOp, EntityRef)>>,
    inbox: Vec<QueueRow<InboxPayload>>,
    next_outbox_id: i64,
    next_inbox_id: i64,
}

impl State {
    fn enqueue(&mut self, op: OutboxOp, target: EntityRef) -> i64 {
        self.next_outbox_id += 1;
        let id = self.next_outbox_id;
        self.outbox.push(QueueRow {
            state: QueueRowState::new(id, Utc::now()),
            body: (op, target),
        });
        id
    }

    fn row_state_mut(&mut self, queue: QueueName, id: i64) -> Option<&mut QueueRowState> {
        match queue {
            QueueName::Outbox => self
                .outbox
                .iter_mut()
                .find(|r| r.state.id == id)
                .map(|r| &mut r.state),
            QueueName::Inbox => self
                .inbox
                .iter_mut()
                .find(|r| r.state.id == id)
                .map(|r| &mut r.state),
        }
    }

    fn row_states(&self, queue: QueueName) -> Vec<&QueueRowState> {
        match queue {
            QueueName::Outbox => self.outbox.iter().map(|r| &r.state).collect(),
            QueueName::Inbox => self.inbox.iter().map(|r| &r.state).collect(),
        }
    }

    /// Outbox fan-out for a task change, mirroring the tasks trigger.
    fn task_changed(&mut self, before: &StoredTask, after: &StoredTask) {
        if before.due_date != after.due_date || before.done != after.done {
            let dependents: Vec<i64> = self
                .reminders
                .values()
                .filter(|r| {
                    r.task_id == Some(after.id)
                        && matches!(r.kind, ReminderKind::TaskDueBefore { .. })
                })
                .map(|r| r.id)
                .collect();
            for id in dependents {
                self.enqueue(OutboxOp::Upsert, EntityRef::reminder(id));
            }
        }
        let roll_changed = before.due_date != after.due_date
            || before.done != after.done
            || before.roll != after.roll
            || before.roll_spec != after.roll_spec
            || before.roll_tz != after.roll_tz;
        if roll_changed && (before.roll || after.roll) {
            self.enqueue(OutboxOp::Upsert, EntityRef::rollover(after.id));
        }
    }
}

/// `now + d`, clamped to the latest representable instant.
fn saturating_after(now: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn missing_row(queue: QueueName, id: i64) -> StoreError {
    StoreError::RowNotFound {
        table: queue.table(),
        id,
    }
}

/// An in-memory [`ReconcileStore`] with trigger-equivalent outbox writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_task(&self, task: StoredTask) {
        let mut state = self.state.lock();
        let roll = task.roll;
        let id = task.id;
        state.tasks.insert(id, task);
        if roll {
            state.enqueue(OutboxOp::Upsert, EntityRef::rollover(id));
        }
    }

    /// Applies `change` to a task, enqueueing what the tasks trigger would.
    pub fn update_task<F>(&self, id: i64, change: F) -> bool
    where
        F: FnOnce(&mut StoredTask),
    {
        let mut state = self.state.lock();
        let Some(before) = state.tasks.get(&id).cloned() else {
            return false;
        };
        let mut after = before.clone();
        change(&mut after);
        after.id = id;
        state.tasks.insert(id, after.clone());
        state.task_changed(&before, &after);
        true
    }

    /// Deletes a task and, as the foreign key cascade would, its reminders.
    pub fn delete_task(&self, id: i64) -> bool {
        let mut state = self.state.lock();
        if state.tasks.remove(&id).is_none() {
            return false;
        }
        let owned: Vec<i64> = state
            .reminders
            .values()
            .filter(|r| r.task_id == Some(id))
            .map(|r| r.id)
            .collect();
        for rid in owned {
            state.reminders.remove(&rid);
            state.enqueue(OutboxOp::Delete, EntityRef::reminder(rid));
        }
        state.enqueue(OutboxOp::Delete, EntityRef::rollover(id));
        true
    }

    pub fn insert_reminder(&self, reminder: StoredReminder) {
        let mut state = self.state.lock();
        let id = reminder.id;
        state.reminders.insert(id, reminder);
        state.enqueue(OutboxOp::Upsert, EntityRef::reminder(id));
    }

    /// Applies `change` to a reminder, enqueueing an upsert when a
    /// schedule-relevant column changed.
    pub fn update_reminder<F>(&self, id: i64, change: F) -> bool
    where
        F: FnOnce(&mut StoredReminder),
    {
        let mut state = self.state.lock();
        let Some(before) = state.reminders.get(&id).cloned() else {
            return false;
        };
        let mut after = before.clone();
        change(&mut after);
        after.id = id;
        let relevant = before.schedule_relevant_change(&after);
        state.reminders.insert(id, after);
        if relevant {
            state.enqueue(OutboxOp::Upsert, EntityRef::reminder(id));
        }
        true
    }

    pub fn delete_reminder(&self, id: i64) -> bool {
        let mut state = self.state.lock();
        if state.reminders.remove(&id).is_none() {
            return false;
        }
        state.enqueue(OutboxOp::Delete, EntityRef::reminder(id));
        true
    }

    pub fn reminder(&self, id: i64) -> Option<StoredReminder> {
        self.state.lock().reminders.get(&id).cloned()
    }

    pub fn task(&self, id: i64) -> Option<StoredTask> {
        self.state.lock().tasks.get(&id).cloned()
    }

    /// Snapshot of a queue's bookkeeping columns, ordered by id.
    pub fn queue_rows(&self, queue: QueueName) -> Vec<QueueRowState> {
        self.state
            .lock()
            .row_states(queue)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Outbox rows not yet processed, with their targets.
    pub fn pending_outbox(&self) -> Vec<(OutboxOp, EntityRef)> {
        self.state
            .lock()
            .outbox
            .iter()
            .filter(|r| r.state.processed_at.is_none() && r.state.quarantined_at.is_none())
            .map(|r| r.body)
            .collect()
    }

    /// Makes every pending row of `queue` claimable now, skipping backoff.
    pub fn expire_leases(&self, queue: QueueName) {
        let mut state = self.state.lock();
        let now = Utc::now();
        let rows: Vec<&mut QueueRowState> = match queue {
            QueueName::Outbox => state.outbox.iter_mut().map(|r| &mut r.state).collect(),
            QueueName::Inbox => state.inbox.iter_mut().map(|r| &mut r.state).collect(),
        };
        for row in rows {
            if row.processed_at.is_none() {
                row.available_at = now;
            }
        }
    }
}

#[async_trait]
impl ReconcileStore for MemoryStore {
    async fn claim_outbox(
        &self,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxEvent>, StoreError> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let mut claimed = Vec::new();
        for row in state.outbox.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            if row.state.claimable(now) {
                row.state.claim(now, lease);
                let (op, target) = row.body;
                claimed.push(OutboxEvent {
                    id: row.state.id,
                    op,
                    target,
                    attempts: row.state.attempts,
                });
            }
        }
        Ok(claimed)
    }

    async fn claim_inbox(
        &self,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<InboxEvent>, StoreError> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let mut claimed = Vec::new();
        for row in state.inbox.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            if row.state.claimable(now) {
                row.state.claim(now, lease);
                claimed.push(InboxEvent {
                    id: row.state.id,
                    payload: row.body.clone(),
                    attempts: row.state.attempts,
                });
            }
        }
        Ok(claimed)
    }

    async fn enqueue_outbox(&self, op: OutboxOp, target: EntityRef) -> Result<i64, StoreError> {
        Ok(self.state.lock().enqueue(op, target))
    }

    async fn record_inbox(&self, payload: &InboxPayload) -> Result<i64, StoreError> {
        let mut state = self.state.lock();
        state.next_inbox_id += 1;
        let id = state.next_inbox_id;
        state.inbox.push(QueueRow {
            state: QueueRowState::new(id, Utc::now()),
            body: payload.clone(),
        });
        Ok(id)
    }

    async fn mark_processed(&self, queue: QueueName, id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let row = state
            .row_state_mut(queue, id)
            .ok_or_else(|| missing_row(queue, id))?;
        row.processed_at = Some(Utc::now());
        row.last_error = None;
        Ok(())
    }

    async fn mark_failed(
        &self,
        queue: QueueName,
        id: i64,
        error: &str,
        retry_in: Duration,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let row = state
            .row_state_mut(queue, id)
            .ok_or_else(|| missing_row(queue, id))?;
        row.last_error = Some(error.to_string());
        row.available_at = saturating_after(Utc::now(), retry_in);
        Ok(())
    }

    async fn quarantine(&self, queue: QueueName, id: i64, error: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let row = state
            .row_state_mut(queue, id)
            .ok_or_else(|| missing_row(queue, id))?;
        row.last_error = Some(error.to_string());
        row.quarantined_at = Some(Utc::now());
        Ok(())
    }

    async fn queue_stats(&self, queue: QueueName) -> Result<QueueStats, StoreError> {
        let state = self.state.lock();
        let mut stats = QueueStats::default();
        for row in state.row_states(queue) {
            if row.processed_at.is_some() {
                stats.processed += 1;
            } else if row.quarantined_at.is_some() {
                stats.quarantined += 1;
            } else {
                stats.pending += 1;
            }
        }
        Ok(stats)
    }

    async fn requeue_quarantined(
        &self,
        queue: QueueName,
        id: Option<i64>,
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let rows: Vec<&mut QueueRowState> = match queue {
            QueueName::Outbox => state.outbox.iter_mut().map(|r| &mut r.state).collect(),
            QueueName::Inbox => state.inbox.iter_mut().map(|r| &mut r.state).collect(),
        };
        let mut count = 0;
        for row in rows {
            if row.quarantined_at.is_none() || row.processed_at.is_some() {
                continue;
            }
            if id.is_some_and(|id| id != row.id) {
                continue;
            }
            row.quarantined_at = None;
            row.attempts = 0;
            row.available_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn fetch_reminder(&self, id: i64) -> Result<Option<ReminderDefinition>, StoreError> {
        let state = self.state.lock();
        Ok(state.reminders.get(&id).map(|r| ReminderDefinition {
            id: r.id,
            kind: r.kind.clone(),
            enabled: r.enabled,
            start_at: r.start_at,
            end_at: r.end_at,
            tz: r.tz.clone(),
            task: r
                .task_id
                .and_then(|tid| state.tasks.get(&tid))
                .map(StoredTask::context),
            next_fire_at: r.next_fire_at,
        }))
    }

    async fn fetch_rollover(&self, task_id: i64) -> Result<Option<RolloverDefinition>, StoreError> {
        Ok(self
            .state
            .lock()
            .tasks
            .get(&task_id)
            .map(|t| RolloverDefinition {
                task: t.context(),
                roll: t.roll,
                roll_spec: t.roll_spec.clone(),
                roll_tz: t.roll_tz.clone(),
            }))
    }

    async fn set_next_fire_time(
        &self,
        reminder_id: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        if let Some(r) = self.state.lock().reminders.get_mut(&reminder_id) {
            r.next_fire_at = at;
        }
        Ok(())
    }

    async fn record_fire(
        &self,
        reminder_id: i64,
        fired_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(r) = self.state.lock().reminders.get_mut(&reminder_id) {
            r.last_fired_at = Some(fired_at);
        }
        Ok(())
    }

    async fn disable_reminders(&self, ids: &[i64]) -> Result<usize, StoreError> {
        let mut state = self.state.lock();
        let mut changed = Vec::new();
        for id in ids {
            if let Some(r) = state.reminders.get_mut(id) {
                if r.enabled {
                    r.enabled = false;
                    changed.push(*id);
                }
            }
        }
        for id in &changed {
            state.enqueue(OutboxOp::Upsert, EntityRef::reminder(*id));
        }
        Ok(changed.len())
    }

    async fn lapsed_reminders(&self, now: DateTime<Utc>) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .state
            .lock()
            .reminders
            .values()
            .filter(|r| {
                r.enabled && r.kind.is_recurring() && r.end_at.is_some_and(|end| end <= now)
            })
            .map(|r| r.id)
            .collect())
    }

    async fn apply_next_due_date(
        &self,
        task_id: i64,
        due: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let Some(before) = state.tasks.get(&task_id).cloned() else {
            return Ok(false);
        };
        if before.done {
            return Ok(false);
        }
        let mut after = before.clone();
        after.due_date = Some(due);
        state.tasks.insert(task_id, after.clone());
        state.task_changed(&before, &after);
        Ok(true)
    }
}
