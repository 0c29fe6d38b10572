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

//! Outbox and inbox queue rows.
//!
//! Both queues share one discipline: rows are appended, claimed with a lease
//! (which also bumps `attempts`), and end either processed, rescheduled with
//! backoff, or quarantined. Rows are never deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which reconciliation queue a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Outbox,
    Inbox,
}

impl QueueName {
    pub fn table(&self) -> &'static str {
        match self {
            QueueName::Outbox => "reminder_outbox",
            QueueName::Inbox => "reminder_inbox",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// The kind of domain entity an outbox row targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Reminder,
    Rollover,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Reminder => "reminder",
            EntityKind::Rollover => "rollover",
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reminder" => Ok(EntityKind::Reminder),
            "rollover" => Ok(EntityKind::Rollover),
            other => Err(other.to_string()),
        }
    }
}

/// A reference to a reminder (by reminder id) or a rollover (by task id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    pub fn reminder(id: i64) -> Self {
        Self {
            kind: EntityKind::Reminder,
            id,
        }
    }

    pub fn rollover(task_id: i64) -> Self {
        Self {
            kind: EntityKind::Rollover,
            id: task_id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Requested reconciliation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboxOp {
    /// Re-read the entity and converge the scheduler to it
    Upsert,
    /// Remove the external schedule unconditionally
    Delete,
}

impl OutboxOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxOp::Upsert => "upsert",
            OutboxOp::Delete => "delete",
        }
    }
}

impl FromStr for OutboxOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(OutboxOp::Upsert),
            "delete" => Ok(OutboxOp::Delete),
            other => Err(other.to_string()),
        }
    }
}

/// A claimed outbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEvent {
    /// Monotonic row id; claims are ordered by it
    pub id: i64,
    pub op: OutboxOp,
    pub target: EntityRef,
    /// Attempt counter, already incremented by the claim
    pub attempts: i32,
}

/// A fact reported back by the scheduler side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboxPayload {
    /// A reminder's schedule fired.
    Fired {
        reminder_id: i64,
        fired_at: DateTime<Utc>,
        delete_after: bool,
    },
    /// A reminder's schedule has no future fire times.
    Exhausted { reminder_id: i64 },
    /// The scheduler reported the next fire time for a reminder.
    NextFireTime {
        reminder_id: i64,
        at: Option<DateTime<Utc>>,
    },
    /// A rollover fired and computed the task's next due date.
    NextDueComputed { task_id: i64, due: DateTime<Utc> },
}

impl InboxPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            InboxPayload::Fired { .. } => "fired",
            InboxPayload::Exhausted { .. } => "exhausted",
            InboxPayload::NextFireTime { .. } => "next_fire_time",
            InboxPayload::NextDueComputed { .. } => "next_due_computed",
        }
    }
}

/// A claimed inbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEvent {
    pub id: i64,
    pub payload: InboxPayload,
    pub attempts: i32,
}

/// Row counts for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Unprocessed and not quarantined
    pub pending: i64,
    /// Unprocessed and set aside after exhausting attempts
    pub quarantined: i64,
    pub processed: i64,
}
