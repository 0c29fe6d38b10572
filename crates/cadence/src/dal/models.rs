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

//! Diesel row structs and their conversions into domain models.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::database::schema::{reminder_inbox, reminder_outbox, reminders, tasks};
use crate::models::{ReminderDefinition, ReminderKind, RolloverDefinition, TaskContext};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = reminders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReminderRow {
    pub id: i64,
    pub kind: String,
    pub enabled: bool,
    pub fire_at: Option<DateTime<Utc>>,
    pub before_seconds: Option<i64>,
    pub every_seconds: Option<i64>,
    pub cron: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub tz: String,
    pub task_id: Option<i64>,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl ReminderRow {
    pub fn into_definition(self, task: Option<TaskContext>) -> ReminderDefinition {
        ReminderDefinition {
            id: self.id,
            kind: ReminderKind::from_columns(
                &self.kind,
                self.fire_at,
                self.before_seconds,
                self.every_seconds,
                self.cron,
            ),
            enabled: self.enabled,
            start_at: self.start_at,
            end_at: self.end_at,
            tz: self.tz,
            task,
            next_fire_at: self.next_fire_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reminders)]
pub struct NewReminder {
    pub kind: String,
    pub enabled: bool,
    pub fire_at: Option<DateTime<Utc>>,
    pub before_seconds: Option<i64>,
    pub every_seconds: Option<i64>,
    pub cron: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub tz: String,
    pub task_id: Option<i64>,
}

impl NewReminder {
    /// An enabled reminder in UTC with the columns for `kind` filled in.
    pub fn new(kind: &ReminderKind) -> Self {
        let mut row = Self {
            kind: kind.tag().to_string(),
            enabled: true,
            fire_at: None,
            before_seconds: None,
            every_seconds: None,
            cron: None,
            start_at: None,
            end_at: None,
            tz: "UTC".to_string(),
            task_id: None,
        };
        match kind {
            ReminderKind::OneOff { at } => row.fire_at = *at,
            ReminderKind::TaskDueBefore { before } => {
                row.before_seconds = before.map(|d| d.num_seconds())
            }
            ReminderKind::Interval { every } => row.every_seconds = every.map(|d| d.num_seconds()),
            ReminderKind::Cron { expr } => row.cron = expr.clone(),
            ReminderKind::Unknown { .. } => {}
        }
        row
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    pub id: i64,
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub done: bool,
    pub roll: bool,
    pub roll_spec: Option<serde_json::Value>,
    pub roll_tz: Option<String>,
}

impl TaskRow {
    pub fn context(&self) -> TaskContext {
        TaskContext {
            id: self.id,
            due_date: self.due_date,
            done: self.done,
        }
    }

    pub fn into_rollover(self) -> RolloverDefinition {
        RolloverDefinition {
            task: self.context(),
            roll: self.roll,
            roll_spec: self.roll_spec,
            roll_tz: self.roll_tz,
        }
    }
}

#[derive(Debug, Clone, Default, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub done: bool,
    pub roll: bool,
    pub roll_spec: Option<serde_json::Value>,
    pub roll_tz: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reminder_outbox)]
pub struct NewOutboxEntry<'a> {
    pub op: &'a str,
    pub entity_kind: &'a str,
    pub entity_id: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reminder_inbox)]
pub struct NewInboxEntry {
    pub kind: String,
    pub payload: serde_json::Value,
}
