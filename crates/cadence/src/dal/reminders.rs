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

//! Reminder reads and the cache writes the reconciler makes.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::models::{NewReminder, ReminderRow};
use super::DAL;
use crate::database::schema::{reminders, tasks};
use crate::error::StoreError;
use crate::models::{ReminderDefinition, TaskContext};

/// Kinds the expiry sweep retires.
const RECURRING_KINDS: [&str; 2] = ["interval", "cron"];

#[derive(Clone)]
pub struct ReminderDAL<'a> {
    dal: &'a DAL,
}

impl<'a> ReminderDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a reminder and returns its id. The insert trigger enqueues it.
    pub async fn create(&self, new_reminder: NewReminder) -> Result<i64, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let id = conn
            .interact(move |conn| {
                diesel::insert_into(reminders::table)
                    .values(&new_reminder)
                    .returning(reminders::id)
                    .get_result::<i64>(conn)
            })
            .await??;
        Ok(id)
    }

    /// Reads a reminder together with its task's due date and done flag.
    pub async fn fetch(&self, id: i64) -> Result<Option<ReminderDefinition>, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let row = conn
            .interact(move |conn| {
                reminders::table
                    .left_join(tasks::table)
                    .filter(reminders::id.eq(id))
                    .select((
                        ReminderRow::as_select(),
                        (tasks::id, tasks::due_date, tasks::done).nullable(),
                    ))
                    .first::<(ReminderRow, Option<(i64, Option<DateTime<Utc>>, bool)>)>(conn)
                    .optional()
            })
            .await??;

        Ok(row.map(|(reminder, task)| {
            let task = task.map(|(id, due_date, done)| TaskContext { id, due_date, done });
            reminder.into_definition(task)
        }))
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<bool, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let updated = conn
            .interact(move |conn| {
                diesel::update(reminders::table.find(id))
                    .set(reminders::enabled.eq(enabled))
                    .execute(conn)
            })
            .await??;
        Ok(updated > 0)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let deleted = conn
            .interact(move |conn| diesel::delete(reminders::table.find(id)).execute(conn))
            .await??;
        Ok(deleted > 0)
    }

    /// Cache write; the trigger ignores this column.
    pub async fn set_next_fire_time(
        &self,
        id: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let conn = self.dal.database.get_connection().await?;
        conn.interact(move |conn| {
            diesel::update(reminders::table.find(id))
                .set(reminders::next_fire_at.eq(at))
                .execute(conn)
        })
        .await??;
        Ok(())
    }

    pub async fn record_fire(&self, id: i64, fired_at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.dal.database.get_connection().await?;
        conn.interact(move |conn| {
            diesel::update(reminders::table.find(id))
                .set(reminders::last_fired_at.eq(Some(fired_at)))
                .execute(conn)
        })
        .await??;
        Ok(())
    }

    /// Disables the still-enabled reminders among `ids`.
    pub async fn disable(&self, ids: &[i64]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.dal.database.get_connection().await?;
        let ids = ids.to_vec();
        let updated = conn
            .interact(move |conn| {
                diesel::update(
                    reminders::table
                        .filter(reminders::id.eq_any(ids))
                        .filter(reminders::enabled.eq(true)),
                )
                .set(reminders::enabled.eq(false))
                .execute(conn)
            })
            .await??;
        Ok(updated)
    }

    /// Enabled recurring reminders whose window ended by `now`.
    pub async fn lapsed(&self, now: DateTime<Utc>) -> Result<Vec<i64>, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let ids = conn
            .interact(move |conn| {
                reminders::table
                    .filter(reminders::enabled.eq(true))
                    .filter(reminders::end_at.le(now))
                    .filter(reminders::kind.eq_any(RECURRING_KINDS))
                    .order(reminders::id.asc())
                    .select(reminders::id)
                    .load::<i64>(conn)
            })
            .await??;
        Ok(ids)
    }
}
