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

//! Task reads and writes: rollover configuration and due dates.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::models::{NewTask, TaskRow};
use super::DAL;
use crate::database::schema::tasks;
use crate::error::StoreError;
use crate::models::RolloverDefinition;

#[derive(Clone)]
pub struct TaskDAL<'a> {
    dal: &'a DAL,
}

impl<'a> TaskDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn create(&self, new_task: NewTask) -> Result<i64, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let id = conn
            .interact(move |conn| {
                diesel::insert_into(tasks::table)
                    .values(&new_task)
                    .returning(tasks::id)
                    .get_result::<i64>(conn)
            })
            .await??;
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Option<TaskRow>, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let row = conn
            .interact(move |conn| {
                tasks::table
                    .find(id)
                    .select(TaskRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await??;
        Ok(row)
    }

    pub async fn fetch_rollover(&self, id: i64) -> Result<Option<RolloverDefinition>, StoreError> {
        Ok(self.get(id).await?.map(TaskRow::into_rollover))
    }

    pub async fn set_done(&self, id: i64, done: bool) -> Result<bool, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let updated = conn
            .interact(move |conn| {
                diesel::update(tasks::table.find(id))
                    .set(tasks::done.eq(done))
                    .execute(conn)
            })
            .await??;
        Ok(updated > 0)
    }

    /// Moves the due date of an open task. The tasks trigger then enqueues
    /// its dependent reminders and its rollover.
    pub async fn apply_next_due_date(
        &self,
        id: i64,
        due: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let updated = conn
            .interact(move |conn| {
                diesel::update(tasks::table.find(id).filter(tasks::done.eq(false)))
                    .set(tasks::due_date.eq(Some(due)))
                    .execute(conn)
            })
            .await??;
        Ok(updated > 0)
    }
}
