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

//! Outbox and inbox access.
//!
//! Both queues share their bookkeeping columns, so [`QueueDAL`] serves
//! either table. Claims use `FOR UPDATE SKIP LOCKED` so concurrent drainers,
//! in this process or another, never receive the same row.

use std::time::Duration;

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Integer, Jsonb, Nullable, Text};
use tracing::error;

use super::models::{NewInboxEntry, NewOutboxEntry};
use super::DAL;
use crate::database::schema::{reminder_inbox, reminder_outbox};
use crate::error::StoreError;
use crate::models::{
    EntityKind, EntityRef, InboxEvent, InboxPayload, OutboxEvent, OutboxOp, QueueName, QueueStats,
};

/// Claims up to `$1` rows for `$2` seconds, oldest first.
fn claim_sql(table: &str, returning: &str) -> String {
    format!(
        r#"
        UPDATE {table} q
        SET attempts = q.attempts + 1,
            available_at = NOW() + make_interval(secs => $2)
        FROM (
            SELECT id FROM {table}
            WHERE processed_at IS NULL
              AND quarantined_at IS NULL
              AND available_at <= NOW()
            ORDER BY id
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        ) claimable
        WHERE q.id = claimable.id
        RETURNING {returning}
        "#
    )
}

#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ClaimedOutboxRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Text)]
    op: String,
    #[diesel(sql_type = Text)]
    entity_kind: String,
    #[diesel(sql_type = BigInt)]
    entity_id: i64,
    #[diesel(sql_type = Integer)]
    attempts: i32,
}

impl TryFrom<ClaimedOutboxRow> for OutboxEvent {
    type Error = StoreError;

    fn try_from(row: ClaimedOutboxRow) -> Result<Self, Self::Error> {
        let op = row.op.parse::<OutboxOp>().map_err(|value| StoreError::InvalidValue {
            column: "reminder_outbox.op",
            value,
        })?;
        let kind = row
            .entity_kind
            .parse::<EntityKind>()
            .map_err(|value| StoreError::InvalidValue {
                column: "reminder_outbox.entity_kind",
                value,
            })?;
        Ok(OutboxEvent {
            id: row.id,
            op,
            target: EntityRef {
                kind,
                id: row.entity_id,
            },
            attempts: row.attempts,
        })
    }
}

#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ClaimedInboxRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Jsonb)]
    payload: serde_json::Value,
    #[diesel(sql_type = Integer)]
    attempts: i32,
}

impl TryFrom<ClaimedInboxRow> for InboxEvent {
    type Error = StoreError;

    fn try_from(row: ClaimedInboxRow) -> Result<Self, Self::Error> {
        let payload = serde_json::from_value::<InboxPayload>(row.payload).map_err(|e| {
            StoreError::InvalidPayload {
                table: QueueName::Inbox.table(),
                id: row.id,
                message: e.to_string(),
            }
        })?;
        Ok(InboxEvent {
            id: row.id,
            payload,
            attempts: row.attempts,
        })
    }
}

/// Decodes claimed rows one by one, keeping the id and error of each row
/// that does not decode.
fn decode_claimed<R, T>(
    rows: Vec<R>,
    id: impl Fn(&R) -> i64,
    decode: impl Fn(R) -> Result<T, StoreError>,
) -> (Vec<T>, Vec<(i64, StoreError)>) {
    let mut decoded = Vec::with_capacity(rows.len());
    let mut undecodable = Vec::new();
    for row in rows {
        let row_id = id(&row);
        match decode(row) {
            Ok(event) => decoded.push(event),
            Err(e) => undecodable.push((row_id, e)),
        }
    }
    (decoded, undecodable)
}

/// Quarantines rows no drainer can ever process, so they stop being claimed.
async fn quarantine_undecodable(
    dal: &DAL,
    queue: QueueName,
    undecodable: Vec<(i64, StoreError)>,
) -> Result<(), StoreError> {
    for (id, e) in undecodable {
        error!(%queue, id, error = %e, "Quarantining undecodable row");
        dal.queue(queue).quarantine(id, &e.to_string()).await?;
    }
    Ok(())
}

#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct StatsRow {
    #[diesel(sql_type = BigInt)]
    pending: i64,
    #[diesel(sql_type = BigInt)]
    quarantined: i64,
    #[diesel(sql_type = BigInt)]
    processed: i64,
}

/// Outbox-specific operations.
#[derive(Clone)]
pub struct OutboxDAL<'a> {
    dal: &'a DAL,
}

impl<'a> OutboxDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Appends an event. Most events come from triggers; this is for
    /// callers that need to force a resync.
    pub async fn enqueue(&self, op: OutboxOp, target: EntityRef) -> Result<i64, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let entry = NewOutboxEntry {
            op: op.as_str(),
            entity_kind: target.kind.as_str(),
            entity_id: target.id,
        };
        let id = conn
            .interact(move |conn| {
                diesel::insert_into(reminder_outbox::table)
                    .values(&entry)
                    .returning(reminder_outbox::id)
                    .get_result::<i64>(conn)
            })
            .await??;
        Ok(id)
    }

    pub async fn claim(&self, limit: usize, lease: Duration) -> Result<Vec<OutboxEvent>, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let sql = claim_sql(
            QueueName::Outbox.table(),
            "q.id, q.op, q.entity_kind, q.entity_id, q.attempts",
        );
        let limit = limit as i64;
        let lease = lease.as_secs_f64();
        let mut rows: Vec<ClaimedOutboxRow> = conn
            .interact(move |conn| {
                diesel::sql_query(sql)
                    .bind::<BigInt, _>(limit)
                    .bind::<Double, _>(lease)
                    .load(conn)
            })
            .await??;
        rows.sort_by_key(|r| r.id);
        let (events, undecodable) = decode_claimed(rows, |r| r.id, OutboxEvent::try_from);
        quarantine_undecodable(self.dal, QueueName::Outbox, undecodable).await?;
        Ok(events)
    }
}

/// Inbox-specific operations.
#[derive(Clone)]
pub struct InboxDAL<'a> {
    dal: &'a DAL,
}

impl<'a> InboxDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn record(&self, payload: &InboxPayload) -> Result<i64, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let entry = NewInboxEntry {
            kind: payload.kind().to_string(),
            payload: serde_json::to_value(payload).map_err(|e| StoreError::InvalidPayload {
                table: QueueName::Inbox.table(),
                id: 0,
                message: e.to_string(),
            })?,
        };
        let id = conn
            .interact(move |conn| {
                diesel::insert_into(reminder_inbox::table)
                    .values(&entry)
                    .returning(reminder_inbox::id)
                    .get_result::<i64>(conn)
            })
            .await??;
        Ok(id)
    }

    pub async fn claim(&self, limit: usize, lease: Duration) -> Result<Vec<InboxEvent>, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let sql = claim_sql(QueueName::Inbox.table(), "q.id, q.payload, q.attempts");
        let limit = limit as i64;
        let lease = lease.as_secs_f64();
        let mut rows: Vec<ClaimedInboxRow> = conn
            .interact(move |conn| {
                diesel::sql_query(sql)
                    .bind::<BigInt, _>(limit)
                    .bind::<Double, _>(lease)
                    .load(conn)
            })
            .await??;
        rows.sort_by_key(|r| r.id);
        let (events, undecodable) = decode_claimed(rows, |r| r.id, InboxEvent::try_from);
        quarantine_undecodable(self.dal, QueueName::Inbox, undecodable).await?;
        Ok(events)
    }
}

/// Terminal-state bookkeeping shared by both queues.
#[derive(Clone)]
pub struct QueueDAL<'a> {
    dal: &'a DAL,
    queue: QueueName,
}

impl<'a> QueueDAL<'a> {
    pub fn new(dal: &'a DAL, queue: QueueName) -> Self {
        Self { dal, queue }
    }

    /// Runs an `UPDATE` that must touch the row `id`.
    async fn update_row<F>(&self, id: i64, build: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut diesel::PgConnection) -> QueryResult<usize> + Send + 'static,
    {
        let conn = self.dal.database.get_connection().await?;
        let updated = conn.interact(build).await??;
        if updated == 0 {
            return Err(StoreError::RowNotFound {
                table: self.queue.table(),
                id,
            });
        }
        Ok(())
    }

    pub async fn mark_processed(&self, id: i64) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET processed_at = NOW(), last_error = NULL WHERE id = $1",
            self.queue.table()
        );
        self.update_row(id, move |conn| {
            diesel::sql_query(sql).bind::<BigInt, _>(id).execute(conn)
        })
        .await
    }

    pub async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        retry_in: Duration,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET last_error = $2, available_at = NOW() + make_interval(secs => $3) \
             WHERE id = $1",
            self.queue.table()
        );
        let error = error.to_string();
        let retry_in = retry_in.as_secs_f64();
        self.update_row(id, move |conn| {
            diesel::sql_query(sql)
                .bind::<BigInt, _>(id)
                .bind::<Text, _>(error)
                .bind::<Double, _>(retry_in)
                .execute(conn)
        })
        .await
    }

    pub async fn quarantine(&self, id: i64, error: &str) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET quarantined_at = NOW(), last_error = $2 WHERE id = $1",
            self.queue.table()
        );
        let error = error.to_string();
        self.update_row(id, move |conn| {
            diesel::sql_query(sql)
                .bind::<BigInt, _>(id)
                .bind::<Text, _>(error)
                .execute(conn)
        })
        .await
    }

    pub async fn stats(&self) -> Result<QueueStats, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let sql = format!(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE processed_at IS NULL AND quarantined_at IS NULL) AS pending,
                COUNT(*) FILTER (WHERE processed_at IS NULL AND quarantined_at IS NOT NULL) AS quarantined,
                COUNT(*) FILTER (WHERE processed_at IS NOT NULL) AS processed
            FROM {}
            "#,
            self.queue.table()
        );
        let row: StatsRow = conn
            .interact(move |conn| diesel::sql_query(sql).get_result(conn))
            .await??;
        Ok(QueueStats {
            pending: row.pending,
            quarantined: row.quarantined,
            processed: row.processed,
        })
    }

    /// Returns quarantined rows to the pending state with a fresh counter.
    pub async fn requeue_quarantined(&self, id: Option<i64>) -> Result<usize, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let sql = format!(
            "UPDATE {} SET quarantined_at = NULL, attempts = 0, available_at = NOW() \
             WHERE quarantined_at IS NOT NULL AND processed_at IS NULL \
             AND ($1::BIGINT IS NULL OR id = $1)",
            self.queue.table()
        );
        let requeued = conn
            .interact(move |conn| {
                diesel::sql_query(sql)
                    .bind::<Nullable<BigInt>, _>(id)
                    .execute(conn)
            })
            .await??;
        Ok(requeued)
    }
}
