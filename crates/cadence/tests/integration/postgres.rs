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

//! PostgreSQL-backed tests for the DAL, the triggers and the claim query.
//!
//! Set `CADENCE_TEST_DATABASE_URL` to run them. Each test truncates the
//! reconciler tables, so point it at a scratch database.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use diesel::RunQueryDsl;
use serial_test::serial;
use tokio::sync::Barrier;

use cadence::dal::{NewReminder, NewTask};
use cadence::models::ReminderKind;
use cadence::{
    Database, EntityRef, InMemoryScheduler, InboxPayload, OutboxDrainer, OutboxOp, QueueName,
    ReconcileStore, ReconcilerConfig, ScheduleHandle, SchedulerGateway, DAL,
};

const DATABASE_URL_VAR: &str = "CADENCE_TEST_DATABASE_URL";

/// A migrated, empty database, or `None` when no test database is configured.
async fn fresh_dal() -> Option<DAL> {
    let url = std::env::var(DATABASE_URL_VAR).ok()?;
    let database = Database::new(&url, 8).expect("Failed to create pool");
    database
        .run_migrations()
        .await
        .expect("Failed to run migrations");
    let conn = database
        .get_connection()
        .await
        .expect("Failed to get connection");
    conn.interact(|conn| {
        diesel::sql_query(
            "TRUNCATE reminder_inbox, reminder_outbox, reminders, tasks RESTART IDENTITY CASCADE",
        )
        .execute(conn)
    })
    .await
    .expect("interact failed")
    .expect("Failed to truncate");
    Some(DAL::new(database))
}

async fn pending(dal: &DAL) -> i64 {
    dal.queue_stats(QueueName::Outbox).await.unwrap().pending
}

#[tokio::test]
#[serial]
async fn reminder_triggers_enqueue_only_schedule_relevant_changes() {
    let Some(dal) = fresh_dal().await else {
        return;
    };
    let id = dal
        .reminders()
        .create(NewReminder::new(&ReminderKind::Cron {
            expr: Some("0 9 * * *".into()),
        }))
        .await
        .unwrap();
    assert_eq!(pending(&dal).await, 1);

    // Cache columns are written by the reconciler itself.
    dal.set_next_fire_time(id, Some(Utc::now())).await.unwrap();
    dal.record_fire(id, Utc::now()).await.unwrap();
    assert_eq!(pending(&dal).await, 1);

    dal.reminders().set_enabled(id, false).await.unwrap();
    assert_eq!(pending(&dal).await, 2);

    dal.reminders().delete(id).await.unwrap();
    let claimed = dal.claim_outbox(10, Duration::from_secs(30)).await.unwrap();
    let ops: Vec<(OutboxOp, EntityRef)> = claimed.iter().map(|e| (e.op, e.target)).collect();
    assert_eq!(
        ops,
        vec![
            (OutboxOp::Upsert, EntityRef::reminder(id)),
            (OutboxOp::Upsert, EntityRef::reminder(id)),
            (OutboxOp::Delete, EntityRef::reminder(id)),
        ]
    );
}

#[tokio::test]
#[serial]
async fn task_triggers_fan_out_to_reminders_and_rollover() {
    let Some(dal) = fresh_dal().await else {
        return;
    };
    let task_id = dal
        .tasks()
        .create(NewTask {
            title: "water the plants".into(),
            due_date: Some(Utc::now() + ChronoDuration::days(1)),
            roll: true,
            roll_spec: Some(serde_json::json!({"kind": "cron", "expr": "0 9 * * *"})),
            ..NewTask::default()
        })
        .await
        .unwrap();
    let mut reminder = NewReminder::new(&ReminderKind::TaskDueBefore {
        before: Some(ChronoDuration::hours(1)),
    });
    reminder.task_id = Some(task_id);
    let reminder_id = dal.reminders().create(reminder).await.unwrap();
    dal.claim_outbox(10, Duration::from_secs(30)).await.unwrap();

    dal.tasks().set_done(task_id, true).await.unwrap();
    let claimed = dal.claim_outbox(10, Duration::from_secs(30)).await.unwrap();
    let targets: HashSet<EntityRef> = claimed.iter().map(|e| e.target).collect();
    assert_eq!(
        targets,
        HashSet::from([EntityRef::reminder(reminder_id), EntityRef::rollover(task_id)])
    );
}

#[tokio::test]
#[serial]
async fn concurrent_claims_skip_locked_rows() {
    let Some(dal) = fresh_dal().await else {
        return;
    };
    const NUM_ROWS: i64 = 30;
    const NUM_WORKERS: usize = 6;
    for id in 0..NUM_ROWS {
        dal.enqueue_outbox(OutboxOp::Upsert, EntityRef::reminder(id))
            .await
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(NUM_WORKERS));
    let mut handles = Vec::new();
    for _ in 0..NUM_WORKERS {
        let dal = dal.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut ids = Vec::new();
            loop {
                let batch = dal.claim_outbox(4, Duration::from_secs(60)).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                ids.extend(batch.into_iter().map(|e| e.id));
            }
            ids
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let unique: HashSet<i64> = all.iter().copied().collect();
    assert_eq!(unique.len(), all.len(), "a row was claimed twice");
    assert_eq!(all.len(), NUM_ROWS as usize);
}

#[tokio::test]
#[serial]
async fn undecodable_inbox_row_is_quarantined_and_the_rest_claimed() {
    let Some(dal) = fresh_dal().await else {
        return;
    };
    let conn = dal.database.get_connection().await.unwrap();
    conn.interact(|conn| {
        diesel::sql_query(
            "INSERT INTO reminder_inbox (kind, payload) VALUES ('fired', '{\"kind\": \"fired\"}')",
        )
        .execute(conn)
    })
    .await
    .unwrap()
    .unwrap();
    let good = dal
        .record_inbox(&InboxPayload::Exhausted { reminder_id: 4 })
        .await
        .unwrap();

    let claimed = dal.claim_inbox(10, Duration::from_secs(30)).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, good);

    let stats = dal.queue_stats(QueueName::Inbox).await.unwrap();
    assert_eq!((stats.pending, stats.quarantined), (1, 1));
}

#[tokio::test]
#[serial]
async fn quarantine_and_requeue_round_trip() {
    let Some(dal) = fresh_dal().await else {
        return;
    };
    let id = dal
        .record_inbox(&InboxPayload::Exhausted { reminder_id: 9 })
        .await
        .unwrap();
    let claimed = dal.claim_inbox(10, Duration::from_secs(30)).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].payload, InboxPayload::Exhausted { reminder_id: 9 });

    dal.quarantine(QueueName::Inbox, id, "gave up").await.unwrap();
    let stats = dal.queue_stats(QueueName::Inbox).await.unwrap();
    assert_eq!((stats.pending, stats.quarantined), (0, 1));

    assert_eq!(dal.requeue_quarantined(QueueName::Inbox, Some(id)).await.unwrap(), 1);
    let claimed = dal.claim_inbox(10, Duration::from_secs(30)).await.unwrap();
    assert_eq!(claimed[0].attempts, 1);
    dal.mark_processed(QueueName::Inbox, id).await.unwrap();
    assert_eq!(dal.queue_stats(QueueName::Inbox).await.unwrap().processed, 1);
}

#[tokio::test]
#[serial]
async fn lapsed_reminders_and_due_date_guard() {
    let Some(dal) = fresh_dal().await else {
        return;
    };
    let mut ended = NewReminder::new(&ReminderKind::Interval {
        every: Some(ChronoDuration::minutes(5)),
    });
    ended.end_at = Some(Utc::now() - ChronoDuration::minutes(1));
    let ended_id = dal.reminders().create(ended).await.unwrap();
    let mut one_off = NewReminder::new(&ReminderKind::OneOff {
        at: Some(Utc::now()),
    });
    one_off.end_at = Some(Utc::now() - ChronoDuration::minutes(1));
    dal.reminders().create(one_off).await.unwrap();

    assert_eq!(dal.lapsed_reminders(Utc::now()).await.unwrap(), vec![ended_id]);
    assert_eq!(dal.disable_reminders(&[ended_id]).await.unwrap(), 1);
    assert_eq!(dal.disable_reminders(&[ended_id]).await.unwrap(), 0);
    assert!(dal.lapsed_reminders(Utc::now()).await.unwrap().is_empty());

    let task_id = dal
        .tasks()
        .create(NewTask {
            title: "file taxes".into(),
            ..NewTask::default()
        })
        .await
        .unwrap();
    let due = Utc::now() + ChronoDuration::days(3);
    assert!(dal.apply_next_due_date(task_id, due).await.unwrap());
    dal.tasks().set_done(task_id, true).await.unwrap();
    assert!(!dal.apply_next_due_date(task_id, due).await.unwrap());
    assert!(!dal.apply_next_due_date(task_id + 1000, due).await.unwrap());
}

#[tokio::test]
#[serial]
async fn outbox_drainer_reconciles_against_postgres() {
    let Some(dal) = fresh_dal().await else {
        return;
    };
    let id = dal
        .reminders()
        .create(NewReminder::new(&ReminderKind::Interval {
            every: Some(ChronoDuration::hours(1)),
        }))
        .await
        .unwrap();

    let scheduler = Arc::new(InMemoryScheduler::new());
    let config = ReconcilerConfig::builder()
        .visibility_retry(2, Duration::from_millis(1))
        .build()
        .unwrap();
    let gateway = SchedulerGateway::new(scheduler.clone(), &config);
    let drainer = OutboxDrainer::new(Arc::new(dal.clone()), gateway, config);

    let report = drainer.drain_once().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(scheduler.contains(&ScheduleHandle::reminder(id)));
    let reminder = dal.fetch_reminder(id).await.unwrap().unwrap();
    assert!(reminder.next_fire_at.is_some());
    // Writing the cache did not enqueue another row.
    assert_eq!(pending(&dal).await, 0);
}
