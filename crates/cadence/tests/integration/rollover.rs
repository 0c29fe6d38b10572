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

//! The rollover loop: a firing moves the due date, which re-arms the schedule.

use chrono::{Duration, TimeZone, Utc};

use cadence::models::ReminderKind;
use cadence::store::{StoredReminder, StoredTask};
use cadence::{EntityRef, InboxPayload, OutboxOp, ReconcileStore, ScheduleHandle};

use crate::fixtures::Harness;

fn rolling_task(id: i64, due: chrono::DateTime<Utc>) -> StoredTask {
    let mut task = StoredTask::new(id, Some(due));
    task.roll = true;
    task.roll_spec = Some(serde_json::json!({"kind": "cron", "expr": "0 9 * * *"}));
    task
}

#[tokio::test]
async fn firing_advances_the_due_date_and_rearms_the_schedule() {
    let h = Harness::new();
    let due = Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap();
    h.store.insert_task(rolling_task(1, due));

    h.outbox.drain_once().await.unwrap();
    let handle = ScheduleHandle::rollover(1);
    let schedule = h.scheduler.schedule(&handle).unwrap();
    assert_eq!(schedule.spec.start_at, Some(due + Duration::seconds(1)));

    let next_due = Utc.with_ymd_and_hms(2030, 1, 2, 9, 0, 0).unwrap();
    h.fire(&handle, next_due).await;
    let report = h.inbox.drain_once().await.unwrap();
    assert_eq!(report.processed, 1);

    assert_eq!(h.store.task(1).unwrap().due_date, Some(next_due));
    assert_eq!(
        h.store.pending_outbox(),
        vec![(OutboxOp::Upsert, EntityRef::rollover(1))]
    );

    h.outbox.drain_once().await.unwrap();
    assert_eq!(h.scheduler.creations(&handle), 2);
    assert_eq!(h.scheduler.calls().update, 0);
    let schedule = h.scheduler.schedule(&handle).unwrap();
    assert_eq!(schedule.spec.start_at, Some(next_due + Duration::seconds(1)));
}

#[tokio::test]
async fn due_before_reminder_is_rearmed_after_rollover() {
    let h = Harness::new();
    let due = Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap();
    h.store.insert_task(rolling_task(5, due));
    let mut reminder = StoredReminder::new(
        50,
        ReminderKind::TaskDueBefore {
            before: Some(Duration::hours(1)),
        },
    );
    reminder.task_id = Some(5);
    h.store.insert_reminder(reminder);
    h.outbox.drain_once().await.unwrap();

    let reminder_handle = ScheduleHandle::reminder(50);
    let schedule = h.scheduler.schedule(&reminder_handle).unwrap();
    assert_eq!(schedule.spec.start_at, Some(due - Duration::hours(1)));

    h.fire(&reminder_handle, due - Duration::hours(1)).await;
    h.inbox.drain_once().await.unwrap();
    assert!(h.store.reminder(50).unwrap().enabled);
    assert!(!h.scheduler.contains(&reminder_handle));

    let next_due = Utc.with_ymd_and_hms(2030, 1, 2, 9, 0, 0).unwrap();
    h.fire(&ScheduleHandle::rollover(5), next_due).await;
    h.inbox.drain_once().await.unwrap();
    h.outbox.drain_once().await.unwrap();

    let row = h.store.reminder(50).unwrap();
    assert!(row.enabled);
    assert_eq!(row.last_fired_at, Some(due - Duration::hours(1)));
    let schedule = h.scheduler.schedule(&reminder_handle).unwrap();
    assert_eq!(schedule.spec.start_at, Some(next_due - Duration::hours(1)));
}

#[tokio::test]
async fn completed_task_ignores_late_firings_and_drops_its_schedule() {
    let h = Harness::new();
    let due = Utc.with_ymd_and_hms(2030, 6, 1, 9, 0, 0).unwrap();
    h.store.insert_task(rolling_task(2, due));
    h.outbox.drain_once().await.unwrap();
    let handle = ScheduleHandle::rollover(2);
    assert!(h.scheduler.contains(&handle));

    h.store.update_task(2, |t| t.done = true);
    h.outbox.drain_once().await.unwrap();
    assert!(!h.scheduler.contains(&handle));

    // A firing that raced the completion must not move the due date.
    h.store
        .record_inbox(&InboxPayload::NextDueComputed {
            task_id: 2,
            due: due + Duration::days(1),
        })
        .await
        .unwrap();
    let report = h.inbox.drain_once().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(h.store.task(2).unwrap().due_date, Some(due));
    assert!(h.store.pending_outbox().is_empty());
}

#[tokio::test]
async fn switching_rollover_off_deletes_the_schedule() {
    let h = Harness::new();
    h.store
        .insert_task(rolling_task(3, Utc::now() + Duration::days(2)));
    h.outbox.drain_once().await.unwrap();

    h.store.update_task(3, |t| t.roll = false);
    assert_eq!(
        h.store.pending_outbox(),
        vec![(OutboxOp::Upsert, EntityRef::rollover(3))]
    );
    h.outbox.drain_once().await.unwrap();
    assert!(!h.scheduler.contains(&ScheduleHandle::rollover(3)));
}

#[tokio::test]
async fn deleting_a_rolling_task_deletes_its_schedule() {
    let h = Harness::new();
    h.store
        .insert_task(rolling_task(4, Utc::now() + Duration::days(2)));
    h.outbox.drain_once().await.unwrap();

    h.store.delete_task(4);
    h.outbox.drain_once().await.unwrap();
    assert!(!h.scheduler.contains(&ScheduleHandle::rollover(4)));
}
