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

//! End-to-end reminder lifecycles: outbox, scheduler, firing, inbox.

use chrono::{Duration, Utc};

use cadence::models::ReminderKind;
use cadence::store::{StoredReminder, StoredTask};
use cadence::{
    DeleteOutcome, DeleteReason, EntityRef, InboxPayload, OutboxOp, ReconcileStore,
    ScheduleHandle, SyncOutcome,
};

use crate::fixtures::Harness;

#[tokio::test]
async fn one_off_reminder_fires_once_and_is_retired() {
    let h = Harness::new();
    let at = Utc::now() + Duration::hours(1);
    h.store
        .insert_reminder(StoredReminder::new(1, ReminderKind::OneOff { at: Some(at) }));

    let report = h.outbox.drain_once().await.unwrap();
    assert_eq!(report.processed, 1);
    let handle = ScheduleHandle::reminder(1);
    assert!(h.scheduler.contains(&handle));

    h.fire(&handle, at).await;
    let report = h.inbox.drain_once().await.unwrap();
    assert_eq!(report.processed, 1);

    assert!(!h.scheduler.contains(&handle));
    let row = h.store.reminder(1).unwrap();
    assert!(!row.enabled);
    assert_eq!(row.last_fired_at, Some(at));
    assert_eq!(row.next_fire_at, None);

    // Disabling enqueued a follow-up; it finds the schedule already gone.
    assert_eq!(
        h.store.pending_outbox(),
        vec![(OutboxOp::Upsert, EntityRef::reminder(1))]
    );
    let report = h.outbox.drain_once().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(h.store.pending_outbox().is_empty());
    assert!(h
        .store
        .claim_outbox(10, std::time::Duration::from_secs(30))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.scheduler.creations(&handle), 1);
}

#[tokio::test]
async fn interval_reminder_caches_a_near_next_fire_time() {
    let h = Harness::new();
    let now = Utc::now();
    let mut reminder = StoredReminder::new(
        2,
        ReminderKind::Interval {
            every: Some(Duration::hours(1)),
        },
    );
    reminder.start_at = Some(now);
    h.store.insert_reminder(reminder);

    h.outbox.drain_once().await.unwrap();

    let next = h.store.reminder(2).unwrap().next_fire_at.unwrap();
    assert!(next <= now + Duration::hours(1));
    assert!(next >= now - Duration::seconds(1));
}

#[tokio::test]
async fn recurring_firing_refreshes_the_cache_without_new_outbox_rows() {
    let h = Harness::new();
    h.store.insert_reminder(StoredReminder::new(
        3,
        ReminderKind::Cron {
            expr: Some("*/5 * * * *".into()),
        },
    ));
    h.outbox.drain_once().await.unwrap();
    assert!(h.store.pending_outbox().is_empty());

    let fired_at = Utc::now();
    h.fire(&ScheduleHandle::reminder(3), fired_at).await;
    h.inbox.drain_once().await.unwrap();

    let row = h.store.reminder(3).unwrap();
    assert!(row.enabled);
    assert_eq!(row.last_fired_at, Some(fired_at));
    let next = row.next_fire_at.unwrap();
    assert!(next > fired_at - Duration::seconds(1));
    assert!(next <= fired_at + Duration::minutes(6));
    assert!(h.store.pending_outbox().is_empty());
    assert!(h.scheduler.contains(&ScheduleHandle::reminder(3)));
}

#[tokio::test]
async fn completing_a_task_removes_its_due_before_reminder() {
    let h = Harness::new();
    h.store
        .insert_task(StoredTask::new(10, Some(Utc::now() + Duration::days(1))));
    let mut reminder = StoredReminder::new(
        4,
        ReminderKind::TaskDueBefore {
            before: Some(Duration::hours(1)),
        },
    );
    reminder.task_id = Some(10);
    h.store.insert_reminder(reminder);
    h.outbox.drain_once().await.unwrap();
    let handle = ScheduleHandle::reminder(4);
    assert!(h.scheduler.contains(&handle));

    h.store.update_task(10, |t| t.done = true);
    assert_eq!(
        h.store.pending_outbox(),
        vec![(OutboxOp::Upsert, EntityRef::reminder(4))]
    );
    let report = h.outbox.drain_once().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(!h.scheduler.contains(&handle));

    // A second pass deletes against a missing handle without error.
    let outcome = h.outbox.sync(EntityRef::reminder(4)).await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Deleted {
            reason: DeleteReason::TaskDone,
            outcome: DeleteOutcome::AlreadyGone,
        }
    );
}

#[tokio::test]
async fn duplicated_events_converge_on_one_schedule() {
    let h = Harness::new();
    h.store.insert_reminder(StoredReminder::new(
        5,
        ReminderKind::Cron {
            expr: Some("0 9 * * 1-5".into()),
        },
    ));
    for _ in 0..4 {
        h.store
            .enqueue_outbox(OutboxOp::Upsert, EntityRef::reminder(5))
            .await
            .unwrap();
    }

    let report = h.outbox.drain_once().await.unwrap();
    assert_eq!(report.claimed, 5);
    assert_eq!(report.processed, 5);
    let handle = ScheduleHandle::reminder(5);
    assert_eq!(h.scheduler.handles(), vec![handle.clone()]);
    assert_eq!(h.scheduler.creations(&handle), 1);
    assert_eq!(
        h.scheduler.schedule(&handle).unwrap().spec.cron_expressions,
        vec!["0 9 * * 1-5".to_string()]
    );
}

#[tokio::test]
async fn stale_delete_event_defers_to_the_current_row() {
    let h = Harness::new();
    h.store.insert_reminder(StoredReminder::new(
        6,
        ReminderKind::Interval {
            every: Some(Duration::minutes(30)),
        },
    ));
    // A delete recorded while the row still exists is reconciled as an upsert.
    h.store
        .enqueue_outbox(OutboxOp::Delete, EntityRef::reminder(6))
        .await
        .unwrap();

    h.outbox.drain_once().await.unwrap();
    assert!(h.scheduler.contains(&ScheduleHandle::reminder(6)));
}

#[tokio::test]
async fn firing_for_a_deleted_reminder_removes_the_orphan_schedule() {
    let h = Harness::new();
    h.store.insert_reminder(StoredReminder::new(
        7,
        ReminderKind::Cron {
            expr: Some("0 * * * *".into()),
        },
    ));
    h.outbox.drain_once().await.unwrap();
    let handle = ScheduleHandle::reminder(7);

    h.store.delete_reminder(7);
    h.fire(&handle, Utc::now()).await;
    let report = h.inbox.drain_once().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(!h.scheduler.contains(&handle));

    // The delete event that followed the row removal is now a no-op.
    let report = h.outbox.drain_once().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(!h.scheduler.contains(&handle));
}

#[tokio::test]
async fn exhausted_notice_retires_the_reminder() {
    let h = Harness::new();
    h.store.insert_reminder(StoredReminder::new(
        8,
        ReminderKind::Cron {
            expr: Some("0 0 1 1 *".into()),
        },
    ));
    h.outbox.drain_once().await.unwrap();

    h.store
        .record_inbox(&InboxPayload::Exhausted { reminder_id: 8 })
        .await
        .unwrap();
    h.inbox.drain_once().await.unwrap();

    assert!(!h.scheduler.contains(&ScheduleHandle::reminder(8)));
    assert!(!h.store.reminder(8).unwrap().enabled);
}
