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

//! The expiry sweep over recurring reminders.

use chrono::{Duration, Utc};

use cadence::models::ReminderKind;
use cadence::scheduler::SchedulerOp;
use cadence::store::StoredReminder;
use cadence::{ScheduleHandle, SchedulerError, SweepReport};

use crate::fixtures::Harness;

fn windowed(id: i64, end_in: Duration) -> StoredReminder {
    let mut reminder = StoredReminder::new(
        id,
        ReminderKind::Interval {
            every: Some(Duration::minutes(10)),
        },
    );
    reminder.end_at = Some(Utc::now() + end_in);
    reminder
}

#[tokio::test]
async fn sweep_disables_every_lapsed_reminder() {
    let h = Harness::new();
    for id in 1..=5 {
        h.store.insert_reminder(windowed(id, Duration::hours(1)));
    }
    // Still inside its window at sweep time.
    h.store.insert_reminder(windowed(6, Duration::hours(5)));
    // Not recurring, so never swept.
    h.store.insert_reminder(StoredReminder::new(
        7,
        ReminderKind::OneOff {
            at: Some(Utc::now() + Duration::minutes(30)),
        },
    ));
    h.outbox.drain_once().await.unwrap();
    assert_eq!(h.scheduler.handles().len(), 7);

    let report = h.sweeper.sweep_once(Utc::now() + Duration::hours(2)).await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            lapsed: 5,
            deleted: 5,
            already_gone: 0,
            failed: 0,
            disabled: 5,
        }
    );
    for id in 1..=5 {
        assert!(!h.store.reminder(id).unwrap().enabled);
        assert!(!h.scheduler.contains(&ScheduleHandle::reminder(id)));
    }
    assert!(h.store.reminder(6).unwrap().enabled);
    assert!(h.store.reminder(7).unwrap().enabled);
    assert!(h.scheduler.contains(&ScheduleHandle::reminder(6)));
}

#[tokio::test]
async fn failed_deletes_are_picked_up_by_the_next_sweep() {
    let h = Harness::new();
    for id in 1..=3 {
        h.store.insert_reminder(windowed(id, Duration::minutes(30)));
    }
    h.outbox.drain_once().await.unwrap();
    h.scheduler.fail_next(
        SchedulerOp::Delete,
        SchedulerError::Transport("connection refused".into()),
    );

    let later = Utc::now() + Duration::hours(1);
    let first = h.sweeper.sweep_once(later).await.unwrap();
    assert_eq!(first.lapsed, 3);
    assert_eq!(first.failed, 1);
    assert_eq!(first.disabled, 2);

    let second = h.sweeper.sweep_once(later).await.unwrap();
    assert_eq!(second.lapsed, 1);
    assert_eq!(second.deleted, 1);
    assert_eq!(second.disabled, 1);
    assert!(h.scheduler.handles().is_empty());

    let third = h.sweeper.sweep_once(later).await.unwrap();
    assert_eq!(third, SweepReport::default());
}

#[tokio::test]
async fn sweep_tolerates_schedules_that_are_already_gone() {
    let h = Harness::new();
    h.store.insert_reminder(windowed(1, Duration::minutes(5)));

    // Never drained, so no schedule exists.
    let report = h
        .sweeper
        .sweep_once(Utc::now() + Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(report.already_gone, 1);
    assert_eq!(report.disabled, 1);
    assert!(!h.store.reminder(1).unwrap().enabled);
}
