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

//! Queue mechanics: exclusive claims, retry, quarantine and requeue.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Barrier;

use cadence::models::ReminderKind;
use cadence::scheduler::SchedulerOp;
use cadence::store::StoredReminder;
use cadence::{
    EntityRef, MemoryStore, OutboxOp, QueueName, ReconcileStore, ReconcilerConfig,
    ScheduleHandle, SchedulerError,
};

use crate::fixtures::Harness;

/// Concurrent claimers never receive the same row.
#[tokio::test]
async fn concurrent_claims_are_exclusive() {
    const NUM_ROWS: i64 = 40;
    const NUM_WORKERS: usize = 8;

    let store = Arc::new(MemoryStore::new());
    for id in 0..NUM_ROWS {
        store
            .enqueue_outbox(OutboxOp::Upsert, EntityRef::reminder(id))
            .await
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(NUM_WORKERS));
    let mut handles = Vec::new();
    for _ in 0..NUM_WORKERS {
        let store = store.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut claimed = Vec::new();
            loop {
                let batch = store
                    .claim_outbox(3, Duration::from_secs(30))
                    .await
                    .unwrap();
                if batch.is_empty() {
                    break;
                }
                claimed.extend(batch.into_iter().map(|e| e.id));
                tokio::task::yield_now().await;
            }
            claimed
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
async fn claims_respect_the_lease() {
    let store = MemoryStore::new();
    store
        .enqueue_outbox(OutboxOp::Upsert, EntityRef::reminder(1))
        .await
        .unwrap();

    let first = store.claim_outbox(10, Duration::from_secs(60)).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].attempts, 1);
    assert!(store
        .claim_outbox(10, Duration::from_secs(60))
        .await
        .unwrap()
        .is_empty());

    // A crashed worker's lease expires and the row is claimed again.
    store.expire_leases(QueueName::Outbox);
    let again = store.claim_outbox(10, Duration::from_secs(60)).await.unwrap();
    assert_eq!(again[0].attempts, 2);
}

#[tokio::test]
async fn persistent_failure_quarantines_until_requeued() {
    let h = Harness::with_config(
        ReconcilerConfig::builder()
            .max_attempts(2)
            .visibility_retry(1, Duration::from_millis(1))
            .build()
            .unwrap(),
    );
    h.store.insert_reminder(StoredReminder::new(
        1,
        ReminderKind::OneOff {
            at: Some(Utc::now() + chrono::Duration::hours(3)),
        },
    ));
    for _ in 0..2 {
        h.scheduler.fail_next(
            SchedulerOp::Create,
            SchedulerError::Transport("scheduler unavailable".into()),
        );
    }

    let report = h.outbox.drain_once().await.unwrap();
    assert_eq!(report.retrying, 1);
    h.store.expire_leases(QueueName::Outbox);
    let report = h.outbox.drain_once().await.unwrap();
    assert_eq!(report.quarantined, 1);

    let stats = h.store.queue_stats(QueueName::Outbox).await.unwrap();
    assert_eq!((stats.pending, stats.quarantined, stats.processed), (0, 1, 0));
    let row = &h.store.queue_rows(QueueName::Outbox)[0];
    assert!(row
        .last_error
        .as_deref()
        .unwrap()
        .contains("scheduler unavailable"));

    // Quarantined rows are invisible to claims.
    h.store.expire_leases(QueueName::Outbox);
    assert_eq!(h.outbox.drain_once().await.unwrap().claimed, 0);

    let requeued = h
        .store
        .requeue_quarantined(QueueName::Outbox, None)
        .await
        .unwrap();
    assert_eq!(requeued, 1);
    let report = h.outbox.drain_once().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(h.scheduler.contains(&ScheduleHandle::reminder(1)));
    let row = &h.store.queue_rows(QueueName::Outbox)[0];
    assert_eq!(row.attempts, 1);
    assert!(row.processed_at.is_some());
}

#[tokio::test]
async fn requeue_by_id_leaves_other_rows_quarantined() {
    let store = MemoryStore::new();
    let a = store
        .enqueue_outbox(OutboxOp::Upsert, EntityRef::reminder(1))
        .await
        .unwrap();
    let b = store
        .enqueue_outbox(OutboxOp::Upsert, EntityRef::reminder(2))
        .await
        .unwrap();
    store.quarantine(QueueName::Outbox, a, "boom").await.unwrap();
    store.quarantine(QueueName::Outbox, b, "boom").await.unwrap();

    let requeued = store
        .requeue_quarantined(QueueName::Outbox, Some(b))
        .await
        .unwrap();
    assert_eq!(requeued, 1);
    let stats = store.queue_stats(QueueName::Outbox).await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.quarantined, 1);
}

#[tokio::test]
async fn permanent_rejection_is_retried_like_any_failure() {
    let h = Harness::new();
    h.store.insert_reminder(StoredReminder::new(
        2,
        ReminderKind::Cron {
            expr: Some("0 12 * * *".into()),
        },
    ));
    h.scheduler.fail_next(
        SchedulerOp::Create,
        SchedulerError::Rejected {
            status: 400,
            message: "bad spec".into(),
        },
    );

    let report = h.outbox.drain_once().await.unwrap();
    assert_eq!(report.retrying, 1);
    h.store.expire_leases(QueueName::Outbox);
    let report = h.outbox.drain_once().await.unwrap();
    assert_eq!(report.processed, 1);
}
