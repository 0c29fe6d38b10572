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

//! Shared wiring for the in-process tests.

use std::sync::Arc;
use std::time::Duration;

use cadence::scheduler::ScheduleHandle;
use cadence::{
    FireHandler, FirePayload, InMemoryScheduler, InboxDrainer, MemoryStore, OutboxDrainer,
    ReconcilerConfig, SchedulerGateway, Sweeper,
};
use chrono::{DateTime, Utc};

/// One reconciler deployment over an in-memory store and scheduler.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub scheduler: Arc<InMemoryScheduler>,
    pub outbox: OutboxDrainer,
    pub inbox: InboxDrainer,
    pub sweeper: Sweeper,
    pub fire: FireHandler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(
            ReconcilerConfig::builder()
                .visibility_retry(2, Duration::from_millis(1))
                .build()
                .expect("valid config"),
        )
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(InMemoryScheduler::new());
        let gateway = SchedulerGateway::new(scheduler.clone(), &config);
        Self {
            outbox: OutboxDrainer::new(store.clone(), gateway.clone(), config.clone()),
            inbox: InboxDrainer::new(store.clone(), gateway.clone(), config.clone()),
            sweeper: Sweeper::new(store.clone(), gateway, &config),
            fire: FireHandler::new(store.clone()),
            store,
            scheduler,
        }
    }

    /// Plays the scheduler's part of a firing: starts the schedule's unit of
    /// work, which records the firing into the inbox.
    pub async fn fire(&self, handle: &ScheduleHandle, fired_at: DateTime<Utc>) {
        let action = self
            .scheduler
            .trigger(handle)
            .expect("schedule should exist to fire");
        let payload = FirePayload::from_args(&action.args).expect("payload decodes");
        self.fire
            .on_fire(payload, fired_at)
            .await
            .expect("firing recorded");
    }
}
