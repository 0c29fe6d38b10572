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

//! An in-process scheduler.
//!
//! [`InMemoryScheduler`] keeps schedules in a map and answers `describe` by
//! evaluating their specs. It also reproduces the behaviours the gateway has
//! to tolerate from a real scheduler: control-plane lag after a create,
//! injected failures, and slow calls.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::client::{ScheduleDescription, SchedulerClient};
use super::handle::ScheduleHandle;
use super::spec::{Schedule, ScheduleAction};
use super::timing::upcoming_fire_times;
use crate::error::SchedulerError;

/// Number of upcoming fire times reported by `describe`.
const DESCRIBE_LIMIT: usize = 10;

/// Scheduler operations, for failure injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerOp {
    Create,
    Update,
    Delete,
    Describe,
}

/// Calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub describe: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    schedule: Schedule,
    paused: bool,
    /// Describes that still answer `NotFound` after creation
    hidden_describes: u32,
}

#[derive(Debug, Default)]
struct State {
    schedules: BTreeMap<ScheduleHandle, Entry>,
    creations: HashMap<ScheduleHandle, u32>,
    failures: HashMap<SchedulerOp, VecDeque<SchedulerError>>,
    visibility_lag: u32,
    latency: Option<Duration>,
    calls: CallCounts,
}

/// A thread-safe in-memory [`SchedulerClient`].
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    state: Mutex<State>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `describes` describe calls after each create answer
    /// `NotFound`, as a lagging control plane would.
    pub fn set_visibility_lag(&self, describes: u32) {
        self.state.lock().visibility_lag = describes;
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Queues an error to be returned by the next call of `op`.
    pub fn fail_next(&self, op: SchedulerOp, error: SchedulerError) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// The stored schedule for `handle`.
    pub fn schedule(&self, handle: &ScheduleHandle) -> Option<Schedule> {
        self.state
            .lock()
            .schedules
            .get(handle)
            .map(|e| e.schedule.clone())
    }

    pub fn contains(&self, handle: &ScheduleHandle) -> bool {
        self.state.lock().schedules.contains_key(handle)
    }

    /// All live handles, sorted.
    pub fn handles(&self) -> Vec<ScheduleHandle> {
        self.state.lock().schedules.keys().cloned().collect()
    }

    /// How many times `handle` has been created.
    pub fn creations(&self, handle: &ScheduleHandle) -> u32 {
        self.state
            .lock()
            .creations
            .get(handle)
            .copied()
            .unwrap_or(0)
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    pub fn set_paused(&self, handle: &ScheduleHandle, paused: bool) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        let entry = state
            .schedules
            .get_mut(handle)
            .ok_or_else(|| SchedulerError::NotFound(handle.to_string()))?;
        entry.paused = paused;
        Ok(())
    }

    /// Simulates a firing: returns the action the scheduler would start.
    pub fn trigger(&self, handle: &ScheduleHandle) -> Result<ScheduleAction, SchedulerError> {
        self.state
            .lock()
            .schedules
            .get(handle)
            .map(|e| e.schedule.action.clone())
            .ok_or_else(|| SchedulerError::NotFound(handle.to_string()))
    }

    /// Upcoming fire times for `handle` after `after`, bypassing lag and failures.
    pub fn fire_times_after(
        &self,
        handle: &ScheduleHandle,
        after: DateTime<Utc>,
    ) -> Option<Vec<DateTime<Utc>>> {
        self.state
            .lock()
            .schedules
            .get(handle)
            .map(|e| upcoming_fire_times(&e.schedule.spec, after, DESCRIBE_LIMIT))
    }

    /// Records the call and returns its latency and any injected failure.
    fn begin(&self, op: SchedulerOp) -> (Option<Duration>, Option<SchedulerError>) {
        let mut state = self.state.lock();
        match op {
            SchedulerOp::Create => state.calls.create += 1,
            SchedulerOp::Update => state.calls.update += 1,
            SchedulerOp::Delete => state.calls.delete += 1,
            SchedulerOp::Describe => state.calls.describe += 1,
        }
        let failure = state.failures.get_mut(&op).and_then(|q| q.pop_front());
        (state.latency, failure)
    }

    async fn enter(&self, op: SchedulerOp) -> Result<(), SchedulerError> {
        let (latency, failure) = self.begin(op);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SchedulerClient for InMemoryScheduler {
    async fn create_schedule(
        &self,
        handle: &ScheduleHandle,
        schedule: &Schedule,
    ) -> Result<(), SchedulerError> {
        self.enter(SchedulerOp::Create).await?;
        let mut state = self.state.lock();
        if state.schedules.contains_key(handle) {
            return Err(SchedulerError::AlreadyExists(handle.to_string()));
        }
        let hidden_describes = state.visibility_lag;
        state.schedules.insert(
            handle.clone(),
            Entry {
                schedule: schedule.clone(),
                paused: false,
                hidden_describes,
            },
        );
        *state.creations.entry(handle.clone()).or_default() += 1;
        Ok(())
    }

    async fn update_schedule(
        &self,
        handle: &ScheduleHandle,
        schedule: &Schedule,
    ) -> Result<(), SchedulerError> {
        self.enter(SchedulerOp::Update).await?;
        let mut state = self.state.lock();
        let entry = state
            .schedules
            .get_mut(handle)
            .ok_or_else(|| SchedulerError::NotFound(handle.to_string()))?;
        entry.schedule = schedule.clone();
        Ok(())
    }

    async fn delete_schedule(&self, handle: &ScheduleHandle) -> Result<(), SchedulerError> {
        self.enter(SchedulerOp::Delete).await?;
        self.state
            .lock()
            .schedules
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::NotFound(handle.to_string()))
    }

    async fn describe_schedule(
        &self,
        handle: &ScheduleHandle,
    ) -> Result<ScheduleDescription, SchedulerError> {
        self.enter(SchedulerOp::Describe).await?;
        let mut state = self.state.lock();
        let entry = state
            .schedules
            .get_mut(handle)
            .ok_or_else(|| SchedulerError::NotFound(handle.to_string()))?;
        if entry.hidden_describes > 0 {
            entry.hidden_describes -= 1;
            return Err(SchedulerError::NotFound(handle.to_string()));
        }
        Ok(ScheduleDescription {
            next_fire_times: upcoming_fire_times(&entry.schedule.spec, Utc::now(), DESCRIBE_LIMIT),
            paused: entry.paused,
        })
    }
}
