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

//! The external scheduler capability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::handle::ScheduleHandle;
use super::spec::Schedule;
use crate::error::SchedulerError;

/// What the scheduler reports about an existing schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleDescription {
    /// Upcoming fire times, earliest first
    pub next_fire_times: Vec<DateTime<Utc>>,
    pub paused: bool,
}

impl ScheduleDescription {
    /// A schedule that is not paused and will never fire again.
    pub fn is_exhausted(&self) -> bool {
        self.next_fire_times.is_empty() && !self.paused
    }
}

/// Raw operations against an external scheduling service.
///
/// Implementations report races verbatim (`AlreadyExists`, `NotFound`);
/// absorbing them is the job of [`SchedulerGateway`](crate::gateway::SchedulerGateway).
/// A client is constructed once, shared behind an `Arc`, and reused by
/// every component for the life of the process.
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Creates a schedule. Fails with `AlreadyExists` if the handle is taken.
    async fn create_schedule(
        &self,
        handle: &ScheduleHandle,
        schedule: &Schedule,
    ) -> Result<(), SchedulerError>;

    /// Replaces an existing schedule's spec and action in place.
    async fn update_schedule(
        &self,
        handle: &ScheduleHandle,
        schedule: &Schedule,
    ) -> Result<(), SchedulerError>;

    /// Deletes a schedule. Fails with `NotFound` if there is none.
    async fn delete_schedule(&self, handle: &ScheduleHandle) -> Result<(), SchedulerError>;

    /// Describes a schedule's upcoming fire times.
    async fn describe_schedule(
        &self,
        handle: &ScheduleHandle,
    ) -> Result<ScheduleDescription, SchedulerError>;
}
