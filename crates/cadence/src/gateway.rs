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

//! Idempotent adapter over a [`SchedulerClient`].
//!
//! The gateway absorbs the races a reconciler runs into against a scheduler
//! it does not control:
//!
//! - `upsert` creates, and on `AlreadyExists` updates the same handle in place
//! - `delete` treats `NotFound` as success but reports it as
//!   [`DeleteOutcome::AlreadyGone`]
//! - `describe` retries while a just-created schedule is not yet visible,
//!   then gives up with "unknown"; other failures surface immediately
//! - `recreate` tears a schedule down and creates it again, for schedules
//!   whose consumed recurrence state must be reset
//!
//! Every call to the client carries its own timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::ReconcilerConfig;
use crate::error::{GatewayError, SchedulerError};
use crate::scheduler::{Schedule, ScheduleDescription, ScheduleHandle, SchedulerClient};

/// Result of a successful upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Recreated,
}

/// Result of a successful delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyGone,
}

/// Idempotent scheduler operations with per-call timeouts.
#[derive(Clone)]
pub struct SchedulerGateway {
    client: Arc<dyn SchedulerClient>,
    call_timeout: Duration,
    visibility_attempts: u32,
    visibility_step: Duration,
}

impl SchedulerGateway {
    pub fn new(client: Arc<dyn SchedulerClient>, config: &ReconcilerConfig) -> Self {
        Self {
            client,
            call_timeout: config.call_timeout(),
            visibility_attempts: config.visibility_attempts(),
            visibility_step: config.visibility_step(),
        }
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, SchedulerError>
    where
        F: Future<Output = Result<T, SchedulerError>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SchedulerError::Timeout(self.call_timeout)),
        }
    }

    /// Creates the schedule or, if it exists, updates it in place.
    pub async fn upsert(
        &self,
        handle: &ScheduleHandle,
        schedule: &Schedule,
    ) -> Result<UpsertOutcome, GatewayError> {
        let upsert_err = |source| GatewayError::Upsert {
            handle: handle.to_string(),
            source,
        };
        match self.call(self.client.create_schedule(handle, schedule)).await {
            Ok(()) => Ok(UpsertOutcome::Created),
            Err(SchedulerError::AlreadyExists(_)) => {
                debug!(%handle, "Schedule exists, updating in place");
                match self.call(self.client.update_schedule(handle, schedule)).await {
                    Ok(()) => Ok(UpsertOutcome::Updated),
                    // Deleted between our create and update; one more create converges.
                    Err(SchedulerError::NotFound(_)) => self
                        .call(self.client.create_schedule(handle, schedule))
                        .await
                        .map(|_| UpsertOutcome::Created)
                        .map_err(upsert_err),
                    Err(e) => Err(upsert_err(e)),
                }
            }
            Err(e) => Err(upsert_err(e)),
        }
    }

    /// Deletes and recreates the schedule.
    pub async fn recreate(
        &self,
        handle: &ScheduleHandle,
        schedule: &Schedule,
    ) -> Result<UpsertOutcome, GatewayError> {
        self.delete(handle).await?;
        match self.upsert(handle, schedule).await? {
            UpsertOutcome::Created => Ok(UpsertOutcome::Recreated),
            // A concurrent sync recreated it first; it now holds this spec too.
            other => Ok(other),
        }
    }

    /// Deletes the schedule. A missing schedule is not an error.
    pub async fn delete(&self, handle: &ScheduleHandle) -> Result<DeleteOutcome, GatewayError> {
        match self.call(self.client.delete_schedule(handle)).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(SchedulerError::NotFound(_)) => Ok(DeleteOutcome::AlreadyGone),
            Err(source) => Err(GatewayError::Delete {
                handle: handle.to_string(),
                source,
            }),
        }
    }

    /// Describes the schedule, tolerating a lagging control plane.
    ///
    /// Only `NotFound` is retried: attempt `n` that sees it is followed by a
    /// `n * step` pause, and `Ok(None)` ("unknown") is returned once all
    /// attempts are used up. Any other failure is returned at once.
    pub async fn describe(
        &self,
        handle: &ScheduleHandle,
    ) -> Result<Option<ScheduleDescription>, GatewayError> {
        for attempt in 1..=self.visibility_attempts {
            match self.call(self.client.describe_schedule(handle)).await {
                Ok(description) => return Ok(Some(description)),
                Err(SchedulerError::NotFound(_)) => {
                    debug!(%handle, attempt, "Schedule not visible yet");
                    if attempt < self.visibility_attempts {
                        tokio::time::sleep(self.visibility_step * attempt).await;
                    }
                }
                Err(source) => {
                    return Err(GatewayError::Describe {
                        handle: handle.to_string(),
                        source,
                    })
                }
            }
        }
        warn!(
            %handle,
            attempts = self.visibility_attempts,
            "Schedule not describable, next fire time unknown"
        );
        Ok(None)
    }

    /// The schedule's next fire time, or `None` if unknown or there is none.
    pub async fn next_fire_time(
        &self,
        handle: &ScheduleHandle,
    ) -> Result<Option<DateTime<Utc>>, GatewayError> {
        Ok(self
            .describe(handle)
            .await?
            .and_then(|d| d.next_fire_times.first().copied()))
    }
}
