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

//! Temporal schedule client over the Temporal HTTP API.
//!
//! Schedules are addressed as `/api/v1/namespaces/{namespace}/schedules/{id}`.
//! Actions start a workflow on the configured task queue with a single
//! `json/plain` payload per argument.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::debug;

use super::client::{ScheduleDescription, SchedulerClient};
use super::handle::ScheduleHandle;
use super::spec::{CalendarSpec, OverlapPolicy, Schedule, ScheduleRange};
use crate::error::{ConfigError, SchedulerError};

/// gRPC status codes Temporal embeds in HTTP error bodies.
const GRPC_NOT_FOUND: i64 = 5;
const GRPC_ALREADY_EXISTS: i64 = 6;

/// Connection settings for [`TemporalHttpClient`].
#[derive(Debug, Clone)]
pub struct TemporalHttpConfig {
    /// Base URL of the Temporal HTTP API (e.g. `http://localhost:7243`)
    pub base_url: String,
    pub namespace: String,
    /// Task queue the started workflows are placed on
    pub task_queue: String,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Per-request timeout enforced by the HTTP client
    pub request_timeout: Duration,
}

impl Default for TemporalHttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7243".to_string(),
            namespace: "reminders".to_string(),
            task_queue: "reminders".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl TemporalHttpConfig {
    /// Reads `TEMPORAL_HTTP_ADDRESS`, `TEMPORAL_NAMESPACE`, `TASK_QUEUE` and
    /// `TEMPORAL_API_KEY`, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("TEMPORAL_HTTP_ADDRESS").unwrap_or(defaults.base_url),
            namespace: std::env::var("TEMPORAL_NAMESPACE").unwrap_or(defaults.namespace),
            task_queue: std::env::var("TASK_QUEUE").unwrap_or(defaults.task_queue),
            api_key: std::env::var("TEMPORAL_API_KEY").ok(),
            request_timeout: defaults.request_timeout,
        }
    }
}

/// A [`SchedulerClient`] backed by Temporal's HTTP API.
pub struct TemporalHttpClient {
    config: TemporalHttpConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for TemporalHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporalHttpClient")
            .field("base_url", &self.config.base_url)
            .field("namespace", &self.config.namespace)
            .field("task_queue", &self.config.task_queue)
            .finish()
    }
}

impl TemporalHttpClient {
    /// Builds the client. The connection is established lazily and reused.
    pub fn new(config: TemporalHttpConfig) -> Result<Self, ConfigError> {
        url::Url::parse(&config.base_url).map_err(|e| ConfigError::Unparsable {
            name: "TEMPORAL_HTTP_ADDRESS",
            value: config.base_url.clone(),
            message: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::Unparsable {
                name: "TEMPORAL_HTTP_ADDRESS",
                value: config.base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { config, client })
    }

    fn schedule_url(&self, handle: &ScheduleHandle) -> String {
        format!(
            "{}/api/v1/namespaces/{}/schedules/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.namespace,
            handle
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Encodes a schedule as the Temporal `Schedule` message.
    pub fn schedule_body(&self, handle: &ScheduleHandle, schedule: &Schedule) -> Value {
        let spec = &schedule.spec;
        let mut spec_json = json!({
            "structuredCalendar": spec.calendars.iter().map(calendar_json).collect::<Vec<_>>(),
            "interval": spec.intervals.iter().map(|i| json!({
                "interval": format!("{}s", i.every.as_secs()),
                "phase": format!("{}s", i.offset.as_secs()),
            })).collect::<Vec<_>>(),
            "cronString": spec.cron_expressions,
            "timezoneName": spec.time_zone_name,
        });
        if let Some(start) = spec.start_at {
            spec_json["startTime"] = Value::String(timestamp(start));
        }
        if let Some(end) = spec.end_at {
            spec_json["endTime"] = Value::String(timestamp(end));
        }

        let payloads: Vec<Value> = schedule
            .action
            .args
            .iter()
            .map(|arg| {
                json!({
                    "metadata": {"encoding": BASE64.encode("json/plain")},
                    "data": BASE64.encode(arg.to_string()),
                })
            })
            .collect();

        let overlap = match schedule.overlap {
            OverlapPolicy::Skip => "SCHEDULE_OVERLAP_POLICY_SKIP",
        };

        json!({
            "spec": spec_json,
            "action": {
                "startWorkflow": {
                    "workflowId": handle.as_str(),
                    "workflowType": {"name": schedule.action.workflow_type},
                    "taskQueue": {"name": self.config.task_queue, "kind": "TASK_QUEUE_KIND_NORMAL"},
                    "input": {"payloads": payloads},
                }
            },
            "policies": {"overlapPolicy": overlap},
            "state": {"paused": false},
        })
    }

    async fn send(
        &self,
        handle: &ScheduleHandle,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, SchedulerError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(classify_error(handle, status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| SchedulerError::InvalidResponse(e.to_string()))
    }

    fn transport_error(&self, err: reqwest::Error) -> SchedulerError {
        if err.is_timeout() {
            SchedulerError::Timeout(self.config.request_timeout)
        } else {
            SchedulerError::Transport(err.to_string())
        }
    }
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn ranges_json(ranges: &[ScheduleRange]) -> Vec<Value> {
    ranges
        .iter()
        .map(|r| json!({"start": r.start, "end": r.end, "step": r.step}))
        .collect()
}

fn calendar_json(calendar: &CalendarSpec) -> Value {
    let mut value = json!({
        "second": ranges_json(&calendar.second),
        "minute": ranges_json(&calendar.minute),
        "hour": ranges_json(&calendar.hour),
        "dayOfMonth": ranges_json(&calendar.day_of_month),
        "month": ranges_json(&calendar.month),
        "dayOfWeek": ranges_json(&calendar.day_of_week),
        "year": ranges_json(&calendar.year),
    });
    if let Some(comment) = &calendar.comment {
        value["comment"] = Value::String(comment.clone());
    }
    value
}

/// Maps an HTTP error response onto the scheduler error taxonomy.
fn classify_error(handle: &ScheduleHandle, status: u16, body: &str) -> SchedulerError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_i64);
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| body.to_string());

    match (status, code) {
        (409, _) | (_, Some(GRPC_ALREADY_EXISTS)) => SchedulerError::AlreadyExists(handle.to_string()),
        (404, _) | (_, Some(GRPC_NOT_FOUND)) => SchedulerError::NotFound(handle.to_string()),
        (408, _) | (429, _) | (500..=599, _) => {
            SchedulerError::Transport(format!("HTTP {}: {}", status, message))
        }
        _ => SchedulerError::Rejected { status, message },
    }
}

fn parse_description(value: &Value) -> Result<ScheduleDescription, SchedulerError> {
    let next_fire_times = value
        .pointer("/info/futureActionTimes")
        .and_then(Value::as_array)
        .map(|times| {
            times
                .iter()
                .filter_map(Value::as_str)
                .map(|s| {
                    DateTime::parse_from_rfc3339(s)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|e| SchedulerError::InvalidResponse(format!("{}: {}", s, e)))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();
    let paused = value
        .pointer("/schedule/state/paused")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(ScheduleDescription {
        next_fire_times,
        paused,
    })
}

#[async_trait]
impl SchedulerClient for TemporalHttpClient {
    async fn create_schedule(
        &self,
        handle: &ScheduleHandle,
        schedule: &Schedule,
    ) -> Result<(), SchedulerError> {
        let url = self.schedule_url(handle);
        debug!(%handle, "Creating schedule");
        let body = json!({"schedule": self.schedule_body(handle, schedule)});
        self.send(handle, self.request(reqwest::Method::POST, &url).json(&body))
            .await
            .map(|_| ())
    }

    async fn update_schedule(
        &self,
        handle: &ScheduleHandle,
        schedule: &Schedule,
    ) -> Result<(), SchedulerError> {
        let url = format!("{}/update", self.schedule_url(handle));
        debug!(%handle, "Updating schedule");
        let body = json!({"schedule": self.schedule_body(handle, schedule)});
        self.send(handle, self.request(reqwest::Method::POST, &url).json(&body))
            .await
            .map(|_| ())
    }

    async fn delete_schedule(&self, handle: &ScheduleHandle) -> Result<(), SchedulerError> {
        let url = self.schedule_url(handle);
        debug!(%handle, "Deleting schedule");
        self.send(handle, self.request(reqwest::Method::DELETE, &url))
            .await
            .map(|_| ())
    }

    async fn describe_schedule(
        &self,
        handle: &ScheduleHandle,
    ) -> Result<ScheduleDescription, SchedulerError> {
        let url = self.schedule_url(handle);
        let value = self
            .send(handle, self.request(reqwest::Method::GET, &url))
            .await?;
        parse_description(&value)
    }
}
