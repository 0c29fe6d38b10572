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

//! Scheduler-native schedule shapes.
//!
//! A schedule is a [`ScheduleSpec`] (when to fire), a [`ScheduleAction`]
//! (which unit of work to start) and an [`OverlapPolicy`]. The spec is a
//! union of calendar rules, fixed intervals and cron expressions, bounded by
//! an optional `[start_at, end_at]` window and interpreted in a named
//! timezone.

use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// An inclusive `start..=end` range of calendar field values, stepping by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRange")]
pub struct ScheduleRange {
    pub start: i32,
    pub end: i32,
    pub step: i32,
}

#[derive(Deserialize)]
struct RawRange {
    start: i32,
    end: Option<i32>,
    step: Option<i32>,
}

impl From<RawRange> for ScheduleRange {
    fn from(raw: RawRange) -> Self {
        ScheduleRange::new(raw.start, raw.end.unwrap_or(raw.start), raw.step.unwrap_or(1))
    }
}

impl ScheduleRange {
    /// A range; `end` below `start` collapses to `start`, `step` is at least 1.
    pub fn new(start: i32, end: i32, step: i32) -> Self {
        Self {
            start,
            end: end.max(start),
            step: step.max(1),
        }
    }

    pub fn single(value: i32) -> Self {
        Self::new(value, value, 1)
    }

    pub fn contains(&self, value: i32) -> bool {
        value >= self.start
            && value <= self.end
            && (i64::from(value) - i64::from(self.start)) % i64::from(self.step) == 0
    }
}

/// One calendar rule: a set of range lists per field.
///
/// An empty list means "any value" for day of month, month, day of week and
/// year, and "zero" for second, minute and hour. Day of week counts from
/// Sunday = 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSpec {
    #[serde(default)]
    pub second: Vec<ScheduleRange>,
    #[serde(default)]
    pub minute: Vec<ScheduleRange>,
    #[serde(default)]
    pub hour: Vec<ScheduleRange>,
    #[serde(default)]
    pub day_of_month: Vec<ScheduleRange>,
    #[serde(default)]
    pub month: Vec<ScheduleRange>,
    #[serde(default)]
    pub day_of_week: Vec<ScheduleRange>,
    #[serde(default)]
    pub year: Vec<ScheduleRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl CalendarSpec {
    /// A rule matching exactly one wall-clock instant.
    pub fn at(local: NaiveDateTime) -> Self {
        Self {
            second: vec![ScheduleRange::single(local.second() as i32)],
            minute: vec![ScheduleRange::single(local.minute() as i32)],
            hour: vec![ScheduleRange::single(local.hour() as i32)],
            day_of_month: vec![ScheduleRange::single(local.day() as i32)],
            month: vec![ScheduleRange::single(local.month() as i32)],
            day_of_week: Vec::new(),
            year: vec![ScheduleRange::single(local.year())],
            comment: None,
        }
    }
}

/// A fixed interval, anchored at the unix epoch plus `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSpec {
    pub every: Duration,
    pub offset: Duration,
}

impl IntervalSpec {
    pub fn every(every: Duration) -> Self {
        Self {
            every,
            offset: Duration::ZERO,
        }
    }
}

/// When a schedule fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSpec {
    pub calendars: Vec<CalendarSpec>,
    pub intervals: Vec<IntervalSpec>,
    pub cron_expressions: Vec<String>,
    pub time_zone_name: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

impl ScheduleSpec {
    /// An empty spec in `time_zone_name`; callers add rules.
    pub fn in_zone(time_zone_name: impl Into<String>) -> Self {
        Self {
            calendars: Vec::new(),
            intervals: Vec::new(),
            cron_expressions: Vec::new(),
            time_zone_name: time_zone_name.into(),
            start_at: None,
            end_at: None,
        }
    }
}

/// What happens when a firing is due while the previous run is still going.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Drop the new firing.
    #[default]
    Skip,
}

/// The unit of work a schedule starts on each firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleAction {
    /// Unit-of-work type name understood by the worker side
    pub workflow_type: String,
    /// JSON arguments passed to the unit of work
    pub args: Vec<serde_json::Value>,
}

/// A complete schedule definition as submitted to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub spec: ScheduleSpec,
    pub action: ScheduleAction,
    pub overlap: OverlapPolicy,
}
