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

//! Reminder definitions.
//!
//! A reminder's behaviour is selected by its kind. Storage keeps the kind as a
//! text tag next to nullable kind-specific columns; [`ReminderKind`] folds the
//! tag and its columns into one closed type so the compiler can match
//! exhaustively. A row whose tag is not recognised becomes
//! [`ReminderKind::Unknown`] instead of a decode failure.

use chrono::{DateTime, Duration, Utc};

use super::task::TaskContext;

/// Kind-specific reminder configuration.
///
/// Fields are optional because storage does not guarantee that the column a
/// kind needs is populated. Missing data is a compile-time `Delete`, not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderKind {
    /// Fires once at `at`.
    OneOff { at: Option<DateTime<Utc>> },
    /// Fires once, `before` ahead of the owning task's due date.
    TaskDueBefore { before: Option<Duration> },
    /// Fires every `every`.
    Interval { every: Option<Duration> },
    /// Fires on a cron expression.
    Cron { expr: Option<String> },
    /// A tag this version does not know.
    Unknown { tag: String },
}

impl ReminderKind {
    /// Builds a kind from its storage tag and kind-specific columns.
    ///
    /// Only the column belonging to `tag` is consulted.
    pub fn from_columns(
        tag: &str,
        at: Option<DateTime<Utc>>,
        before_seconds: Option<i64>,
        every_seconds: Option<i64>,
        cron: Option<String>,
    ) -> Self {
        match tag {
            "one_off" => ReminderKind::OneOff { at },
            "task_due_before" => ReminderKind::TaskDueBefore {
                before: before_seconds.map(saturating_seconds),
            },
            "interval" => ReminderKind::Interval {
                every: every_seconds.map(saturating_seconds),
            },
            "cron" => ReminderKind::Cron { expr: cron },
            other => ReminderKind::Unknown {
                tag: other.to_string(),
            },
        }
    }

    /// The storage tag for this kind.
    pub fn tag(&self) -> &str {
        match self {
            ReminderKind::OneOff { .. } => "one_off",
            ReminderKind::TaskDueBefore { .. } => "task_due_before",
            ReminderKind::Interval { .. } => "interval",
            ReminderKind::Cron { .. } => "cron",
            ReminderKind::Unknown { tag } => tag,
        }
    }

    /// Whether this kind produces more than one firing.
    pub fn is_recurring(&self) -> bool {
        matches!(
            self,
            ReminderKind::Interval { .. } | ReminderKind::Cron { .. }
        )
    }
}

/// Seconds beyond what a `Duration` holds clamp to its bounds.
fn saturating_seconds(secs: i64) -> Duration {
    Duration::try_seconds(secs).unwrap_or(if secs < 0 {
        Duration::MIN
    } else {
        Duration::MAX
    })
}

/// A reminder row plus the join context the compiler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderDefinition {
    /// Primary key; also the basis of the external schedule handle
    pub id: i64,
    /// Kind and kind-specific fields
    pub kind: ReminderKind,
    /// Disabled reminders have no external schedule
    pub enabled: bool,
    /// Optional start of the validity window
    pub start_at: Option<DateTime<Utc>>,
    /// Optional end of the validity window
    pub end_at: Option<DateTime<Utc>>,
    /// IANA timezone name used for calendar fields
    pub tz: String,
    /// Owning task, when the reminder is attached to one
    pub task: Option<TaskContext>,
    /// Cached next fire time reported by the scheduler
    pub next_fire_at: Option<DateTime<Utc>>,
}

impl ReminderDefinition {
    /// Creates an enabled reminder with no window in UTC.
    pub fn new(id: i64, kind: ReminderKind) -> Self {
        Self {
            id,
            kind,
            enabled: true,
            start_at: None,
            end_at: None,
            tz: "UTC".to_string(),
            task: None,
            next_fire_at: None,
        }
    }
}
