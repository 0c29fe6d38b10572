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

//! Desired-state compiler.
//!
//! Pure functions mapping a domain row to what the scheduler should hold for
//! it: nothing ([`Decision::Delete`]) or a concrete schedule
//! ([`Decision::Upsert`]). Malformed rows compile to `Delete` rather than
//! failing, so bad data converges instead of retrying forever.
//!
//! Rules for reminders, first match wins:
//!
//! 1. disabled, or `end_at <= now`, or `end_at < start_at` → delete
//! 2. `one_off` → one calendar instant at `at`, window `[at, at+1s]`
//! 3. `task_due_before` → one calendar instant at `due_date - before`,
//!    only while the task is open and has a due date
//! 4. `interval` → a fixed interval within the optional window
//! 5. `cron` → a cron expression within the optional window
//! 6. anything else → delete
//!
//! Calendar fields are the instant converted into the reminder's timezone.
//! An unknown timezone falls back to UTC and is flagged on the result.

use std::fmt;

use chrono::{DateTime, Duration, DurationRound, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::fire::{FirePayload, REMINDER_WORKFLOW, ROLLOVER_WORKFLOW};
use crate::models::{EntityRef, ReminderDefinition, ReminderKind, RollSpec, RolloverDefinition};
use crate::scheduler::spec::{
    CalendarSpec, IntervalSpec, OverlapPolicy, Schedule, ScheduleAction, ScheduleSpec,
};
use crate::scheduler::ScheduleHandle;

/// Why an entity should have no external schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteReason {
    /// The row no longer exists
    Missing,
    Disabled,
    WindowElapsed,
    /// `end_at` precedes `start_at`
    InvalidWindow,
    MissingField(&'static str),
    /// A field is present but outside its domain (e.g. a zero interval)
    InvalidField(&'static str),
    TaskDone,
    TaskWithoutDueDate,
    UnknownKind(String),
    RolloverOff,
    InvalidRollSpec(String),
    /// Interval rollovers have no well-defined next due date
    UnsupportedRolloverInterval,
}

impl fmt::Display for DeleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteReason::Missing => write!(f, "row missing"),
            DeleteReason::Disabled => write!(f, "disabled"),
            DeleteReason::WindowElapsed => write!(f, "validity window elapsed"),
            DeleteReason::InvalidWindow => write!(f, "end_at precedes start_at"),
            DeleteReason::MissingField(field) => write!(f, "missing {}", field),
            DeleteReason::InvalidField(field) => write!(f, "invalid {}", field),
            DeleteReason::TaskDone => write!(f, "task done"),
            DeleteReason::TaskWithoutDueDate => write!(f, "task has no due date"),
            DeleteReason::UnknownKind(tag) => write!(f, "unknown kind {:?}", tag),
            DeleteReason::RolloverOff => write!(f, "rollover off"),
            DeleteReason::InvalidRollSpec(e) => write!(f, "invalid roll_spec: {}", e),
            DeleteReason::UnsupportedRolloverInterval => {
                write!(f, "interval rollovers are not supported")
            }
        }
    }
}

/// How the gateway should apply a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Fires once, then the unit of work asks for deletion
    SingleShot,
    /// Fires repeatedly; updated in place
    Recurring,
    /// Torn down and recreated on every sync
    Ephemeral,
}

/// A fully specified schedule for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredSchedule {
    pub handle: ScheduleHandle,
    pub schedule: Schedule,
    pub lifecycle: Lifecycle,
    /// The requested timezone was unknown and UTC was used instead
    pub tz_fallback: bool,
}

/// Outcome of compiling one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Delete(DeleteReason),
    Upsert(DesiredSchedule),
}

/// Compiles a reminder row.
pub fn compile_reminder(def: &ReminderDefinition, now: DateTime<Utc>) -> Decision {
    if !def.enabled {
        return Decision::Delete(DeleteReason::Disabled);
    }
    if let Some(end) = def.end_at {
        if end <= now {
            return Decision::Delete(DeleteReason::WindowElapsed);
        }
        if def.start_at.is_some_and(|start| end < start) {
            return Decision::Delete(DeleteReason::InvalidWindow);
        }
    }

    let handle = ScheduleHandle::reminder(def.id);
    match &def.kind {
        ReminderKind::OneOff { at } => match at {
            Some(at) => single_instant(handle, def.id, *at, &def.tz),
            None => Decision::Delete(DeleteReason::MissingField("at")),
        },
        ReminderKind::TaskDueBefore { before } => {
            let Some(task) = &def.task else {
                return Decision::Delete(DeleteReason::MissingField("task"));
            };
            if task.done {
                return Decision::Delete(DeleteReason::TaskDone);
            }
            let Some(due) = task.due_date else {
                return Decision::Delete(DeleteReason::TaskWithoutDueDate);
            };
            let Some(before) = before else {
                return Decision::Delete(DeleteReason::MissingField("before"));
            };
            if *before < Duration::zero() {
                return Decision::Delete(DeleteReason::InvalidField("before"));
            }
            let Some(fire) = due.checked_sub_signed(*before) else {
                return Decision::Delete(DeleteReason::InvalidField("before"));
            };
            single_instant(handle, def.id, fire, &def.tz)
        }
        ReminderKind::Interval { every } => {
            let Some(every) = every else {
                return Decision::Delete(DeleteReason::MissingField("every"));
            };
            let Some(every) = every.to_std().ok().filter(|d| d.as_secs() > 0) else {
                return Decision::Delete(DeleteReason::InvalidField("every"));
            };
            let (zone, tz_fallback) = resolve_zone(&def.tz);
            let mut spec = ScheduleSpec::in_zone(zone.name());
            spec.intervals.push(IntervalSpec::every(every));
            spec.start_at = def.start_at;
            spec.end_at = def.end_at;
            recurring(handle, def.id, spec, tz_fallback)
        }
        ReminderKind::Cron { expr } => {
            let Some(expr) = expr.as_deref().map(str::trim).filter(|e| !e.is_empty()) else {
                return Decision::Delete(DeleteReason::MissingField("cron"));
            };
            let (zone, tz_fallback) = resolve_zone(&def.tz);
            let mut spec = ScheduleSpec::in_zone(zone.name());
            spec.cron_expressions.push(expr.to_string());
            spec.start_at = def.start_at;
            spec.end_at = def.end_at;
            recurring(handle, def.id, spec, tz_fallback)
        }
        ReminderKind::Unknown { tag } => Decision::Delete(DeleteReason::UnknownKind(tag.clone())),
    }
}

/// Compiles a task rollover.
///
/// The schedule starts just after the task's current due date, so its first
/// firing is the next due date. It targets a no-op unit of work; the firing
/// itself is the signal.
pub fn compile_rollover(def: &RolloverDefinition, _now: DateTime<Utc>) -> Decision {
    if !def.roll {
        return Decision::Delete(DeleteReason::RolloverOff);
    }
    if def.task.done {
        return Decision::Delete(DeleteReason::TaskDone);
    }
    let Some(raw) = &def.roll_spec else {
        return Decision::Delete(DeleteReason::MissingField("roll_spec"));
    };
    let roll = match RollSpec::from_json(raw) {
        Ok(roll) => roll,
        Err(e) => return Decision::Delete(DeleteReason::InvalidRollSpec(e.to_string())),
    };

    let (zone, tz_fallback) = resolve_zone(def.roll_tz.as_deref().unwrap_or("UTC"));
    let mut spec = ScheduleSpec::in_zone(zone.name());
    match roll {
        RollSpec::Interval { .. } => {
            return Decision::Delete(DeleteReason::UnsupportedRolloverInterval);
        }
        RollSpec::Cron { expr } => {
            let expr = expr.trim();
            if expr.is_empty() {
                return Decision::Delete(DeleteReason::MissingField("roll_spec.expr"));
            }
            spec.cron_expressions.push(expr.to_string());
        }
        RollSpec::Calendar { calendars } => {
            if calendars.is_empty() {
                return Decision::Delete(DeleteReason::MissingField("roll_spec.calendars"));
            }
            spec.calendars = calendars;
        }
    }
    spec.start_at = def
        .task
        .due_date
        .map(|due| truncate_to_second(due) + Duration::seconds(1));

    let payload = FirePayload {
        entity: EntityRef::rollover(def.task_id()),
        delete_after: false,
    };
    Decision::Upsert(DesiredSchedule {
        handle: ScheduleHandle::rollover(def.task_id()),
        schedule: Schedule {
            spec,
            action: ScheduleAction {
                workflow_type: ROLLOVER_WORKFLOW.to_string(),
                args: vec![payload.to_json()],
            },
            overlap: OverlapPolicy::Skip,
        },
        lifecycle: Lifecycle::Ephemeral,
        tz_fallback,
    })
}

/// Resolves an IANA name, falling back to UTC.
pub fn resolve_zone(name: &str) -> (Tz, bool) {
    match name.parse::<Tz>() {
        Ok(tz) => (tz, false),
        Err(_) => {
            warn!(tz = name, "Unknown timezone, falling back to UTC");
            (Tz::UTC, true)
        }
    }
}

fn truncate_to_second(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::seconds(1)).unwrap_or(t)
}

fn reminder_action(id: i64, delete_after: bool) -> ScheduleAction {
    let payload = FirePayload {
        entity: EntityRef::reminder(id),
        delete_after,
    };
    ScheduleAction {
        workflow_type: REMINDER_WORKFLOW.to_string(),
        args: vec![payload.to_json()],
    }
}

fn single_instant(handle: ScheduleHandle, id: i64, at: DateTime<Utc>, tz: &str) -> Decision {
    let fire = truncate_to_second(at);
    let (zone, tz_fallback) = resolve_zone(tz);
    let mut spec = ScheduleSpec::in_zone(zone.name());
    spec.calendars
        .push(CalendarSpec::at(fire.with_timezone(&zone).naive_local()));
    spec.start_at = Some(fire);
    spec.end_at = Some(fire + Duration::seconds(1));
    Decision::Upsert(DesiredSchedule {
        handle,
        schedule: Schedule {
            spec,
            action: reminder_action(id, true),
            overlap: OverlapPolicy::Skip,
        },
        lifecycle: Lifecycle::SingleShot,
        tz_fallback,
    })
}

fn recurring(handle: ScheduleHandle, id: i64, spec: ScheduleSpec, tz_fallback: bool) -> Decision {
    Decision::Upsert(DesiredSchedule {
        handle,
        schedule: Schedule {
            spec,
            action: reminder_action(id, false),
            overlap: OverlapPolicy::Skip,
        },
        lifecycle: Lifecycle::Recurring,
        tz_fallback,
    })
}
