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

//! Task rollover definitions.
//!
//! A rollover is a recurring rule that advances a task's due date. It is
//! stored on the task row itself as a `roll` flag, a kind-tagged JSON
//! `roll_spec` and a `roll_tz`:
//!
//! ```json
//! {"kind": "cron", "expr": "0 9 * * MON"}
//! {"kind": "calendar", "calendars": [{"hour": [{"start": 9}], "day_of_week": [{"start": 1, "end": 5}]}]}
//! {"kind": "interval", "every_seconds": 86400}
//! ```

use serde::{Deserialize, Serialize};

use super::task::TaskContext;
use crate::scheduler::spec::CalendarSpec;

/// The recurrence rule of a rollover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RollSpec {
    Cron {
        expr: String,
    },
    Calendar {
        calendars: Vec<CalendarSpec>,
    },
    /// Accepted on read so it can be reported; never scheduled.
    Interval {
        every_seconds: i64,
    },
}

impl RollSpec {
    /// Decodes a stored `roll_spec` payload.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

/// A task's rollover configuration together with the task state it acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloverDefinition {
    /// Owning task; rollovers are keyed by task id
    pub task: TaskContext,
    /// Whether rollover is switched on
    pub roll: bool,
    /// Raw rule payload, decoded during compilation
    pub roll_spec: Option<serde_json::Value>,
    /// Timezone for the rule; UTC when absent
    pub roll_tz: Option<String>,
}

impl RolloverDefinition {
    pub fn task_id(&self) -> i64 {
        self.task.id
    }
}
