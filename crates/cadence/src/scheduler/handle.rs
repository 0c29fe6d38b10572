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

//! Deterministic external schedule identities.
//!
//! Handles are never stored. They are recomputed from the entity reference,
//! so the same entity always maps to the same external schedule.

use std::fmt;

use crate::models::{EntityKind, EntityRef};

const REMINDER_PREFIX: &str = "reminder-";
const ROLLOVER_PREFIX: &str = "rollover-";

/// The scheduler-side identity of an entity's schedule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleHandle(String);

impl ScheduleHandle {
    pub fn for_entity(entity: EntityRef) -> Self {
        match entity.kind {
            EntityKind::Reminder => Self::reminder(entity.id),
            EntityKind::Rollover => Self::rollover(entity.id),
        }
    }

    pub fn reminder(id: i64) -> Self {
        Self(format!("{}{}", REMINDER_PREFIX, id))
    }

    pub fn rollover(task_id: i64) -> Self {
        Self(format!("{}{}", ROLLOVER_PREFIX, task_id))
    }

    /// Recovers the entity a handle belongs to, if it is one of ours.
    pub fn entity(&self) -> Option<EntityRef> {
        if let Some(id) = self.0.strip_prefix(REMINDER_PREFIX) {
            return id.parse().ok().map(EntityRef::reminder);
        }
        if let Some(id) = self.0.strip_prefix(ROLLOVER_PREFIX) {
            return id.parse().ok().map(EntityRef::rollover);
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
