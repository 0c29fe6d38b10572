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

//! The unit-of-work side of a firing.
//!
//! Every schedule starts a unit of work whose single argument is a
//! [`FirePayload`]. Whatever hosts that unit of work calls
//! [`FireHandler::on_fire`], which records the fact in the inbox with a
//! direct storage write. The inbox drainer then turns it into domain writes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{EntityKind, EntityRef, InboxPayload};
use crate::store::ReconcileStore;

/// Unit-of-work type started by reminder schedules.
pub const REMINDER_WORKFLOW: &str = "reminder_fire";

/// Unit-of-work type started by rollover schedules. It does nothing beyond
/// reporting the firing.
pub const ROLLOVER_WORKFLOW: &str = "rollover_tick";

/// The argument a schedule passes to its unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirePayload {
    pub entity: EntityRef,
    /// The schedule should be removed once this firing is handled
    pub delete_after: bool,
}

impl FirePayload {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "entity": {"kind": self.entity.kind.as_str(), "id": self.entity.id},
            "delete_after": self.delete_after,
        })
    }

    /// Decodes the payload from a unit of work's argument list.
    pub fn from_args(args: &[serde_json::Value]) -> Result<Self, serde_json::Error> {
        let first = args.first().cloned().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(first)
    }
}

/// Records scheduler firings into the inbox.
#[derive(Clone)]
pub struct FireHandler {
    store: Arc<dyn ReconcileStore>,
}

impl FireHandler {
    pub fn new(store: Arc<dyn ReconcileStore>) -> Self {
        Self { store }
    }

    /// Handles one firing that was scheduled for `fired_at`.
    ///
    /// Reminder firings become [`InboxPayload::Fired`]. A rollover firing
    /// is the next due date of its task and becomes
    /// [`InboxPayload::NextDueComputed`].
    pub async fn on_fire(
        &self,
        payload: FirePayload,
        fired_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let event = match payload.entity.kind {
            EntityKind::Reminder => InboxPayload::Fired {
                reminder_id: payload.entity.id,
                fired_at,
                delete_after: payload.delete_after,
            },
            EntityKind::Rollover => InboxPayload::NextDueComputed {
                task_id: payload.entity.id,
                due: fired_at,
            },
        };
        let id = self.store.record_inbox(&event).await?;
        info!(
            entity = %payload.entity,
            inbox_id = id,
            kind = event.kind(),
            "Recorded firing"
        );
        debug!(?event, "Inbox payload");
        Ok(id)
    }
}
