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

//! Domain models read and written by the reconciler.
//!
//! These are backend-neutral types. The PostgreSQL row structs live in
//! [`crate::dal`] and convert into these.

pub mod queue;
pub mod reminder;
pub mod rollover;
pub mod task;

pub use queue::{
    EntityKind, EntityRef, InboxEvent, InboxPayload, OutboxEvent, OutboxOp, QueueName, QueueStats,
};
pub use reminder::{ReminderDefinition, ReminderKind};
pub use rollover::{RollSpec, RolloverDefinition};
pub use task::TaskContext;
