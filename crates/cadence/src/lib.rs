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

//! # Cadence
//!
//! Cadence keeps reminder and task-rollover definitions stored in PostgreSQL
//! in step with an external scheduler that fires the timers.
//!
//! Storage and scheduler fail independently. Cadence bridges them with two
//! durable queues:
//!
//! - the **outbox**, appended by database triggers whenever a row changes in
//!   a way that can alter its schedule, and drained by [`OutboxDrainer`]
//! - the **inbox**, appended by [`FireHandler`] when a schedule fires, and
//!   drained by [`InboxDrainer`]
//!
//! Draining an outbox row re-reads the entity, compiles it into a
//! [`Decision`] with [`compile_reminder`] or [`compile_rollover`], and
//! applies that decision through the idempotent [`SchedulerGateway`].
//! Because the handle of an external schedule is derived from the entity
//! id, replaying an event is always safe.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cadence::{
//!     InMemoryScheduler, MemoryStore, OutboxDrainer, ReconcilerConfig, SchedulerGateway,
//! };
//!
//! let config = ReconcilerConfig::default();
//! let store = Arc::new(MemoryStore::new());
//! let gateway = SchedulerGateway::new(Arc::new(InMemoryScheduler::new()), &config);
//! let drainer = OutboxDrainer::new(store, gateway, config);
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//! let handle = tokio::spawn(async move { drainer.run(shutdown_rx).await });
//! // ...
//! shutdown_tx.send(()).ok();
//! handle.await?;
//! ```
//!
//! ## Modules
//!
//! - [`compiler`]: pure mapping from a row to a desired schedule
//! - [`gateway`]: race-tolerant scheduler operations
//! - [`scheduler`]: the scheduler seam and its implementations
//! - [`reconciler`]: drainers and the expiry sweep
//! - [`store`], [`dal`], [`database`]: the storage seam and its PostgreSQL
//!   implementation

pub mod compiler;
pub mod config;
pub mod dal;
pub mod database;
pub mod error;
pub mod fire;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod reconciler;
pub mod scheduler;
pub mod store;

pub use compiler::{
    compile_reminder, compile_rollover, Decision, DeleteReason, DesiredSchedule, Lifecycle,
};
pub use config::{ReconcilerConfig, ReconcilerConfigBuilder};
pub use dal::DAL;
pub use database::Database;
pub use error::{ConfigError, GatewayError, ReconcileError, SchedulerError, StoreError};
pub use fire::{FireHandler, FirePayload};
pub use gateway::{DeleteOutcome, SchedulerGateway, UpsertOutcome};
pub use logging::init_logging;
pub use models::{EntityKind, EntityRef, InboxPayload, OutboxOp, QueueName, QueueStats};
pub use reconciler::{
    BatchReport, InboxDrainer, InboxOutcome, OutboxDrainer, SweepReport, Sweeper, SyncOutcome,
};
pub use scheduler::{InMemoryScheduler, ScheduleHandle, SchedulerClient};
#[cfg(feature = "temporal-http")]
pub use scheduler::{TemporalHttpClient, TemporalHttpConfig};
pub use store::{MemoryStore, ReconcileStore};
