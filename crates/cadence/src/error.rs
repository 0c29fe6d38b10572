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

//! Error types for the reconciliation engine.
//!
//! Each seam has its own error enum:
//!
//! - [`StoreError`] for the relational store (pool, queries, payload decoding)
//! - [`SchedulerError`] for the external scheduler's failure taxonomy
//! - [`GatewayError`] for failed gateway operations
//! - [`ConfigError`] for invalid knobs, raised before any loop starts
//!
//! [`ReconcileError`] is the per-row failure type of the drainers. Its
//! `Display` output is what gets recorded as a queue row's `last_error`.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection pool error
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// Database query error
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Migration failure
    #[error("Migration error: {0}")]
    Migration(String),

    /// A queue row that was expected to exist does not
    #[error("{table} row {id} not found")]
    RowNotFound { table: &'static str, id: i64 },

    /// A stored payload could not be decoded
    #[error("Invalid payload in {table} row {id}: {message}")]
    InvalidPayload {
        table: &'static str,
        id: i64,
        message: String,
    },

    /// A stored column held a value outside its domain
    #[error("Invalid value for {column}: {value}")]
    InvalidValue { column: &'static str, value: String },
}

impl From<deadpool::managed::PoolError<deadpool_diesel::Error>> for StoreError {
    fn from(err: deadpool::managed::PoolError<deadpool_diesel::Error>) -> Self {
        StoreError::Pool(err.to_string())
    }
}

impl From<deadpool_diesel::InteractError> for StoreError {
    fn from(err: deadpool_diesel::InteractError) -> Self {
        StoreError::Pool(err.to_string())
    }
}

/// Failures reported by a [`SchedulerClient`](crate::scheduler::SchedulerClient).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// A schedule with this handle already exists
    #[error("schedule {0} already exists")]
    AlreadyExists(String),

    /// No schedule with this handle exists (or it is not visible yet)
    #[error("schedule {0} not found")]
    NotFound(String),

    /// The call did not complete within its deadline
    #[error("scheduler call timed out after {0:?}")]
    Timeout(Duration),

    /// Network or server-side failure
    #[error("scheduler transport error: {0}")]
    Transport(String),

    /// The scheduler refused the request
    #[error("scheduler rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The scheduler answered with something we could not interpret
    #[error("invalid scheduler response: {0}")]
    InvalidResponse(String),
}

impl SchedulerError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SchedulerError::Timeout(_) | SchedulerError::Transport(_)
        )
    }
}

/// Errors surfaced by the [`SchedulerGateway`](crate::gateway::SchedulerGateway).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("upsert of {handle} failed: {source}")]
    Upsert {
        handle: String,
        #[source]
        source: SchedulerError,
    },

    #[error("delete of {handle} failed: {source}")]
    Delete {
        handle: String,
        #[source]
        source: SchedulerError,
    },

    #[error("describe of {handle} failed: {source}")]
    Describe {
        handle: String,
        #[source]
        source: SchedulerError,
    },
}

impl GatewayError {
    pub fn scheduler_error(&self) -> &SchedulerError {
        match self {
            GatewayError::Upsert { source, .. }
            | GatewayError::Delete { source, .. }
            | GatewayError::Describe { source, .. } => source,
        }
    }
}

/// Configuration errors. These are fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: String },

    #[error("could not parse {name}={value}: {message}")]
    Unparsable {
        name: &'static str,
        value: String,
        message: String,
    },

    #[error("{0} is required")]
    Missing(&'static str),
}

/// A failure while processing a single claimed queue row.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("unit of work panicked or was cancelled: {0}")]
    Aborted(String),
}

impl ReconcileError {
    /// Whether the scheduler reported a failure that may clear on its own.
    ///
    /// Store failures and aborted units are never classified as transient.
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Gateway(e) => e.scheduler_error().is_transient(),
            ReconcileError::Store(_) | ReconcileError::Aborted(_) => false,
        }
    }
}
