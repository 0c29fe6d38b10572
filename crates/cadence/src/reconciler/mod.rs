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

//! The reconciliation loops.
//!
//! [`OutboxDrainer`] pushes desired state to the scheduler, [`Sweeper`]
//! retires reminders whose window lapsed without a new mutation, and
//! [`InboxDrainer`] writes scheduler facts back into storage.
//!
//! Both drainers share the same batch discipline: claim up to `batch_size`
//! rows, run each one as an independent unit bounded by a semaphore, settle
//! each row on its own, and wait for the whole batch before claiming again.

pub mod backoff;
pub mod inbox;
pub mod outbox;
pub mod sweep;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, StoreError};
use crate::models::QueueName;
use crate::store::ReconcileStore;

pub use backoff::backoff_delay;
pub use inbox::{InboxDrainer, InboxOutcome};
pub use outbox::{OutboxDrainer, SyncOutcome};
pub use sweep::{SweepReport, Sweeper};

/// Terminal state a claimed row was left in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Processed,
    /// Released for another attempt after the delay
    Retrying(Duration),
    Quarantined,
}

/// Counts for one drained batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub claimed: usize,
    pub processed: usize,
    pub retrying: usize,
    pub quarantined: usize,
    /// Rows whose outcome could not be recorded; their lease will expire
    pub unsettled: usize,
}

impl BatchReport {
    fn record(&mut self, settled: Settled) {
        match settled {
            Settled::Processed => self.processed += 1,
            Settled::Retrying(_) => self.retrying += 1,
            Settled::Quarantined => self.quarantined += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    backoff_cap: Duration,
    max_attempts: i32,
}

impl From<&ReconcilerConfig> for RetryPolicy {
    fn from(config: &ReconcilerConfig) -> Self {
        Self {
            backoff_cap: config.backoff_cap(),
            max_attempts: config.max_attempts(),
        }
    }
}

/// Records the outcome of one claimed row.
async fn settle(
    store: &dyn ReconcileStore,
    policy: RetryPolicy,
    queue: QueueName,
    id: i64,
    attempts: i32,
    result: Result<(), ReconcileError>,
) -> Result<Settled, StoreError> {
    let err = match result {
        Ok(()) => {
            store.mark_processed(queue, id).await?;
            return Ok(Settled::Processed);
        }
        Err(err) => err,
    };
    let message = err.to_string();
    if attempts >= policy.max_attempts {
        error!(%queue, id, attempts, error = %message, "Quarantining row");
        store.quarantine(queue, id, &message).await?;
        return Ok(Settled::Quarantined);
    }
    let delay = backoff_delay(attempts, policy.backoff_cap);
    if err.is_transient() {
        warn!(
            %queue,
            id,
            attempts,
            retry_in_secs = delay.as_secs(),
            error = %message,
            "Row failed, will retry"
        );
    } else {
        error!(
            %queue,
            id,
            attempts,
            retry_in_secs = delay.as_secs(),
            error = %message,
            "Row failed with a non-transient error, will retry"
        );
    }
    store.mark_failed(queue, id, &message, delay).await?;
    Ok(Settled::Retrying(delay))
}

/// A claimed row reduced to what settling needs.
struct Claim {
    id: i64,
    attempts: i32,
}

/// Processes `rows` with at most `concurrency` in flight and settles each.
///
/// `work` builds the unit of work for a row. It runs in its own task so a
/// panic is recorded against that row alone.
async fn run_batch<T, F, Fut>(
    store: Arc<dyn ReconcileStore>,
    config: &ReconcilerConfig,
    queue: QueueName,
    rows: Vec<(i64, i32, T)>,
    work: F,
) -> BatchReport
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<(), ReconcileError>> + Send + 'static,
{
    let mut report = BatchReport {
        claimed: rows.len(),
        ..Default::default()
    };
    let policy = RetryPolicy::from(config);
    let semaphore = Arc::new(Semaphore::new(config.concurrency()));
    let mut set = JoinSet::new();

    for (id, attempts, row) in rows {
        let unit = work(row);
        let claim = Claim { id, attempts };
        let store = store.clone();
        let semaphore = semaphore.clone();
        set.spawn(async move {
            // The semaphore is owned here and never closed.
            let _permit = semaphore.acquire_owned().await.ok();
            let result = match tokio::spawn(unit).await {
                Ok(result) => result,
                Err(join) => Err(ReconcileError::Aborted(join.to_string())),
            };
            let settled = settle(&*store, policy, queue, claim.id, claim.attempts, result).await;
            (claim.id, settled)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(settled))) => report.record(settled),
            Ok((id, Err(e))) => {
                error!(%queue, id, error = %e, "Could not record row outcome");
                report.unsettled += 1;
            }
            Err(e) => {
                error!(%queue, error = %e, "Settle task failed");
                report.unsettled += 1;
            }
        }
    }
    report
}

/// True once a shutdown has been signalled or every sender is gone.
fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(
        shutdown.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    )
}

/// Sleeps for `period` unless shutdown arrives first. Returns `true` on shutdown.
async fn idle(shutdown: &mut broadcast::Receiver<()>, period: Duration) -> bool {
    tokio::select! {
        _ = shutdown.recv() => true,
        _ = tokio::time::sleep(period) => false,
    }
}
