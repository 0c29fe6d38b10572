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

//! Configuration for the reconciliation loops.
//!
//! Every knob is a positive number with a documented default. Values can be
//! set through [`ReconcilerConfig::builder()`] or read from the environment
//! with [`ReconcilerConfig::from_env()`]:
//!
//! | knob | variable | default |
//! |---|---|---|
//! | poll interval | `OUTBOX_POLL_SECONDS` | 1.0 s |
//! | batch size | `OUTBOX_BATCH_SIZE` | 200 |
//! | concurrency limit | `OUTBOX_CONCURRENCY` | 50 |
//! | sweep interval | `CLEAN_SECONDS` | 60 s |
//! | claim lease | `OUTBOX_LEASE_SECONDS` | 30 s |
//! | backoff cap | `OUTBOX_BACKOFF_CAP_SECONDS` | 300 s |
//! | attempts before quarantine | `OUTBOX_MAX_ATTEMPTS` | 25 |
//! | scheduler call timeout | `SCHEDULER_CALL_TIMEOUT_SECONDS` | 10 s |
//! | connection pool size | `DB_POOL_SIZE` | 5 |

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Runtime configuration for the outbox drainer, inbox drainer and sweep.
///
/// ```rust,ignore
/// let config = ReconcilerConfig::builder()
///     .batch_size(50)
///     .concurrency(8)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct ReconcilerConfig {
    poll_interval: Duration,
    batch_size: usize,
    concurrency: usize,
    sweep_interval: Duration,
    lease: Duration,
    backoff_cap: Duration,
    max_attempts: i32,
    call_timeout: Duration,
    visibility_attempts: u32,
    visibility_step: Duration,
    db_pool_size: u32,
}

impl ReconcilerConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> ReconcilerConfigBuilder {
        ReconcilerConfigBuilder::default()
    }

    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    ///
    /// Unset variables keep their defaults. Set but unparsable or
    /// non-positive values are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(secs) = parse_var::<f64, _>(&lookup, "OUTBOX_POLL_SECONDS")? {
            builder = builder.poll_interval(seconds("OUTBOX_POLL_SECONDS", secs)?);
        }
        if let Some(n) = parse_var(&lookup, "OUTBOX_BATCH_SIZE")? {
            builder = builder.batch_size(n);
        }
        if let Some(n) = parse_var(&lookup, "OUTBOX_CONCURRENCY")? {
            builder = builder.concurrency(n);
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "CLEAN_SECONDS")? {
            builder = builder.sweep_interval(seconds("CLEAN_SECONDS", secs)?);
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "OUTBOX_LEASE_SECONDS")? {
            builder = builder.lease(seconds("OUTBOX_LEASE_SECONDS", secs)?);
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "OUTBOX_BACKOFF_CAP_SECONDS")? {
            builder = builder.backoff_cap(seconds("OUTBOX_BACKOFF_CAP_SECONDS", secs)?);
        }
        if let Some(n) = parse_var(&lookup, "OUTBOX_MAX_ATTEMPTS")? {
            builder = builder.max_attempts(n);
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "SCHEDULER_CALL_TIMEOUT_SECONDS")? {
            builder = builder.call_timeout(seconds("SCHEDULER_CALL_TIMEOUT_SECONDS", secs)?);
        }
        if let Some(n) = parse_var(&lookup, "DB_POOL_SIZE")? {
            builder = builder.db_pool_size(n);
        }
        builder.build()
    }

    /// How long the drainer sleeps when a claim comes back empty.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Maximum rows claimed per drain cycle.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Maximum rows processed concurrently within a batch.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// How often lapsed reminders are swept.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// How far a claim pushes `available_at` forward.
    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Upper bound on retry backoff.
    pub fn backoff_cap(&self) -> Duration {
        self.backoff_cap
    }

    /// Attempts after which a failing row is quarantined.
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    /// Deadline for each individual external scheduler call.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Describe attempts tolerated while a new schedule becomes visible.
    pub fn visibility_attempts(&self) -> u32 {
        self.visibility_attempts
    }

    /// Base delay between visibility retries; attempt `n` waits `n * step`.
    pub fn visibility_step(&self) -> Duration {
        self.visibility_step
    }

    /// Number of database connections in the pool.
    pub fn db_pool_size(&self) -> u32 {
        self.db_pool_size
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfigBuilder::default().config
    }
}

/// Builder for [`ReconcilerConfig`].
#[derive(Debug, Clone)]
pub struct ReconcilerConfigBuilder {
    config: ReconcilerConfig,
}

impl Default for ReconcilerConfigBuilder {
    fn default() -> Self {
        Self {
            config: ReconcilerConfig {
                poll_interval: Duration::from_secs(1),
                batch_size: 200,
                concurrency: 50,
                sweep_interval: Duration::from_secs(60),
                lease: Duration::from_secs(30),
                backoff_cap: Duration::from_secs(300),
                max_attempts: 25,
                call_timeout: Duration::from_secs(10),
                visibility_attempts: 6,
                visibility_step: Duration::from_millis(150),
                db_pool_size: 5,
            },
        }
    }
}

impl ReconcilerConfigBuilder {
    /// Sets the empty-queue poll interval.
    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.config.poll_interval = value;
        self
    }

    /// Sets the claim batch size.
    pub fn batch_size(mut self, value: usize) -> Self {
        self.config.batch_size = value;
        self
    }

    /// Sets the per-batch concurrency limit.
    pub fn concurrency(mut self, value: usize) -> Self {
        self.config.concurrency = value;
        self
    }

    /// Sets the sweep interval.
    pub fn sweep_interval(mut self, value: Duration) -> Self {
        self.config.sweep_interval = value;
        self
    }

    /// Sets the claim lease.
    pub fn lease(mut self, value: Duration) -> Self {
        self.config.lease = value;
        self
    }

    /// Sets the backoff cap.
    pub fn backoff_cap(mut self, value: Duration) -> Self {
        self.config.backoff_cap = value;
        self
    }

    /// Sets the quarantine threshold.
    pub fn max_attempts(mut self, value: i32) -> Self {
        self.config.max_attempts = value;
        self
    }

    /// Sets the scheduler call timeout.
    pub fn call_timeout(mut self, value: Duration) -> Self {
        self.config.call_timeout = value;
        self
    }

    /// Sets the visibility retry schedule.
    pub fn visibility_retry(mut self, attempts: u32, step: Duration) -> Self {
        self.config.visibility_attempts = attempts;
        self.config.visibility_step = step;
        self
    }

    /// Sets the database pool size.
    pub fn db_pool_size(mut self, value: u32) -> Self {
        self.config.db_pool_size = value;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<ReconcilerConfig, ConfigError> {
        let c = &self.config;
        positive_duration("poll interval", c.poll_interval)?;
        positive_duration("sweep interval", c.sweep_interval)?;
        positive_duration("lease", c.lease)?;
        positive_duration("backoff cap", c.backoff_cap)?;
        positive_duration("call timeout", c.call_timeout)?;
        positive("batch size", c.batch_size as i64)?;
        positive("concurrency", c.concurrency as i64)?;
        positive("max attempts", c.max_attempts as i64)?;
        positive("visibility attempts", c.visibility_attempts as i64)?;
        positive("db pool size", c.db_pool_size as i64)?;
        Ok(self.config)
    }
}

fn positive(name: &'static str, value: i64) -> Result<(), ConfigError> {
    if value <= 0 {
        return Err(ConfigError::NotPositive {
            name,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn positive_duration(name: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::NotPositive {
            name,
            value: format!("{:?}", value),
        });
    }
    Ok(())
}

fn seconds(name: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    if !(secs > 0.0) {
        return Err(ConfigError::NotPositive {
            name,
            value: secs.to_string(),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::Unparsable {
        name,
        value: secs.to_string(),
        message: e.to_string(),
    })
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Unparsable {
                name,
                value: raw,
                message: e.to_string(),
            }),
    }
}
