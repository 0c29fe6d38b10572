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

//! Connection pooling for PostgreSQL.
//!
//! [`Database`] owns a `deadpool-diesel` pool. Diesel is synchronous, so all
//! queries run through `interact`, which moves the closure onto a blocking
//! thread with a pooled connection.

use deadpool_diesel::postgres::{Manager, Object, Pool, Runtime};
use diesel_migrations::MigrationHarness;
use tracing::info;
use url::Url;

use crate::error::StoreError;

/// Type alias for the connection pool
pub type DbPool = Pool;

/// A shared pool of PostgreSQL connections.
///
/// `Database` is `Clone`; clones share the same pool.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("Database")
            .field("max_size", &status.max_size)
            .field("size", &status.size)
            .finish()
    }
}

impl Database {
    /// Creates a pool of at most `max_size` connections to `connection_string`.
    ///
    /// Connections are opened lazily, so an unreachable server surfaces on
    /// first use rather than here.
    pub fn new(connection_string: &str, max_size: u32) -> Result<Self, StoreError> {
        let manager = Manager::new(connection_string, Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(max_size as usize)
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        info!(
            target_db = %redact(connection_string),
            max_size,
            "PostgreSQL connection pool initialized"
        );
        Ok(Self { pool })
    }

    /// Checks a connection out of the pool.
    pub async fn get_connection(&self) -> Result<Object, StoreError> {
        Ok(self.pool.get().await?)
    }

    /// Runs pending embedded migrations.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        let conn = self.get_connection().await?;
        let applied = conn
            .interact(|conn| {
                conn.run_pending_migrations(super::MIGRATIONS)
                    .map(|versions| versions.len())
                    .map_err(|e| e.to_string())
            })
            .await?
            .map_err(StoreError::Migration)?;
        info!(applied, "Database migrations complete");
        Ok(())
    }

    /// Closes the pool. Checked-out connections are dropped when returned.
    pub fn close(&self) {
        self.pool.close();
        info!("PostgreSQL connection pool closed");
    }
}

/// The connection string with any password removed, for logging.
fn redact(connection_string: &str) -> String {
    match Url::parse(connection_string) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparsable url>".to_string(),
    }
}
