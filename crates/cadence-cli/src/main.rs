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

//! Cadence CLI - runs the schedule reconciler against PostgreSQL.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

mod commands;

/// Cadence - keeps reminder and rollover schedules in step with storage
#[derive(Parser)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (falls back to POSTGRES_URI when DATABASE_URL is unset)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Scheduler implementation to reconcile against
    #[arg(long, value_enum, default_value = "temporal", global = true)]
    scheduler: SchedulerKind,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SchedulerKind {
    /// Temporal over its HTTP API
    Temporal,
    /// In-process scheduler; schedules are lost on exit
    Memory,
}

#[derive(Subcommand)]
enum Commands {
    /// Drain the outbox and run the periodic expiry sweep
    Drain,
    /// Drain the inbox of scheduler firings
    Worker,
    /// Run a single expiry sweep and exit
    Sweep,
    /// Apply pending database migrations
    Migrate,
    /// Record a schedule firing into the inbox
    Fire {
        /// The unit-of-work argument, as JSON
        payload: String,

        /// When the firing was scheduled for (RFC 3339); defaults to now
        #[arg(long)]
        fired_at: Option<String>,
    },
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Show pending, quarantined and processed counts for both queues
    Stats,
    /// Return quarantined rows to the pending state
    Requeue {
        /// Queue to requeue from
        #[arg(long, value_enum, default_value = "all")]
        queue: QueueArg,

        /// Requeue a single row (requires --queue outbox or inbox)
        #[arg(long)]
        id: Option<i64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum QueueArg {
    Outbox,
    Inbox,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    cadence::init_logging(cli.verbose.then_some(Level::DEBUG));

    let database_url = cli
        .database_url
        .or_else(|| std::env::var("POSTGRES_URI").ok())
        .context("Database URL is required. Set --database-url, DATABASE_URL or POSTGRES_URI")?;

    match cli.command {
        Commands::Drain => commands::drain::run(&database_url, cli.scheduler).await?,
        Commands::Worker => commands::worker::run(&database_url, cli.scheduler).await?,
        Commands::Sweep => commands::sweep::run(&database_url, cli.scheduler).await?,
        Commands::Migrate => commands::migrate::run(&database_url).await?,
        Commands::Fire { payload, fired_at } => {
            commands::fire::run(&database_url, &payload, fired_at.as_deref()).await?
        }
        Commands::Admin { command } => match command {
            AdminCommands::Stats => commands::admin::stats(&database_url).await?,
            AdminCommands::Requeue { queue, id } => {
                commands::admin::requeue(&database_url, queue, id).await?
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_requeue_with_id() {
        let cli = Cli::try_parse_from([
            "cadence",
            "--database-url",
            "postgres://localhost/reminders",
            "admin",
            "requeue",
            "--queue",
            "inbox",
            "--id",
            "42",
        ])
        .unwrap();
        match cli.command {
            Commands::Admin {
                command: AdminCommands::Requeue { queue, id },
            } => {
                assert_eq!(queue, QueueArg::Inbox);
                assert_eq!(id, Some(42));
            }
            _ => panic!("expected admin requeue"),
        }
    }

    #[test]
    fn scheduler_defaults_to_temporal() {
        let cli = Cli::try_parse_from(["cadence", "drain"]).unwrap();
        assert!(matches!(cli.scheduler, SchedulerKind::Temporal));
        assert!(matches!(cli.command, Commands::Drain));
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["cadence", "worker", "--scheduler", "memory", "-v"]).unwrap();
        assert!(matches!(cli.scheduler, SchedulerKind::Memory));
        assert!(cli.verbose);
    }

    #[test]
    fn fire_takes_a_payload_and_optional_time() {
        let cli = Cli::try_parse_from([
            "cadence",
            "fire",
            r#"{"entity":{"kind":"reminder","id":1},"delete_after":true}"#,
            "--fired-at",
            "2030-01-01T09:00:00Z",
        ])
        .unwrap();
        match cli.command {
            Commands::Fire { payload, fired_at } => {
                assert!(payload.contains("reminder"));
                assert_eq!(fired_at.as_deref(), Some("2030-01-01T09:00:00Z"));
            }
            _ => panic!("expected fire"),
        }
    }
}
