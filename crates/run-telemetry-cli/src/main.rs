//! run-telemetry: streams research run documents to the ingestion stream.

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use observability::LogConfig;

use crate::config::{AppConfig, Overrides};

#[derive(Parser)]
#[command(name = "run-telemetry")]
#[command(about = "Stream research run metadata to the ingestion stream")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON config file, applied before environment and flags
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ingestion API base URL
    #[arg(long, env = "FIREHOSE_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Destination delivery stream
    #[arg(long, env = "FIREHOSE_STREAM_NAME", global = true)]
    stream_name: Option<String>,

    /// Bearer token for the ingestion API
    #[arg(long, env = "FIREHOSE_AUTH_TOKEN", hide_env_values = true, global = true)]
    auth_token: Option<String>,

    /// SQLite run document store. Defaults to ~/.run-telemetry/runs.sqlite3
    #[arg(long, env = "RUN_TELEMETRY_DB", global = true)]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUN_TELEMETRY_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Write JSONL logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            endpoint: self.endpoint.clone(),
            stream_name: self.stream_name.clone(),
            auth_token: self.auth_token.clone(),
            store_path: self.db.clone(),
            log_level: self.log_level.clone(),
            log_path: self.log_file.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Stream a single run
    Stream {
        /// Run id to look up in the store
        #[arg(long, conflicts_with = "file")]
        run_id: Option<String>,
        /// JSON file holding one run document
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Stream the most recent runs, newest first
    Backfill {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Stream runs recorded since a point in time, oldest first
    Since(SinceArgs),
    /// Load run documents (JSON array or JSONL) into the store
    Import { file: PathBuf },
    /// Verify sink credentials and the store
    Check,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SinceArgs {
    /// RFC 3339 timestamp, e.g. 2025-01-15T00:00:00Z
    #[arg(long)]
    since: Option<DateTime<Utc>>,
    /// Look back this many hours from now
    #[arg(long)]
    hours: Option<i64>,
}

impl SinceArgs {
    fn start(&self) -> Result<DateTime<Utc>> {
        match (self.since, self.hours) {
            (Some(since), _) => Ok(since),
            (None, Some(hours)) => Duration::try_hours(hours)
                .map(|window| Utc::now() - window)
                .context("--hours is out of range"),
            (None, None) => anyhow::bail!("either --since or --hours is required"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::resolve(cli.config.as_deref(), &cli.overrides())?;

    observability::init_with_config(LogConfig {
        service_name: "run-telemetry".into(),
        default_level: config.log_level.clone(),
        log_path: config.log_path.clone(),
        also_stderr: false,
    })?;

    match &cli.command {
        Command::Stream { run_id, file } => {
            commands::stream(&config, run_id.as_deref(), file.as_deref()).await
        }
        Command::Backfill { limit } => commands::backfill(&config, *limit).await,
        Command::Since(args) => commands::since(&config, args.start()?).await,
        Command::Import { file } => commands::import(&config, file).await,
        Command::Check => commands::check(&config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backfill_with_default_limit() {
        let cli = Cli::try_parse_from(["run-telemetry", "backfill"]).unwrap();
        assert!(matches!(cli.command, Command::Backfill { limit: 100 }));
    }

    #[test]
    fn global_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "run-telemetry",
            "backfill",
            "--limit",
            "5",
            "--stream-name",
            "runs-dev",
            "--db",
            "/tmp/runs.sqlite3",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.stream_name.as_deref(), Some("runs-dev"));
        assert_eq!(overrides.store_path, Some(PathBuf::from("/tmp/runs.sqlite3")));
    }

    #[test]
    fn since_accepts_timestamp_or_hours() {
        let cli = Cli::try_parse_from(["run-telemetry", "since", "--since", "2025-01-15T00:00:00Z"])
            .unwrap();
        let Command::Since(args) = cli.command else {
            panic!("expected since");
        };
        assert_eq!(args.start().unwrap().to_rfc3339(), "2025-01-15T00:00:00+00:00");

        let cli = Cli::try_parse_from(["run-telemetry", "since", "--hours", "24"]).unwrap();
        let Command::Since(args) = cli.command else {
            panic!("expected since");
        };
        assert!(args.start().unwrap() < Utc::now());

        assert!(Cli::try_parse_from(["run-telemetry", "since"]).is_err());
    }

    #[test]
    fn stream_rejects_both_sources() {
        let result = Cli::try_parse_from([
            "run-telemetry",
            "stream",
            "--run-id",
            "r1",
            "--file",
            "run.json",
        ]);
        assert!(result.is_err());
    }
}
