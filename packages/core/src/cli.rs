use clap::{Parser, Subcommand, ValueEnum};

use crate::models::MilkStatus;

/// Dairy farm notification service CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "dairy-notifier",
    version,
    about = "Scheduled milk production, batch expiry and stock notifications"
)]
pub struct Cli {
    /// SQLite database URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Real-time push gateway base URL (overrides REALTIME_URL)
    #[arg(long, global = true)]
    pub realtime_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every sweep on its schedule until Ctrl+C (default)
    Run,
    /// Run a single sweep once and exit
    Sweep {
        #[arg(value_enum)]
        kind: SweepKind,
    },
    /// Send the daily admin digest now
    Digest,
    /// Delete notifications past the retention period
    Cleanup,
    /// Print today's notification counters as JSON
    Stats,
    /// Notify managers about a milk batch status change
    BatchStatus {
        #[arg(long)]
        batch_id: i64,
        #[arg(long, value_parser = parse_status)]
        from: MilkStatus,
        #[arg(long, value_parser = parse_status)]
        to: MilkStatus,
    },
    /// Send a critical alert to every admin
    Alert {
        /// Alert category, stored as `admin_critical_{type}`
        #[arg(long = "type")]
        alert_type: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        cow_id: Option<i64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SweepKind {
    Production,
    Expiry,
    Usage,
    Stock,
}

fn parse_status(raw: &str) -> Result<MilkStatus, String> {
    raw.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["dairy-notifier"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn sweep_kind_and_global_override() {
        let cli = Cli::try_parse_from([
            "dairy-notifier",
            "sweep",
            "expiry",
            "--database-url",
            "sqlite://farm.db",
        ])
        .unwrap();
        assert_eq!(cli.database_url.as_deref(), Some("sqlite://farm.db"));
        assert!(matches!(
            cli.command,
            Some(Command::Sweep {
                kind: SweepKind::Expiry
            })
        ));
    }

    #[test]
    fn batch_status_parses_statuses() {
        let cli = Cli::try_parse_from([
            "dairy-notifier",
            "batch-status",
            "--batch-id",
            "12",
            "--from",
            "FRESH",
            "--to",
            "used",
        ])
        .unwrap();
        match cli.command {
            Some(Command::BatchStatus { batch_id, from, to }) => {
                assert_eq!(batch_id, 12);
                assert_eq!(from, MilkStatus::Fresh);
                assert_eq!(to, MilkStatus::Used);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let result = Cli::try_parse_from([
            "dairy-notifier",
            "batch-status",
            "--batch-id",
            "1",
            "--from",
            "fresh",
            "--to",
            "sour",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn alert_takes_type_flag() {
        let cli = Cli::try_parse_from([
            "dairy-notifier",
            "alert",
            "--type",
            "health",
            "--message",
            "Sapi demam",
            "--cow-id",
            "3",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Alert {
                alert_type,
                message,
                cow_id,
            }) => {
                assert_eq!(alert_type, "health");
                assert_eq!(message, "Sapi demam");
                assert_eq!(cow_id, Some(3));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
