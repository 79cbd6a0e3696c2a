use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "edflex-sync",
    version,
    about = "Edflex category and content synchronization"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Commands {
    /// Run both jobs on their cron schedules (default if no subcommand given).
    ///
    /// SIGHUP queues an extra categories run, SIGUSR1 an extra contents run.
    Run,

    /// Mirror upstream categories once.
    SyncCategories,

    /// Refresh imported contents once.
    SyncContents {
        /// Stop after this many content ids.
        #[arg(long)]
        max_records: Option<usize>,

        /// Refresh contents last synchronized more than this many hours ago.
        #[arg(long, env = "EDFLEX_CONTENT_STALENESS_HOURS")]
        staleness_hours: Option<i64>,
    },

    /// Probe the upstream API with the configured credentials.
    CheckConnection,

    /// Delete category translations whose category no longer exists.
    PurgeOrphans,

    /// Print current configuration (redacted secrets).
    ShowConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_no_subcommand() {
        let cli = Cli::try_parse_from(["edflex-sync"]).unwrap();
        assert_eq!(cli.command, None);
    }

    #[test]
    fn parses_sync_contents_options() {
        let cli = Cli::try_parse_from([
            "edflex-sync",
            "sync-contents",
            "--max-records",
            "500",
            "--staleness-hours",
            "6",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::SyncContents {
                max_records: Some(500),
                staleness_hours: Some(6),
            })
        );
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(Cli::try_parse_from(["edflex-sync", "serve"]).is_err());
        let bad_count = ["edflex-sync", "sync-contents", "--max-records", "x"];
        assert!(Cli::try_parse_from(bad_count).is_err());
    }
}
