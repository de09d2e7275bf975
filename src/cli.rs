//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "librarian-ingest", version, about = "File completed downloads into the media library")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process a completed torrent
    Process {
        /// Torrent identifier, used for logging
        id: String,
        /// Torrent display name
        name: String,
        /// Download location (file or directory)
        path: PathBuf,
    },
    /// Manage ledger schema migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Inspect or edit the transformation ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum MigrateAction {
    /// Apply all pending migrations
    Install,
    /// Revert all installed migrations
    Uninstall,
    /// List installed migrations
    Status,
}

#[derive(Debug, Subcommand)]
pub enum LedgerAction {
    /// Print active ledger entries
    List,
    /// Soft-delete one entry
    Forget { from: String, to: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_process() {
        let cli = Cli::try_parse_from([
            "librarian-ingest",
            "process",
            "abc123",
            "The.Equalizer.2.2018",
            "/downloads/The.Equalizer.2.2018",
        ])
        .unwrap();
        assert_matches!(
            cli.command,
            Command::Process { id, name, path }
                if id == "abc123"
                    && name == "The.Equalizer.2.2018"
                    && path == PathBuf::from("/downloads/The.Equalizer.2.2018")
        );
    }

    #[test]
    fn test_parse_migrate_and_ledger() {
        let cli = Cli::try_parse_from(["librarian-ingest", "migrate", "uninstall"]).unwrap();
        assert_matches!(cli.command, Command::Migrate { action: MigrateAction::Uninstall });

        let cli = Cli::try_parse_from(["librarian-ingest", "ledger", "forget", "a", "b"]).unwrap();
        assert_matches!(cli.command, Command::Ledger { action: LedgerAction::Forget { from, to } } if from == "a" && to == "b");
    }

    #[test]
    fn test_process_requires_path() {
        assert!(Cli::try_parse_from(["librarian-ingest", "process", "id", "name"]).is_err());
    }
}
