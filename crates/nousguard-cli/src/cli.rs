use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface definition. A thin harness over the encrypted journal.
#[derive(Parser, Debug)]
#[command(
    name = "nousguard",
    about = "Encrypted, local-only journal",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Read configuration from this file instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Optional subcommand; defaults to listing journal entries when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Check that the key store, cipher and journal file are usable.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Manage the journal encryption key.
    #[command(subcommand)]
    Key(KeyCommand),
    /// Read and write journal entries.
    #[command(subcommand)]
    Journal(JournalCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum KeyCommand {
    /// Create the encryption key if it does not exist yet.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum JournalCommand {
    /// List entries, newest first.
    List,
    /// Show a single entry.
    Show { id: i64 },
    /// Add a new entry.
    Add {
        #[arg(long, short)]
        title: String,
        /// Entry body; remaining words are joined with spaces.
        #[arg(required = true, trailing_var_arg = true)]
        content: Vec<String>,
    },
    /// Replace the title and content of an entry.
    Edit {
        id: i64,
        #[arg(long, short)]
        title: String,
        #[arg(required = true, trailing_var_arg = true)]
        content: Vec<String>,
    },
    /// Delete an entry (no error if it is already gone).
    Delete { id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_listing_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["nousguard"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
        assert_eq!(cli.config, None);
    }

    #[test]
    fn parses_health_subcommand() {
        let cli = Cli::try_parse_from(["nousguard", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Health));
    }

    #[test]
    fn parses_config_and_key_init() {
        let cli = Cli::try_parse_from(["nousguard", "config", "init"]).expect("parse");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));

        let cli = Cli::try_parse_from(["nousguard", "key", "init"]).expect("parse");
        assert_eq!(cli.command, Some(Command::Key(KeyCommand::Init)));
    }

    #[test]
    fn parses_journal_add_with_multiword_content() {
        let cli = Cli::try_parse_from([
            "nousguard",
            "journal",
            "add",
            "--title",
            "Monday",
            "felt",
            "calm",
        ])
        .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Journal(JournalCommand::Add {
                title: "Monday".into(),
                content: vec!["felt".into(), "calm".into()],
            }))
        );
    }

    #[test]
    fn parses_journal_edit_and_global_config() {
        let cli = Cli::try_parse_from([
            "nousguard",
            "--config",
            "/tmp/nousguard.toml",
            "journal",
            "edit",
            "3",
            "-t",
            "Renamed",
            "new",
            "body",
        ])
        .expect("parse should succeed");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/nousguard.toml")));
        assert_eq!(
            cli.command,
            Some(Command::Journal(JournalCommand::Edit {
                id: 3,
                title: "Renamed".into(),
                content: vec!["new".into(), "body".into()],
            }))
        );
    }

    #[test]
    fn rejects_non_numeric_ids() {
        assert!(Cli::try_parse_from(["nousguard", "journal", "show", "abc"]).is_err());
    }
}
