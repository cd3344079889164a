mod cli;
mod config;
mod journal;
mod storage;

use crate::cli::{ConfigCommand, KeyCommand};
use clap::Parser;
use color_eyre::Result;
use nousguard_core::storage::JournalStore;
use nousguard_storage::{
    field_cipher,
    key_provider::{KeyCustodian, SecureKeyStore},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point wiring the CLI to the encrypted journal.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    match cli.command.unwrap_or(cli::Command::Journal(cli::JournalCommand::List)) {
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&config).await?,
        cli::Command::Config(ConfigCommand::Init) => init_config(cli.config.as_deref(), &config)?,
        cli::Command::Key(KeyCommand::Init) => init_key(&config).await?,
        cli::Command::Journal(cmd) => journal::handle(cmd, &config).await?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info; logs go to stderr to keep stdout clean.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("nousguard {}", env!("CARGO_PKG_VERSION"));
}

/// Runs a quick health check of the key, the cipher and the journal file.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let store = storage::journal_store(config)?;
    let entries = run_health(&storage::custodian(config), &store).await?;
    println!("Key: ok");
    println!("Cipher: ok");
    println!("Journal: ok ({entries} entries)");
    Ok(())
}

async fn run_health<K: SecureKeyStore, S: JournalStore>(
    custodian: &KeyCustodian<K>,
    store: &S,
) -> Result<usize> {
    let key = custodian
        .get_or_create_key()
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;

    let sample = "ok";
    let field = field_cipher::encrypt(sample, &key)
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    let round_trip = field_cipher::decrypt_field(&field, &key)
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    if round_trip != sample {
        color_eyre::eyre::bail!("cipher round-trip failed");
    }

    let rows = store
        .list()
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    Ok(rows.len())
}

fn init_config(path: Option<&std::path::Path>, config: &config::Config) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config::default_path()?,
    };
    let path = config::write_if_missing(config, &path)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

async fn init_key(config: &config::Config) -> Result<()> {
    let custodian = storage::custodian(config);
    let key = custodian
        .get_or_create_key()
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    println!("Encryption key ready (alias: {})", key.alias());
    Ok(())
}

#[cfg(test)]
mod tests {
    use nousguard_core::storage::InMemoryJournalStore;
    use nousguard_storage::key_provider::InMemoryKeyStore;

    use super::*;

    #[tokio::test]
    async fn health_check_with_test_store_succeeds() {
        let custodian = KeyCustodian::new(InMemoryKeyStore::new());
        let entries = run_health(&custodian, &InMemoryJournalStore::new())
            .await
            .expect("health check should succeed");
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn health_check_fails_without_key_store() {
        let custodian = KeyCustodian::new(InMemoryKeyStore::unavailable());
        let err = run_health(&custodian, &InMemoryJournalStore::new())
            .await
            .expect_err("health check should fail");
        assert!(err.to_string().contains("encryption key unavailable"));
    }
}
