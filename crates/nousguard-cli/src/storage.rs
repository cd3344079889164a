use std::{path::PathBuf, sync::Arc};

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use nousguard_core::storage::JournalStore;
use nousguard_journal::{
    bootstrap::{Bootstrap, RetryPolicy},
    EncryptedJournalRepo,
};
use nousguard_storage::{
    file_journal_store::FileJournalStore,
    key_provider::{KeyCustodian, KeyringKeyStore, SecureKeyStore},
};
use tracing::debug;

/// Resolve the default data directory for NousGuard.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("nousguard"))
}

/// Journal file store, honoring the config's data directory override.
pub fn journal_store(config: &Config) -> Result<FileJournalStore> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(?root, "opening journal store");
    Ok(FileJournalStore::new(root))
}

/// Custodian for the journal key in the OS keychain.
pub fn custodian(config: &Config) -> KeyCustodian<KeyringKeyStore> {
    KeyCustodian::with_alias(
        KeyringKeyStore::new(config.keyring_service()),
        config.key_alias(),
    )
}

/// Bring up the journal: key first, then the store, with bounded retries.
pub async fn open_journal(config: &Config) -> Result<Arc<EncryptedJournalRepo<FileJournalStore>>> {
    open_with(
        Arc::new(custodian(config)),
        journal_store(config)?,
        config.retry_policy(),
    )
    .await
}

pub async fn open_with<K, S>(
    custodian: Arc<KeyCustodian<K>>,
    store: S,
    policy: RetryPolicy,
) -> Result<Arc<EncryptedJournalRepo<S>>>
where
    K: SecureKeyStore + 'static,
    S: JournalStore + 'static,
{
    let mut ready = Bootstrap::spawn(custodian, store, policy);
    ready
        .wait()
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))
}

/// Helper for tests: a file-backed journal under `root` with an in-memory key.
#[cfg(test)]
pub async fn test_journal(
    root: impl Into<PathBuf>,
) -> Arc<EncryptedJournalRepo<FileJournalStore>> {
    use nousguard_storage::key_provider::InMemoryKeyStore;

    open_with(
        Arc::new(KeyCustodian::new(InMemoryKeyStore::new())),
        FileJournalStore::new(root),
        RetryPolicy::default(),
    )
    .await
    .expect("test journal opens")
}
