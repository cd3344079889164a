//! Encrypted journal repository and the startup sequence that provides it.

pub mod bootstrap;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use nousguard_core::{
    crypto::CryptoError,
    journal::{EntryId, JournalEntry, JournalRepository, JournalRow, ListedEntry, NewJournalRow},
    storage::{JournalStore, JournalStoreError},
};
use nousguard_storage::{field_cipher, key_provider::KeyHandle};
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] JournalStoreError),
}

/// Journal repository that encrypts title and content before they reach the
/// `JournalStore`, each field under its own fresh IV.
pub struct EncryptedJournalRepo<S: JournalStore> {
    store: Arc<S>,
    key: KeyHandle,
}

impl<S: JournalStore> EncryptedJournalRepo<S> {
    pub fn new(store: S, key: KeyHandle) -> Self {
        Self::from_shared(Arc::new(store), key)
    }

    pub fn from_shared(store: Arc<S>, key: KeyHandle) -> Self {
        Self { store, key }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Encrypts both fields; nothing is written unless both succeed.
    #[instrument(skip_all)]
    pub async fn insert_entry(
        &self,
        title: String,
        content: String,
    ) -> Result<JournalEntry, JournalError> {
        let timestamp = Utc::now();
        let row = NewJournalRow {
            title: field_cipher::encrypt(&title, &self.key)?,
            content: field_cipher::encrypt(&content, &self.key)?,
            timestamp,
        };
        let id = self.store.insert(row).await?;
        debug!(id, "journal entry inserted (encrypted)");
        Ok(JournalEntry {
            id,
            title,
            content,
            timestamp,
        })
    }

    #[instrument(skip(self, title, content))]
    pub async fn update_entry(
        &self,
        id: EntryId,
        title: String,
        content: String,
    ) -> Result<JournalEntry, JournalError> {
        let timestamp = Utc::now();
        let row = JournalRow {
            id,
            title: field_cipher::encrypt(&title, &self.key)?,
            content: field_cipher::encrypt(&content, &self.key)?,
            timestamp,
        };
        self.store.update(row).await?;
        debug!("journal entry updated (encrypted)");
        Ok(JournalEntry {
            id,
            title,
            content,
            timestamp,
        })
    }

    #[instrument(skip(self))]
    pub async fn delete_entry(&self, id: EntryId) -> Result<(), JournalError> {
        self.store.delete(id).await?;
        debug!("journal entry deleted");
        Ok(())
    }

    /// Fetch and decrypt one entry. A row that fails to decrypt is an error here;
    /// only the bulk listing substitutes placeholders.
    #[instrument(skip(self))]
    pub async fn get_entry(&self, id: EntryId) -> Result<Option<JournalEntry>, JournalError> {
        match self.store.get(id).await? {
            Some(row) => Ok(Some(self.decrypt_row(&row)?)),
            None => Ok(None),
        }
    }

    /// All entries, newest first. Undecryptable rows are listed as unreadable.
    #[instrument(skip_all)]
    pub async fn list_entries(&self) -> Result<Vec<ListedEntry>, JournalError> {
        let rows = self.store.list().await?;
        let listed = rows
            .iter()
            .map(|row| listed_entry(row, self.decrypt_row(row)))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = listed.len(), "journal entries listed");
        Ok(listed)
    }

    fn decrypt_row(&self, row: &JournalRow) -> Result<JournalEntry, CryptoError> {
        Ok(JournalEntry {
            id: row.id,
            title: field_cipher::decrypt_field(&row.title, &self.key)?,
            content: field_cipher::decrypt_field(&row.content, &self.key)?,
            timestamp: row.timestamp,
        })
    }
}

/// Per-record isolation: a record-scoped failure becomes an unreadable listing,
/// anything else fails the whole listing.
fn listed_entry(
    row: &JournalRow,
    decrypted: Result<JournalEntry, CryptoError>,
) -> Result<ListedEntry, CryptoError> {
    match decrypted {
        Ok(entry) => Ok(ListedEntry::Readable(entry)),
        Err(err) if err.is_recoverable() => {
            warn!(id = row.id, error = %err, "journal entry could not be decrypted");
            Ok(ListedEntry::Unreadable {
                id: row.id,
                timestamp: row.timestamp,
                reason: err.to_string(),
            })
        }
        Err(err) => Err(err),
    }
}

#[async_trait]
impl<S: JournalStore> JournalRepository for EncryptedJournalRepo<S> {
    async fn list(&self) -> Result<Vec<ListedEntry>> {
        Ok(self.list_entries().await?)
    }

    async fn get(&self, id: EntryId) -> Result<Option<JournalEntry>> {
        Ok(self.get_entry(id).await?)
    }

    async fn insert(&self, title: String, content: String) -> Result<JournalEntry> {
        Ok(self.insert_entry(title, content).await?)
    }

    async fn update(&self, id: EntryId, title: String, content: String) -> Result<JournalEntry> {
        Ok(self.update_entry(id, title, content).await?)
    }

    async fn delete(&self, id: EntryId) -> Result<()> {
        Ok(self.delete_entry(id).await?)
    }
}
