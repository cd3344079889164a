use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

use crate::journal::{EntryId, JournalRow, NewJournalRow};

/// Errors produced by journal row stores.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JournalStoreError {
    /// Requested row does not exist.
    #[error("journal entry not found: {id}")]
    NotFound { id: EntryId },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Row store for encrypted journal entries. Rows are stored and returned verbatim;
/// implementations never look inside the encrypted fields.
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Persist a new row and return its assigned id.
    async fn insert(&self, row: NewJournalRow) -> Result<EntryId, JournalStoreError>;

    /// Replace an existing row. Fails with `NotFound` if the id is unknown.
    async fn update(&self, row: JournalRow) -> Result<(), JournalStoreError>;

    /// Remove a row (idempotent).
    async fn delete(&self, id: EntryId) -> Result<(), JournalStoreError>;

    async fn get(&self, id: EntryId) -> Result<Option<JournalRow>, JournalStoreError>;

    /// All rows, newest first.
    async fn list(&self) -> Result<Vec<JournalRow>, JournalStoreError>;
}

/// Orders rows newest first; ties broken by descending id.
pub fn sort_newest_first(rows: &mut [JournalRow]) {
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}

#[derive(Debug, Default)]
struct Table {
    next_id: EntryId,
    rows: BTreeMap<EntryId, JournalRow>,
}

/// In-memory row store for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryJournalStore {
    inner: Arc<Mutex<Table>>,
}

impl InMemoryJournalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored row without any checks. Used to simulate corruption.
    pub fn replace_raw(&self, row: JournalRow) -> Result<(), JournalStoreError> {
        let mut table = self.lock()?;
        table.rows.insert(row.id, row);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Table>, JournalStoreError> {
        self.inner.lock().map_err(|err| JournalStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl JournalStore for InMemoryJournalStore {
    async fn insert(&self, row: NewJournalRow) -> Result<EntryId, JournalStoreError> {
        let mut table = self.lock()?;
        table.next_id += 1;
        let id = table.next_id;
        table.rows.insert(id, row.into_row(id));
        Ok(id)
    }

    async fn update(&self, row: JournalRow) -> Result<(), JournalStoreError> {
        let mut table = self.lock()?;
        match table.rows.get_mut(&row.id) {
            Some(existing) => {
                *existing = row;
                Ok(())
            }
            None => Err(JournalStoreError::NotFound { id: row.id }),
        }
    }

    async fn delete(&self, id: EntryId) -> Result<(), JournalStoreError> {
        let mut table = self.lock()?;
        table.rows.remove(&id);
        Ok(())
    }

    async fn get(&self, id: EntryId) -> Result<Option<JournalRow>, JournalStoreError> {
        let table = self.lock()?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<JournalRow>, JournalStoreError> {
        let table = self.lock()?;
        let mut rows: Vec<JournalRow> = table.rows.values().cloned().collect();
        sort_newest_first(&mut rows);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::crypto::EncryptedField;

    fn new_row(minutes_ago: i64) -> NewJournalRow {
        NewJournalRow {
            title: EncryptedField::new("dGl0bGU=", "aXYtdGl0bGU="),
            content: EncryptedField::new("Ym9keQ==", "aXYtYm9keQ=="),
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let store = InMemoryJournalStore::new();
        let first = store.insert(new_row(0)).await.expect("insert");
        let second = store.insert(new_row(0)).await.expect("insert");
        assert!(second > first);
        assert!(store.get(first).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = InMemoryJournalStore::new();
        let old = store.insert(new_row(10)).await.expect("insert");
        let new = store.insert(new_row(1)).await.expect("insert");

        let ids: Vec<EntryId> = store
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(ids, vec![new, old]);
    }

    #[tokio::test]
    async fn update_unknown_row_is_not_found() {
        let store = InMemoryJournalStore::new();
        let row = new_row(0).into_row(99);
        let err = store.update(row).await.expect_err("should be missing");
        assert_eq!(err, JournalStoreError::NotFound { id: 99 });
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_removes_data() {
        let store = InMemoryJournalStore::new();
        let id = store.insert(new_row(0)).await.expect("insert");
        store.delete(id).await.expect("delete should succeed");
        store
            .delete(id)
            .await
            .expect("delete again should still succeed");

        assert_eq!(store.get(id).await.expect("get"), None);
    }
}
