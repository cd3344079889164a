use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use nousguard_core::{
    journal::{EntryId, JournalRow, NewJournalRow},
    storage::{sort_newest_first, JournalStore, JournalStoreError},
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

const JOURNAL_FILE: &str = "journal.json";

/// File-backed journal row store. Rows hold already-encrypted fields and are written
/// verbatim as JSON; each write replaces the file atomically.
pub struct FileJournalStore {
    root: PathBuf,
    // Serializes read-modify-write cycles within the process.
    write_lock: Mutex<()>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalFile {
    next_id: EntryId,
    rows: Vec<JournalRow>,
}

impl FileJournalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILE)
    }
}

#[async_trait]
impl JournalStore for FileJournalStore {
    #[instrument(skip_all)]
    async fn insert(&self, row: NewJournalRow) -> Result<EntryId, JournalStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut file = read_journal(&self.path())?;
        file.next_id += 1;
        let id = file.next_id;
        file.rows.push(row.into_row(id));
        write_journal(&self.path(), &file)?;
        debug!(id, "journal row inserted");
        Ok(id)
    }

    #[instrument(skip_all, fields(id = row.id))]
    async fn update(&self, row: JournalRow) -> Result<(), JournalStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut file = read_journal(&self.path())?;
        let existing = file
            .rows
            .iter_mut()
            .find(|r| r.id == row.id)
            .ok_or(JournalStoreError::NotFound { id: row.id })?;
        *existing = row;
        write_journal(&self.path(), &file)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: EntryId) -> Result<(), JournalStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut file = read_journal(&self.path())?;
        let before = file.rows.len();
        file.rows.retain(|r| r.id != id);
        if file.rows.len() == before {
            return Ok(());
        }
        write_journal(&self.path(), &file)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: EntryId) -> Result<Option<JournalRow>, JournalStoreError> {
        let file = read_journal(&self.path())?;
        Ok(file.rows.into_iter().find(|r| r.id == id))
    }

    #[instrument(skip_all)]
    async fn list(&self) -> Result<Vec<JournalRow>, JournalStoreError> {
        let mut rows = read_journal(&self.path())?.rows;
        sort_newest_first(&mut rows);
        Ok(rows)
    }
}

fn write_journal(path: &Path, journal: &JournalFile) -> Result<(), JournalStoreError> {
    let parent = path.parent().ok_or_else(|| JournalStoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    let json = serde_json::to_vec_pretty(journal).map_err(storage_err)?;
    tmp.write_all(&json).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn read_journal(path: &Path) -> Result<JournalFile, JournalStoreError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(JournalFile::default())
        }
        Err(err) => return Err(storage_err(err)),
    };

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(storage_err)?;
    if buf.iter().all(u8::is_ascii_whitespace) {
        return Ok(JournalFile::default());
    }
    serde_json::from_slice(&buf).map_err(storage_err)
}

fn storage_err<E: ToString>(err: E) -> JournalStoreError {
    JournalStoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use nousguard_core::crypto::EncryptedField;

    use super::*;
    use crate::{field_cipher, key_provider::KeyHandle};

    fn encrypted_row(title: &str, key: &KeyHandle, minutes_ago: i64) -> NewJournalRow {
        NewJournalRow {
            title: field_cipher::encrypt(title, key).expect("encrypt title"),
            content: field_cipher::encrypt("body", key).expect("encrypt content"),
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn rows_persist_across_instances_without_plaintext() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = KeyHandle::from_bytes("test", [3; 32]);

        let store = FileJournalStore::new(dir.path());
        let id = store
            .insert(encrypted_row("dear diary", &key, 0))
            .await
            .expect("insert");

        let reopened = FileJournalStore::new(dir.path());
        let row = reopened.get(id).await.expect("get").expect("row exists");
        assert_eq!(
            field_cipher::decrypt_field(&row.title, &key).expect("decrypt"),
            "dear diary"
        );

        let on_disk = fs::read_to_string(store.path()).expect("read journal file");
        assert!(
            !on_disk.contains("dear diary"),
            "plaintext must not be stored"
        );
    }

    #[tokio::test]
    async fn missing_file_lists_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileJournalStore::new(dir.path().join("nested"));
        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_update_replaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = KeyHandle::from_bytes("test", [4; 32]);
        let store = FileJournalStore::new(dir.path());

        let old = store.insert(encrypted_row("old", &key, 30)).await.unwrap();
        let new = store.insert(encrypted_row("new", &key, 1)).await.unwrap();
        let ids: Vec<EntryId> = store.list().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![new, old]);

        let mut row = store.get(old).await.unwrap().unwrap();
        row.title = EncryptedField::new("Y2hhbmdlZA==", row.title.iv.clone());
        store.update(row.clone()).await.expect("update");
        assert_eq!(store.get(old).await.unwrap(), Some(row));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = KeyHandle::from_bytes("test", [5; 32]);
        let store = FileJournalStore::new(dir.path());
        let id = store.insert(encrypted_row("t", &key, 0)).await.unwrap();

        store.delete(id).await.expect("delete");
        store.delete(id).await.expect("delete again");
        assert_eq!(store.get(id).await.expect("get"), None);
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = KeyHandle::from_bytes("test", [6; 32]);
        let store = FileJournalStore::new(dir.path());
        let row = encrypted_row("t", &key, 0).into_row(12);

        let err = store.update(row).await.expect_err("should be missing");
        assert_eq!(err, JournalStoreError::NotFound { id: 12 });
    }
}
