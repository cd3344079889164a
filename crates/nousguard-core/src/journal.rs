use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedField;

/// Placeholder shown in place of a title that could not be decrypted.
pub const UNREADABLE_TITLE: &str = "Decryption Failed!";
/// Placeholder shown in place of content that could not be decrypted.
pub const UNREADABLE_CONTENT: &str = "Error: Cannot decrypt content.";

pub type EntryId = i64;

/// A journal row as persisted: both fields encrypted, metadata in the clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRow {
    pub id: EntryId,
    pub title: EncryptedField,
    pub content: EncryptedField,
    pub timestamp: DateTime<Utc>,
}

/// A row that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJournalRow {
    pub title: EncryptedField,
    pub content: EncryptedField,
    pub timestamp: DateTime<Utc>,
}

impl NewJournalRow {
    pub fn into_row(self, id: EntryId) -> JournalRow {
        JournalRow {
            id,
            title: self.title,
            content: self.content,
            timestamp: self.timestamp,
        }
    }
}

/// Decrypted journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub id: EntryId,
    pub title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One item of a bulk listing. A row that fails to decrypt is reported in place
/// rather than aborting the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListedEntry {
    Readable(JournalEntry),
    Unreadable {
        id: EntryId,
        timestamp: DateTime<Utc>,
        reason: String,
    },
}

impl ListedEntry {
    pub fn id(&self) -> EntryId {
        match self {
            ListedEntry::Readable(entry) => entry.id,
            ListedEntry::Unreadable { id, .. } => *id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ListedEntry::Readable(entry) => entry.timestamp,
            ListedEntry::Unreadable { timestamp, .. } => *timestamp,
        }
    }

    /// Title for display, falling back to the placeholder.
    pub fn title(&self) -> &str {
        match self {
            ListedEntry::Readable(entry) => &entry.title,
            ListedEntry::Unreadable { .. } => UNREADABLE_TITLE,
        }
    }

    /// Content for display, falling back to the placeholder.
    pub fn content(&self) -> &str {
        match self {
            ListedEntry::Readable(entry) => &entry.content,
            ListedEntry::Unreadable { .. } => UNREADABLE_CONTENT,
        }
    }

    pub fn is_readable(&self) -> bool {
        matches!(self, ListedEntry::Readable(_))
    }
}

/// Repository contract for the encrypted journal.
#[async_trait]
pub trait JournalRepository: Send + Sync {
    /// Newest first. Rows that fail to decrypt are listed as unreadable.
    async fn list(&self) -> anyhow::Result<Vec<ListedEntry>>;
    async fn get(&self, id: EntryId) -> anyhow::Result<Option<JournalEntry>>;
    async fn insert(&self, title: String, content: String) -> anyhow::Result<JournalEntry>;
    /// Re-encrypts both fields with fresh IVs and bumps the timestamp.
    async fn update(
        &self,
        id: EntryId,
        title: String,
        content: String,
    ) -> anyhow::Result<JournalEntry>;
    async fn delete(&self, id: EntryId) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_entries_display_placeholders() {
        let now = Utc::now();
        let listed = ListedEntry::Unreadable {
            id: 7,
            timestamp: now,
            reason: "bad padding".into(),
        };
        assert_eq!(listed.id(), 7);
        assert_eq!(listed.timestamp(), now);
        assert_eq!(listed.title(), UNREADABLE_TITLE);
        assert_eq!(listed.content(), UNREADABLE_CONTENT);
        assert!(!listed.is_readable());
    }

    #[test]
    fn new_row_takes_assigned_id() {
        let now = Utc::now();
        let row = NewJournalRow {
            title: EncryptedField::new("dA==", "aXY="),
            content: EncryptedField::new("Yw==", "aXY="),
            timestamp: now,
        }
        .into_row(42);
        assert_eq!(row.id, 42);
        assert_eq!(row.timestamp, now);
    }
}
