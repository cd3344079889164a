//! Persistence collaborator for encrypted journal rows.

mod journal_store;

pub use journal_store::{sort_newest_first, InMemoryJournalStore, JournalStore, JournalStoreError};
