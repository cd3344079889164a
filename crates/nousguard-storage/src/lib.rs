//! Concrete encryption and storage implementations.
//! AES-256-CBC field encryption with a key sourced from the OS keyring (or test doubles),
//! plus a file-backed row store for the encrypted journal.

pub mod field_cipher;
pub mod file_journal_store;
pub mod key_provider;
