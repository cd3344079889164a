//! Core abstractions for NousGuard: field encryption contracts, journal records,
//! and the persistence collaborator the journal is stored through.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod crypto;
pub mod journal;
pub mod storage;
