//! Error types for the persistence layer.
//!
//! # Design
//! Callers only ever need two distinctions: "the store is gone for good"
//! (`ShutDown`) versus "this particular statement failed" (everything else).
//! The `Display` text of `Sqlite` is the driver's own message, because the
//! HTTP layer forwards it verbatim in 500 responses.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by `Store` and `Session` operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The SQLite driver reported an error (open, statement, or commit).
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `Store::shutdown` has been called; no new sessions are handed out.
    #[error("store has been shut down")]
    ShutDown,

    /// A row written in a committed transaction was missing on reload.
    #[error("todo {id} vanished after commit")]
    Vanished { id: i64 },
}
