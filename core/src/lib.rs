//! Persistence core for the todo service.
//!
//! # Overview
//! Defines the `Todo` entity and its wire shape, the lenient request payload
//! that handlers coerce into inserts and patches, and the SQLite-backed
//! `Store` that hands out one `Session` per request.
//!
//! # Design
//! - No HTTP types live here; the server crate maps results to responses.
//! - `Store` carries no connection between requests. A `Session` owns its
//!   connection and closes it on drop.
//! - All SQLite calls are blocking; async callers run sessions on a blocking
//!   thread.

pub mod error;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::{Session, Store, StoreConfig, UnitOfWork, DEFAULT_BUSY_TIMEOUT};
pub use types::{is_truthy, NewTodo, PayloadError, Title, Todo, TodoPatch, TodoPayload};
