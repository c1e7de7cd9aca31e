//! Persistence layer — user progress and the points ledger.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{EntryKind, LedgerEntry, LedgerFilter, Repository, User};
