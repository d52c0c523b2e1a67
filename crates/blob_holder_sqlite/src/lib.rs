//! SQLite persistence for the blob holder store.
//!
//! The in-memory [`StoredHolders`](blob_holder_types::StoredHolders) is
//! mirrored by a single `holders` table. Every batch of
//! [`ClientDBHolderStoreOperation`](blob_holder_types::ClientDBHolderStoreOperation)s
//! is applied in one transaction, so a crash can never leave half a batch on
//! disk.

pub mod db;
pub mod error;
pub mod schema;
mod sql;

pub mod prelude {
    //! Common imports
    pub use crate::db::*;
    pub use crate::error::*;
}

pub use db::HolderDb;
pub use error::{DatabaseError, DatabaseResult};
