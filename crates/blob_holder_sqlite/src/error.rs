//! All possible errors when working with the holders database

// missing_docs allowed here since the errors already have self-descriptive strings
#![allow(missing_docs)]

use blob_holder_types::HolderError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Persisted holders are corrupt: {0}")]
    Corrupt(#[from] HolderError),

    #[error("Unable to create database directory {0}: {1}")]
    DirectoryError(PathBuf, std::io::Error),

    #[error("Database {name} is at schema version {found}, but only {known} migrations are known")]
    UnknownSchemaVersion {
        name: String,
        found: usize,
        known: usize,
    },
}

impl PartialEq for DatabaseError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
