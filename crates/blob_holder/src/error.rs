//! Errors of the holder service

#![allow(missing_docs)]

use blob_holder_sqlite::DatabaseError;
use blob_holder_types::{HolderError, ProcessHoldersResult};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from talking to the blob service.
#[derive(Error, Debug)]
pub enum BlobServiceError {
    /// Transport failure, the request may or may not have been processed.
    #[error("HTTP client error: {0}")]
    ClientError(#[from] reqwest::Error),

    #[error("Invalid blob service URL: {0}")]
    UrlError(#[from] url::ParseError),

    /// Blob or holder not found
    #[error("Blob or holder not found")]
    NotFound,

    /// Blob or holder already exists
    #[error("Blob or holder already exists")]
    AlreadyExists,

    /// Invalid holder or blob hash format
    #[error("Invalid holder or blob hash")]
    InvalidArguments,

    #[error("Blob service internal error")]
    ServerError,

    #[error("Unexpected HTTP status: {0}")]
    UnexpectedHttpStatus(u16),

    /// The call did not resolve in time. It is treated exactly like a failure.
    #[error("Blob service call timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

pub type BlobServiceResult<T> = Result<T, BlobServiceError>;

/// Errors from a [`ResourceStore`](crate::sweeper::ResourceStore).
#[derive(Error, Debug)]
pub enum ResourceStoreError {
    #[error("No resource with id {0}")]
    UnknownResource(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ResourceStoreResult<T> = Result<T, ResourceStoreError>;

/// Errors which abort a whole `process_holders` invocation.
///
/// Individual item failures are never errors, they are classified in the
/// result instead.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid holders input: {0}")]
    InvalidInput(#[from] HolderError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Every remote call resolved, but the outcome could not be written.
    /// The holders stay pending until the store is loaded again.
    #[error("Processed holders but could not record the outcome: {source}")]
    Unrecorded {
        result: ProcessHoldersResult,
        source: DatabaseError,
    },
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors which abort reconciling one resource.
#[derive(Error, Debug)]
pub enum SweepError {
    #[error(transparent)]
    BlobService(#[from] BlobServiceError),

    #[error(transparent)]
    ResourceStore(#[from] ResourceStoreError),

    #[error("Resource {resource_id} has an unusable content hash: {source}")]
    InvalidResource {
        resource_id: String,
        source: HolderError,
    },
}

pub type SweepResult<T> = Result<T, SweepError>;

/// Errors loading the service configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Config file is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid blob service URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Blob service URL cannot be used as a base: {0}")]
    NotABaseUrl(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
