//! Keeps blob holders registered with the blob service in step with what the
//! local store expects.
//!
//! - [`orchestrator::HolderOrchestrator`] fans a batch of establish and remove
//!   requests out to the [`blob_service::BlobService`] and records the
//!   per-item outcome in the [`store_handle::HolderStoreHandle`].
//! - [`sweeper`] periodically makes sure every durable resource which must
//!   keep its blob alive really has a live holder, persisting a new holder
//!   token only after the blob service confirmed it.
//! - [`cache`] is the contract for consumer caches which must drop whatever
//!   they hold under a holder once that holder is no longer alive.

pub mod blob_service;
pub mod cache;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod store_handle;
pub mod sweeper;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub mod prelude {
    //! Common imports
    pub use crate::blob_service::*;
    pub use crate::cache::*;
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::orchestrator::*;
    pub use crate::store_handle::*;
    pub use crate::sweeper::*;
    pub use blob_holder_types::prelude::*;
}
