#![deny(missing_docs)]
#![deny(unsafe_code)]

//! Blob holder types.
//!
//! A "holder" is a token registered against a blob in the blob service. While
//! at least one holder exists the blob service keeps the blob alive. This crate
//! contains the local view of those holders:
//!
//! - [`HolderStatus`]: the two-phase state machine of a single holder.
//! - [`StoredHolders`]: the immutable `blob_hash -> holder` map.
//! - [`HolderStoreOperation`]: the only way to change a [`StoredHolders`].
//! - [`HolderAction`]: the lifecycle events of a `process_holders` run, and the
//!   reducer that turns them into store operations.

pub mod action;
pub mod error;
pub mod ops;
pub mod record;
pub mod status;
pub mod store;
pub mod token;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub mod prelude;

pub use action::*;
pub use error::*;
pub use ops::*;
pub use record::*;
pub use status::*;
pub use store::*;
pub use token::*;
