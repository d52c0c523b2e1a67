//! Runs batches of establish and remove requests against the blob service.

use crate::blob_service::{with_timeout, BlobService};
use crate::config::HolderServiceConfig;
use crate::error::{BlobServiceResult, OrchestratorError, OrchestratorResult};
use crate::store_handle::HolderStoreHandle;
use blob_holder_types::prelude::*;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Drives `process_holders` runs.
#[derive(Clone)]
pub struct HolderOrchestrator {
    store: HolderStoreHandle,
    blob_service: Arc<dyn BlobService>,
    item_timeout: Duration,
}

impl HolderOrchestrator {
    /// Constructor
    pub fn new(
        store: HolderStoreHandle,
        blob_service: Arc<dyn BlobService>,
        item_timeout: Duration,
    ) -> Self {
        Self {
            store,
            blob_service,
            item_timeout,
        }
    }

    /// Constructor taking the timeout from the config
    pub fn from_config(
        config: &HolderServiceConfig,
        store: HolderStoreHandle,
        blob_service: Arc<dyn BlobService>,
    ) -> Self {
        Self::new(store, blob_service, config.item_timeout())
    }

    /// The store this orchestrator records outcomes in
    pub fn store(&self) -> &HolderStoreHandle {
        &self.store
    }

    /// Establish and remove holders.
    ///
    /// Every requested holder is stamped pending, then every remote call is
    /// issued at once. Each call resolves on its own: one failing or timing out
    /// only moves that item into `not_added` / `not_removed`. Nothing is
    /// retried here; failed items keep a retry-eligible status.
    ///
    /// Only invalid input or a failure to persist the store is an error. If
    /// the outcome itself cannot be persisted the classification is handed
    /// back in [`OrchestratorError::Unrecorded`].
    #[instrument(skip_all, fields(add = input.holders_to_add.len(), remove = input.holders_to_remove.len()))]
    pub async fn process_holders(
        &self,
        input: ProcessHoldersInput,
    ) -> OrchestratorResult<ProcessHoldersResult> {
        if let Err(e) = input.validate() {
            self.store.dispatch(&HolderAction::ProcessHoldersFailed {
                error: e.to_string(),
            })?;
            return Err(OrchestratorError::InvalidInput(e));
        }
        if input.is_empty() {
            return Ok(ProcessHoldersResult::default());
        }

        self.store
            .dispatch(&HolderAction::ProcessHoldersStarted(input.clone()))?;

        let ProcessHoldersInput {
            holders_to_add,
            holders_to_remove,
        } = input;

        let adds = join_all(holders_to_add.into_iter().map(|item| async move {
            let r = self
                .bounded(self.blob_service.establish_holder(&item.blob_hash, &item.holder))
                .await;
            (item, r)
        }));
        let removes = join_all(holders_to_remove.into_iter().map(|item| async move {
            let r = self
                .bounded(self.blob_service.remove_holder(&item.blob_hash, &item.holder))
                .await;
            (item, r)
        }));
        let (adds, removes) = futures::future::join(adds, removes).await;

        let mut result = ProcessHoldersResult::default();
        for (item, r) in adds {
            match r {
                Ok(()) => result.added.push(item),
                Err(e) => {
                    tracing::warn!(holder = %item, ?e, "failed to establish holder");
                    result.not_added.push(item);
                }
            }
        }
        for (item, r) in removes {
            match r {
                Ok(()) => result.removed.push(item),
                Err(e) => {
                    tracing::warn!(holder = %item, ?e, "failed to remove holder");
                    result.not_removed.push(item);
                }
            }
        }

        if let Err(source) = self
            .store
            .dispatch(&HolderAction::ProcessHoldersSuccess(result.clone()))
        {
            tracing::error!(?source, "failed to record processed holders");
            return Err(OrchestratorError::Unrecorded { result, source });
        }

        tracing::info!(
            added = result.added.len(),
            not_added = result.not_added.len(),
            removed = result.removed.len(),
            not_removed = result.not_removed.len(),
            "processed holders"
        );
        Ok(result)
    }

    /// Run `process_holders` over every holder whose last remote call failed.
    pub async fn retry_failed(&self) -> OrchestratorResult<ProcessHoldersResult> {
        let input = retry_failed_holders(&self.store.snapshot());
        if input.is_empty() {
            tracing::debug!("no holders to retry");
            return Ok(ProcessHoldersResult::default());
        }
        self.process_holders(input).await
    }

    async fn bounded(
        &self,
        call: impl std::future::Future<Output = BlobServiceResult<()>>,
    ) -> BlobServiceResult<()> {
        with_timeout(self.item_timeout, call).await
    }
}
