//! Periodic reconciliation of durable resources with the blob service.
//!
//! Some resources (invite links, backups, ...) must always keep their blob
//! alive through a holder of their own. A sweep checks each one and, where the
//! holder is missing or the blob is gone, registers a fresh holder. The new
//! token is persisted on the resource only after the blob service confirmed
//! it, so a sweep can be aborted at any point without leaving a resource
//! pointing at a holder which does not exist.

use crate::blob_service::{with_timeout, BlobExistence, BlobService};
use crate::config::HolderServiceConfig;
use crate::error::{ResourceStoreResult, SweepError, SweepResult};
use blob_holder_types::{generate_blob_holder, validate_blob_hash};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::instrument;

/// A durable resource which must keep its blob alive.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HeldResource {
    /// Id of the resource in its own store
    pub resource_id: String,
    /// Hash of the blob the resource refers to
    pub content_hash: String,
    /// The holder token recorded on the resource, if any
    pub holder: Option<String>,
}

/// The store which owns the durable resources.
#[cfg_attr(any(test, feature = "test_utils"), mockall::automock)]
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Every resource whose blob must be kept alive
    async fn list_resources_needing_holder(&self) -> ResourceStoreResult<Vec<HeldResource>>;

    /// Record a confirmed holder token on a resource.
    async fn persist_holder_token(&self, resource_id: &str, holder: &str)
        -> ResourceStoreResult<()>;
}

/// What reconciling one resource did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The recorded holder's blob is still there
    Healthy,
    /// A new holder was established and persisted
    Repaired {
        /// The new holder token
        holder: String,
    },
}

/// Counts from one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    /// Resources looked at
    pub checked: usize,
    /// Resources which needed nothing
    pub healthy: usize,
    /// Resources which got a new holder
    pub repaired: usize,
    /// Resources which could not be reconciled this time
    pub failed: usize,
}

/// Reconciles resources against the blob service.
#[derive(Clone)]
pub struct Sweeper {
    blob_service: Arc<dyn BlobService>,
    resources: Arc<dyn ResourceStore>,
    item_timeout: Duration,
    holder_prefix: Option<String>,
}

impl Sweeper {
    /// Constructor
    pub fn new(
        blob_service: Arc<dyn BlobService>,
        resources: Arc<dyn ResourceStore>,
        item_timeout: Duration,
        holder_prefix: Option<String>,
    ) -> Self {
        Self {
            blob_service,
            resources,
            item_timeout,
            holder_prefix,
        }
    }

    /// Constructor taking timeout and holder prefix from the config
    pub fn from_config(
        config: &HolderServiceConfig,
        blob_service: Arc<dyn BlobService>,
        resources: Arc<dyn ResourceStore>,
    ) -> Self {
        Self::new(
            blob_service,
            resources,
            config.item_timeout(),
            config.holder_prefix.clone(),
        )
    }

    /// Reconcile every resource, concurrently.
    ///
    /// A resource which fails is logged and counted, it never stops the sweep.
    /// Only failing to list the resources is an error.
    #[instrument(skip_all)]
    pub async fn sweep(&self) -> SweepResult<SweepReport> {
        let resources = self.resources.list_resources_needing_holder().await?;
        let outcomes = join_all(
            resources
                .iter()
                .map(|resource| async move { (resource, self.reconcile(resource).await) }),
        )
        .await;

        let mut report = SweepReport {
            checked: resources.len(),
            ..Default::default()
        };
        for (resource, outcome) in outcomes {
            match outcome {
                Ok(ReconcileOutcome::Healthy) => report.healthy += 1,
                Ok(ReconcileOutcome::Repaired { holder }) => {
                    tracing::debug!(resource_id = %resource.resource_id, %holder, "repaired resource holder");
                    report.repaired += 1;
                }
                Err(e) => {
                    tracing::warn!(resource_id = %resource.resource_id, ?e, "failed to reconcile resource");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(?report, "sweep complete");
        Ok(report)
    }

    /// Make sure one resource has a live holder.
    ///
    /// The resource store is written only after the blob service confirmed
    /// the new holder. A holder which cannot be recorded is released again.
    pub async fn reconcile(&self, resource: &HeldResource) -> SweepResult<ReconcileOutcome> {
        let blob_hash = resource.content_hash.as_str();
        validate_blob_hash(blob_hash).map_err(|source| SweepError::InvalidResource {
            resource_id: resource.resource_id.clone(),
            source,
        })?;

        if let Some(holder) = &resource.holder {
            match with_timeout(self.item_timeout, self.blob_service.blob_exists(blob_hash)).await? {
                BlobExistence::Found => return Ok(ReconcileOutcome::Healthy),
                BlobExistence::NotFound => {
                    tracing::warn!(resource_id = %resource.resource_id, %blob_hash, %holder, "blob missing, establishing a new holder");
                }
            }
        }

        let holder = generate_blob_holder(self.holder_prefix.as_deref());
        with_timeout(
            self.item_timeout,
            self.blob_service.establish_holder(blob_hash, &holder),
        )
        .await?;
        if let Err(e) = self
            .resources
            .persist_holder_token(&resource.resource_id, &holder)
            .await
        {
            // Nothing refers to the new holder, release it again.
            if let Err(remove_err) = with_timeout(
                self.item_timeout,
                self.blob_service.remove_holder(blob_hash, &holder),
            )
            .await
            {
                tracing::warn!(resource_id = %resource.resource_id, %blob_hash, %holder, ?remove_err, "failed to release unrecorded holder");
            }
            return Err(e.into());
        }
        Ok(ReconcileOutcome::Repaired { holder })
    }
}

/// Asks a running sweeper to sweep now, without waiting for the interval.
///
/// Triggering again before the sweeper picked up the last trigger has no
/// further effect.
#[derive(Clone, Debug)]
pub struct SweepTrigger(mpsc::Sender<()>);

impl SweepTrigger {
    /// Request a sweep
    pub fn trigger(&self) {
        if let Err(mpsc::error::TrySendError::Closed(_)) = self.0.try_send(()) {
            tracing::debug!("sweeper is gone, trigger ignored");
        }
    }
}

/// Controls a sweeper spawned with [`spawn_sweeper`].
///
/// Dropping the handle stops the sweeper as well.
#[derive(Debug)]
pub struct SweeperHandle {
    trigger: SweepTrigger,
    reports: watch::Receiver<Option<SweepReport>>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// A trigger which can be handed out
    pub fn trigger(&self) -> SweepTrigger {
        self.trigger.clone()
    }

    /// Watch the report of the latest completed sweep.
    pub fn reports(&self) -> watch::Receiver<Option<SweepReport>> {
        self.reports.clone()
    }

    /// Stop the sweeper, abandoning a sweep in progress, and wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(?e, "sweeper task did not stop cleanly");
        }
    }
}

/// Run `sweeper` once right away and then every `interval`, until shut down.
pub fn spawn_sweeper(sweeper: Sweeper, interval: Duration) -> SweeperHandle {
    let (trigger_tx, mut trigger_rx) = mpsc::channel(1);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let (report_tx, report_rx) = watch::channel(None);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => (),
                Some(()) = trigger_rx.recv() => ticker.reset(),
            }
            tokio::select! {
                _ = &mut shutdown_rx => break,
                r = sweeper.sweep() => match r {
                    Ok(report) => {
                        report_tx.send_replace(Some(report));
                    }
                    Err(e) => tracing::error!(?e, "sweep failed"),
                },
            }
        }
        tracing::info!("sweeper stopped");
    });

    SweeperHandle {
        trigger: SweepTrigger(trigger_tx),
        reports: report_rx,
        shutdown: shutdown_tx,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_service::MockBlobService;
    use crate::error::{BlobServiceError, ResourceStoreError};
    use pretty_assertions::assert_eq;

    fn resource(id: &str, hash: &str, holder: Option<&str>) -> HeldResource {
        HeldResource {
            resource_id: id.to_string(),
            content_hash: hash.to_string(),
            holder: holder.map(str::to_string),
        }
    }

    fn sweeper(service: MockBlobService, store: MockResourceStore) -> Sweeper {
        Sweeper::new(
            Arc::new(service),
            Arc::new(store),
            Duration::from_secs(5),
            Some("keyserver".into()),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn healthy_resource_is_left_alone() {
        let mut service = MockBlobService::new();
        service
            .expect_blob_exists()
            .times(1)
            .returning(|_| Ok(BlobExistence::Found));
        service.expect_establish_holder().never();
        let mut store = MockResourceStore::new();
        store.expect_persist_holder_token().never();

        let outcome = sweeper(service, store)
            .reconcile(&resource("r1", "a", Some("h1")))
            .await
            .unwrap();
        assert_eq!(ReconcileOutcome::Healthy, outcome);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn new_holder_is_persisted_after_confirmation() {
        let mut service = MockBlobService::new();
        service.expect_blob_exists().never();
        service
            .expect_establish_holder()
            .withf(|hash: &str, holder: &str| hash == "a" && holder.starts_with("keyserver:"))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut store = MockResourceStore::new();
        store
            .expect_persist_holder_token()
            .withf(|id: &str, holder: &str| id == "r1" && holder.starts_with("keyserver:"))
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = sweeper(service, store)
            .reconcile(&resource("r1", "a", None))
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Repaired { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_establish_persists_nothing() {
        let mut service = MockBlobService::new();
        service
            .expect_blob_exists()
            .times(1)
            .returning(|_| Ok(BlobExistence::NotFound));
        service
            .expect_establish_holder()
            .times(1)
            .returning(|_, _| Err(BlobServiceError::ServerError));
        let mut store = MockResourceStore::new();
        store.expect_persist_holder_token().never();

        let err = sweeper(service, store)
            .reconcile(&resource("r1", "a", Some("h1")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SweepError::BlobService(BlobServiceError::ServerError)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn holder_is_released_when_it_cannot_be_recorded() {
        let mut service = MockBlobService::new();
        service
            .expect_establish_holder()
            .times(1)
            .returning(|_, _| Ok(()));
        service
            .expect_remove_holder()
            .withf(|hash: &str, holder: &str| hash == "a" && holder.starts_with("keyserver:"))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut store = MockResourceStore::new();
        store
            .expect_persist_holder_token()
            .times(1)
            .returning(|id, _| Err(ResourceStoreError::UnknownResource(id.to_string())));

        let err = sweeper(service, store)
            .reconcile(&resource("r1", "a", None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SweepError::ResourceStore(ResourceStoreError::UnknownResource(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_release_keeps_the_store_error() {
        let mut service = MockBlobService::new();
        service
            .expect_establish_holder()
            .times(1)
            .returning(|_, _| Ok(()));
        service
            .expect_remove_holder()
            .times(1)
            .returning(|_, _| Err(BlobServiceError::ServerError));
        let mut store = MockResourceStore::new();
        store
            .expect_persist_holder_token()
            .times(1)
            .returning(|id, _| Err(ResourceStoreError::UnknownResource(id.to_string())));

        let err = sweeper(service, store)
            .reconcile(&resource("r1", "a", None))
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::ResourceStore(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bad_hash_is_refused_before_any_call() {
        let mut service = MockBlobService::new();
        service.expect_blob_exists().never();
        service.expect_establish_holder().never();
        let mut store = MockResourceStore::new();
        store.expect_persist_holder_token().never();

        let err = sweeper(service, store)
            .reconcile(&resource("r1", "", None))
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::InvalidResource { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn trigger_without_sweeper_is_ignored() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        SweepTrigger(tx).trigger();
    }
}
