//! `blob-holders`: inspect the local holder store and drive the blob service.

use anyhow::Context;
use blob_holder::prelude::*;
use blob_holder_sqlite::HolderDb;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// Inspect and drive the local blob holder store
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct BlobHolders {
    /// YAML config file. Defaults are used when not given.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output: Log, Compact, Json or None
    #[arg(long, global = true, default_value = "Log")]
    pub structured: blob_holder_trace::Output,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the persisted holders as JSON
    Dump {
        /// Only holders with this status, e.g. NOT_ESTABLISHED
        #[arg(long)]
        status: Option<HolderStatus>,
    },
    /// Establish a holder for a blob
    Establish {
        /// The blob hash
        hash: String,
        /// Holder token to use. A fresh one is generated if not given.
        #[arg(long)]
        holder: Option<String>,
    },
    /// Remove the stored holder of a blob
    Remove {
        /// The blob hash
        hash: String,
    },
    /// Retry every holder whose last establish or remove failed
    Retry,
}

impl BlobHolders {
    /// Run the command, returning what should be printed.
    pub async fn run(self) -> anyhow::Result<serde_json::Value> {
        let config = match &self.config {
            Some(path) => HolderServiceConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => HolderServiceConfig::default(),
        };
        let db = match &config.database_path {
            Some(path) => HolderDb::open(path)?,
            None => {
                tracing::warn!("no database_path configured, using an empty in-memory store");
                HolderDb::open_in_memory()?
            }
        };

        match self.command {
            Command::Dump { status } => dump(&db, status),
            command => {
                let orchestrator = HolderOrchestrator::from_config(
                    &config,
                    HolderStoreHandle::load(db)?,
                    Arc::new(HttpBlobService::from_config(&config)?),
                );
                drive(&orchestrator, &config, command).await
            }
        }
    }
}

fn dump(db: &HolderDb, status: Option<HolderStatus>) -> anyhow::Result<serde_json::Value> {
    tracing::info!(counts = ?db.status_counts()?, "holders by status");
    let records: Vec<HolderRecord> = match status {
        Some(status) => db.holders_with_status(status)?,
        None => db.load_stored_holders()?.records().collect(),
    };
    Ok(serde_json::to_value(records)?)
}

async fn drive(
    orchestrator: &HolderOrchestrator,
    config: &HolderServiceConfig,
    command: Command,
) -> anyhow::Result<serde_json::Value> {
    let result = match command {
        Command::Establish { hash, holder } => {
            let holder = holder
                .unwrap_or_else(|| generate_blob_holder(config.holder_prefix.as_deref()));
            orchestrator
                .process_holders(ProcessHoldersInput {
                    holders_to_add: vec![BlobHolder::new(hash, holder)],
                    holders_to_remove: vec![],
                })
                .await?
        }
        Command::Remove { hash } => {
            let info = orchestrator
                .store()
                .snapshot()
                .get(&hash)
                .cloned()
                .with_context(|| format!("no holder stored for blob {hash}"))?;
            orchestrator
                .process_holders(ProcessHoldersInput {
                    holders_to_add: vec![],
                    holders_to_remove: vec![BlobHolder::new(hash, info.holder)],
                })
                .await?
        }
        Command::Retry => orchestrator.retry_failed().await?,
        Command::Dump { .. } => anyhow::bail!("dump does not talk to the blob service"),
    };
    Ok(serde_json::to_value(result)?)
}
