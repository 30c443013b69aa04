// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Claims Pipeline Binary
//!
//! Composition root: parses the CLI, loads configuration, constructs the
//! dependency graph explicitly (no container, no ambient context), and runs
//! the requested command. Only the adapters the configured source mode
//! needs are built; the orchestrator and pipeline are identical for every
//! mode.

use anyhow::{bail, Context};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use claims_pipeline_bootstrap::cli::{self, Command};
use claims_pipeline_bootstrap::shutdown::shutdown_channel;
use claims_pipeline_bootstrap::{init_tracing, signals};

use claims_pipeline_domain::repositories::{DocumentPersister, IngestionStore};
use claims_pipeline_domain::services::{CredentialCipher, ReferenceResolver, ToggleStore, TransactionGateway};
use claims_pipeline_domain::value_objects::safe_file_name::derive_file_id;
use claims_pipeline_domain::value_objects::staged_payload::StagedPayload;
use claims_pipeline_domain::{IngestError, SourceHandle, WorkItem};

use claims_pipeline::application::services::{
    Acker, DhpoAcker, DhpoFetchCoordinator, FileReport, IngestionPipeline, LocalFsAcker, LocalFsFetcher, Orchestrator,
    ReencryptJob,
};
use claims_pipeline::infrastructure::adapters::{AmeCipher, DhpoFileRegistry, DhpoGateway, HttpSoapGateway};
use claims_pipeline::infrastructure::config::AppConfig;
use claims_pipeline::infrastructure::metrics::IngestionMetrics;
use claims_pipeline::infrastructure::repositories::{
    schema, SqliteDocumentPersister, SqliteFacilityDirectory, SqliteIngestionStore, SqliteReferenceResolver,
    SqliteToggleStore,
};
use claims_pipeline::infrastructure::runtime::run_fixed_delay;
use claims_pipeline::infrastructure::services::{StagingService, Verifier};

/// Routes acknowledgements to the adapter that fetched the file.
struct SourceRouter {
    localfs: Option<LocalFsAcker>,
    dhpo: Option<DhpoAcker>,
}

#[async_trait]
impl Acker for SourceRouter {
    async fn ack(&self, item: &WorkItem, report: &FileReport) -> Result<(), IngestError> {
        match (&item.source, &self.localfs, &self.dhpo) {
            (SourceHandle::LocalFs { .. }, Some(acker), _) => acker.ack(item, report).await,
            (SourceHandle::Dhpo { .. }, _, Some(acker)) => acker.ack(item, report).await,
            _ => Ok(()),
        }
    }
}

/// Shared persistence wiring used by every command that touches the DB.
struct CoreServices {
    store: Arc<SqliteIngestionStore>,
    persister: Arc<SqliteDocumentPersister>,
    toggles: Arc<SqliteToggleStore>,
    directory: Arc<SqliteFacilityDirectory>,
    metrics: Arc<IngestionMetrics>,
}

async fn build_core(config: &AppConfig) -> anyhow::Result<CoreServices> {
    let pool = schema::initialize_database(&config.database.url, config.database.max_connections)
        .await
        .context("database initialization failed")?;

    let store = Arc::new(SqliteIngestionStore::new(pool.clone()));
    let resolver: Arc<dyn ReferenceResolver> =
        Arc::new(SqliteReferenceResolver::new(pool.clone(), config.refdata.clone()));
    let persister = Arc::new(SqliteDocumentPersister::new(
        pool.clone(),
        resolver,
        store.clone() as Arc<dyn IngestionStore>,
    ));
    let toggles = Arc::new(SqliteToggleStore::new(pool.clone()));
    let directory = Arc::new(SqliteFacilityDirectory::new(pool));

    Ok(CoreServices {
        store,
        persister,
        toggles,
        directory,
        metrics: IngestionMetrics::shared(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::parse_and_validate().context("invalid command line")?;
    init_tracing(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref()).context("configuration load failed")?;

    match cli.command {
        Command::ValidateConfig => {
            println!("{config:#?}");
            Ok(())
        }
        Command::RotateKeys => rotate_keys(&config).await,
        Command::IngestFile { input } => ingest_file(&config, &input).await,
        Command::Serve => serve(&config).await,
    }
}

async fn rotate_keys(config: &AppConfig) -> anyhow::Result<()> {
    if !config.ame.enabled {
        bail!("key rotation requires ame.enabled = true");
    }
    let core = build_core(config).await?;
    let cipher: Arc<dyn CredentialCipher> = Arc::new(AmeCipher::from_config(&config.ame)?);

    let report = ReencryptJob::new(core.directory.clone(), cipher).run().await?;
    println!(
        "rotation: scanned {}, rotated {}, failed {}, already current {}",
        report.scanned, report.rotated, report.failed, report.already_current
    );
    if report.failed > 0 {
        bail!("{} facility row(s) could not be rotated", report.failed);
    }
    Ok(())
}

async fn ingest_file(config: &AppConfig, input: &std::path::Path) -> anyhow::Result<()> {
    let core = build_core(config).await?;
    let pipeline = IngestionPipeline::new(
        core.store.clone() as Arc<dyn IngestionStore>,
        core.persister.clone() as Arc<dyn DocumentPersister>,
        Verifier::new(core.store.clone() as Arc<dyn IngestionStore>),
        Arc::new(claims_pipeline::application::services::NoopAcker),
        core.metrics.clone(),
    );

    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("cannot read {}", input.display()))?;
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input.xml")
        .to_string();
    let file_id = derive_file_id(Some(&name), &bytes);

    let item = WorkItem::new(
        file_id,
        name,
        StagedPayload::Memory(bytes),
        SourceHandle::LocalFs {
            claimed_path: input.to_path_buf(),
        },
    );

    let report = pipeline.process(&item).await;
    println!(
        "file {}: persisted {} claims ({} skipped), verify_ok={}",
        report.file_id,
        report.summary.claims_persisted,
        report.summary.claims_skipped,
        report.verify_ok()
    );
    if !report.succeeded() {
        bail!(
            "ingestion failed at stage {:?}: {}",
            report.failed_stage,
            report.error.unwrap_or_default()
        );
    }
    Ok(())
}

async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    let localfs_enabled = config.source.mode.localfs_enabled();
    let dhpo_enabled = config.source.mode.dhpo_enabled();
    if dhpo_enabled && !config.ame.enabled {
        bail!("source mode includes dhpo but ame.enabled = false; facility credentials cannot be decrypted");
    }

    let core = build_core(config).await?;
    let (shutdown, shutdown_signal) = shutdown_channel();
    let signal_handle = signals::install(shutdown.clone());

    // DHPO wiring is only constructed when the mode asks for it.
    let registry = Arc::new(DhpoFileRegistry::new());
    let mut dhpo_acker = None;
    let mut dhpo_fetch = None;
    let mut rotation_job = None;
    if dhpo_enabled {
        let cipher: Arc<dyn CredentialCipher> = Arc::new(AmeCipher::from_config(&config.ame)?);
        let gateway: Arc<dyn TransactionGateway> = Arc::new(DhpoGateway::new(
            HttpSoapGateway::new(config.soap.clone())?,
            core.metrics.clone(),
        ));
        let staging = Arc::new(StagingService::new(config.staging.clone()));

        dhpo_acker = Some(DhpoAcker::new(
            core.directory.clone(),
            cipher.clone(),
            gateway.clone(),
            core.toggles.clone() as Arc<dyn ToggleStore>,
            registry.clone(),
        ));
        dhpo_fetch = Some(Arc::new(DhpoFetchCoordinator::new(
            config.soap.clone(),
            core.directory.clone(),
            cipher.clone(),
            gateway,
            core.toggles.clone() as Arc<dyn ToggleStore>,
            staging,
            registry,
            core.store.clone() as Arc<dyn IngestionStore>,
        )));
        rotation_job = Some(Arc::new(ReencryptJob::new(core.directory.clone(), cipher)));
    }

    let acker = Arc::new(SourceRouter {
        localfs: localfs_enabled.then(|| LocalFsAcker::new(config.localfs.clone())),
        dhpo: dhpo_acker,
    });

    let pipeline = Arc::new(IngestionPipeline::new(
        core.store.clone() as Arc<dyn IngestionStore>,
        core.persister.clone() as Arc<dyn DocumentPersister>,
        Verifier::new(core.store.clone() as Arc<dyn IngestionStore>),
        acker,
        core.metrics.clone(),
    ));

    let orchestrator = Orchestrator::start(&config.ingestion, pipeline, core.metrics.clone());

    let mut tasks = Vec::new();

    if localfs_enabled {
        let fetcher = Arc::new(LocalFsFetcher::new(config.localfs.clone()));
        fetcher.ensure_dirs().await?;
        let orchestrator = orchestrator.clone();
        let shutdown = shutdown_signal.clone();
        let interval = Duration::from_millis(config.localfs.sweep_interval_ms);
        tasks.push(tokio::spawn(async move {
            run_fixed_delay("localfs-sweep", interval, shutdown, move || {
                let fetcher = fetcher.clone();
                let orchestrator = orchestrator.clone();
                async move { fetcher.tick(&orchestrator).await }
            })
            .await;
        }));
        info!("localfs fetch adapter started");
    }

    if let Some(fetch) = dhpo_fetch {
        let orchestrator = orchestrator.clone();
        let shutdown = shutdown_signal.clone();
        let interval = Duration::from_millis(config.soap.poll_fixed_delay_ms);
        tasks.push(tokio::spawn(async move {
            run_fixed_delay("dhpo-poll", interval, shutdown, move || {
                let fetch = fetch.clone();
                let orchestrator = orchestrator.clone();
                async move { fetch.tick(&orchestrator).await }
            })
            .await;
        }));
        info!("DHPO fetch coordinator started");
    }

    if let Some(job) = rotation_job {
        let shutdown = shutdown_signal.clone();
        let interval = Duration::from_millis(config.ame.rotation_interval_ms);
        tasks.push(tokio::spawn(async move {
            run_fixed_delay("ame-rotation", interval, shutdown, move || {
                let job = job.clone();
                async move { job.run().await.map(|_| ()) }
            })
            .await;
        }));
        info!("credential rotation job scheduled");
    }

    info!("claims pipeline serving; send SIGINT/SIGTERM to stop");
    shutdown_signal.draining().await;

    // The schedulers stop at the draining phase; the worker pool keeps
    // emptying the queue until the drain completes or its deadline expires.
    let drain = orchestrator.shutdown(Duration::from_secs(30)).await;
    if drain.abandoned > 0 {
        warn!(abandoned = drain.abandoned, "some queued files were not processed; they will be re-fetched");
    }
    for task in tasks {
        let _ = task.await;
    }
    signal_handle.abort();
    shutdown.stop();

    info!(completed = drain.completed, "shutdown complete");
    Ok(())
}
