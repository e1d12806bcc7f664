mod cli;

use chrono::Utc;
use clap::Parser;
use cli::{Cli, Commands, LookupArgs};
use mediasweep::config::{CollectionConfig, Config};
use mediasweep::ledger::FjallLedger;
use mediasweep::observability::{self, Metrics};
use mediasweep::scheduler::retention_window;
use mediasweep::store::{DocumentStore, FjallDocumentStore, documents_from_json};
use mediasweep::validator::{UrlValidator, ValidationCache};
use mediasweep::worker::{BatchWorker, RunConfig, RunEvent, StopSignal};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    observability::init_tracing();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => {
            let _ = dotenvy::dotenv();
            Config::load_from_path(path)?
        }
        None => Config::load()?,
    };

    match cli.command {
        Commands::Serve(args) => mediasweep::server::serve(config, args.every).await?,
        Commands::Run(args) => run(&config, args.dry_run).await?,
        Commands::Import(args) => {
            let raw = std::fs::read_to_string(&args.file)?;
            let documents = documents_from_json(serde_json::from_str(&raw)?)?;
            let store = FjallDocumentStore::open(config.storage.documents_path())?;
            let count = documents.len();
            for document in documents {
                store.put(&args.collection, document).await?;
            }
            store.persist()?;
            info!(collection = %args.collection, count, "Documents imported");
        }
        Commands::CheckUrl(args) => {
            let validator = UrlValidator::http(config.validator.clone())?;
            let result = validator
                .validate_url(&args.url, args.kind, &ValidationCache::new())
                .await;
            print_json(&result)?;
        }
        Commands::FixDocument(args) => {
            let store = Arc::new(FjallDocumentStore::open(config.storage.documents_path())?);
            let worker = BatchWorker::from_config(&config, store.clone(), Arc::new(Metrics::new()))?;

            let mut settings = config
                .collections
                .get(&args.collection)
                .cloned()
                .unwrap_or_else(CollectionConfig::default);
            if args.dry_run {
                settings.fixable = false;
            }

            let fix = worker.fix_document(&args.collection, &args.id, &settings).await?;
            store.persist()?;
            print_json(&fix)?;
        }
        Commands::Task(args) => {
            let ledger = FjallLedger::open(config.storage.ledger_path())?;
            match args {
                LookupArgs { id: Some(id), .. } => match ledger.get_task(&id)? {
                    Some(task) => print_json(&task)?,
                    None => return Err(format!("task {} not found", id).into()),
                },
                LookupArgs { id: None, limit } => print_json(&ledger.list_tasks(limit)?)?,
            }
        }
        Commands::Report(args) => {
            let ledger = FjallLedger::open(config.storage.ledger_path())?;
            match args {
                LookupArgs { id: Some(id), .. } => match ledger.get_report(&id)? {
                    Some(report) => print_json(&report)?,
                    None => return Err(format!("report {} not found", id).into()),
                },
                LookupArgs { id: None, limit } => print_json(&ledger.list_reports(limit)?)?,
            }
        }
        Commands::Cleanup => {
            let ledger = FjallLedger::open(config.storage.ledger_path())?;
            let stats = ledger.prune_expired(retention_window(&config.scheduler), Utc::now())?;
            ledger.persist()?;
            println!("pruned {} of {} tasks", stats.tasks_pruned, stats.tasks_scanned);
        }
    }

    Ok(())
}

/// One synchronous run; the report is stored in the ledger and printed.
async fn run(config: &Config, dry_run: bool) -> Result<(), AnyError> {
    let store = Arc::new(FjallDocumentStore::open(config.storage.documents_path())?);
    let ledger = FjallLedger::open(config.storage.ledger_path())?;
    let worker = BatchWorker::from_config(config, store.clone(), Arc::new(Metrics::new()))?;

    let mut run_config = RunConfig::from_config(config);
    run_config.apply_fixes = !dry_run;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                RunEvent::Progress(p) => info!(
                    collection = %p.collection,
                    processed = p.processed,
                    total = p.total,
                    "Progress"
                ),
                RunEvent::CollectionFailed { collection, error } => {
                    tracing::warn!(%collection, %error, "Collection failed")
                }
            }
        }
    });

    let outcome = worker.run(&run_config, Some(&tx), &StopSignal::new()).await;
    drop(tx);
    let _ = progress.await;

    ledger.put_report(&outcome.report)?;
    ledger.persist()?;
    store.persist()?;
    print_json(&outcome.report)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AnyError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
