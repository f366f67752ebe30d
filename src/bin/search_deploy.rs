use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::builder::PossibleValuesParser;
use log::{error, info};
use sqlx::PgPool;
use sqlx::postgres::PgRow;

use search_indexer::importer::{
    Accounts, INDEX_NAMES, Instances, PublicStatuses, Statuses, Tags,
};
use search_indexer::source::postgres::connect;
use search_indexer::{
    ElasticsearchClient, ImportProgress, Importer, ImporterOptions, IndexDefinition, IndexError,
    IndexerConfig, PgSource, RecordSource, WorkerPool, init_logger,
};

#[derive(Parser, Debug)]
#[command(
    name = "search_deploy",
    about = "Fill the search indexes from the database and remove stale documents"
)]
struct Args {
    /// Only process these indexes (comma separated or repeated).
    #[arg(long, value_delimiter = ',', value_parser = PossibleValuesParser::new(INDEX_NAMES.iter().copied()))]
    only: Vec<String>,

    /// Records per page and per bulk request (overrides INDEXER_BATCH_SIZE).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Work units running at once (overrides INDEXER_CONCURRENCY).
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Skip importing records; only remove orphaned documents.
    #[arg(long)]
    no_import: bool,

    /// Skip removing orphaned documents.
    #[arg(long)]
    no_clean: bool,
}

struct Deployment {
    db: PgPool,
    sink: Arc<ElasticsearchClient>,
    workers: Arc<WorkerPool>,
    options: ImporterOptions,
    progress: Arc<ImportProgress>,
    import: bool,
    clean: bool,
}

impl Deployment {
    async fn estimate<D>(&self) -> u64
    where
        D: IndexDefinition,
        D::Record: for<'r> sqlx::FromRow<'r, PgRow> + Unpin,
    {
        match PgSource::<D>::new(self.db.clone()).count_estimate().await {
            Ok(estimate) => estimate,
            Err(err) => {
                error!("{}: failed to estimate size: {}", D::INDEX, err);
                0
            }
        }
    }

    async fn run<D>(&self, definition: D) -> Result<(), IndexError>
    where
        D: IndexDefinition,
        D::Record: for<'r> sqlx::FromRow<'r, PgRow> + Unpin,
    {
        let importer = Importer::new(
            definition,
            Arc::new(PgSource::<D>::new(self.db.clone())),
            Arc::clone(&self.sink),
            Arc::clone(&self.workers),
            self.options.clone(),
        );
        importer.on_progress(self.progress.progress_callback());
        importer.on_failure(self.progress.failure_callback(importer.index_name()));

        let mut result = Ok(());

        if self.import {
            importer.optimize_for_import().await?;
            result = importer.import().await;
        }

        if self.clean && result.is_ok() {
            result = importer.clean_up().await;
        }

        if self.import {
            // restore search settings even when the import failed
            if let Err(err) = importer.optimize_for_search().await {
                error!("{}: failed to restore refresh_interval: {}", importer.index_name(), err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        result
    }

    async fn estimate_index(&self, name: &str) -> u64 {
        match name {
            "accounts" => self.estimate::<Accounts>().await,
            "tags" => self.estimate::<Tags>().await,
            "statuses" => self.estimate::<Statuses>().await,
            "public_statuses" => self.estimate::<PublicStatuses>().await,
            "instances" => self.estimate::<Instances>().await,
            _ => 0,
        }
    }

    async fn run_index(&self, name: &str) -> Result<(), IndexError> {
        match name {
            "accounts" => self.run(Accounts).await,
            "tags" => self.run(Tags).await,
            "statuses" => self.run(Statuses).await,
            "public_statuses" => self.run(PublicStatuses).await,
            "instances" => self.run(Instances).await,
            other => Err(IndexError::Config(format!("unknown index {}", other))),
        }
    }
}

async fn deploy(args: Args) -> Result<bool, IndexError> {
    let mut config = IndexerConfig::from_env();
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(concurrency) = args.concurrency {
        config.worker_pool_size = concurrency;
    }
    config.validate()?;

    let database_url = config
        .database_url
        .clone()
        .ok_or_else(|| IndexError::Config("DATABASE_URL must be set".to_string()))?;

    let db = connect(&database_url, config.effective_pool_size()).await?;
    let sink = Arc::new(ElasticsearchClient::new(&config.sink)?);
    sink.ping().await?;

    let selected: Vec<&str> = INDEX_NAMES
        .iter()
        .copied()
        .filter(|name| args.only.is_empty() || args.only.iter().any(|only| only.as_str() == *name))
        .collect();

    let deployment = Deployment {
        db,
        sink,
        workers: Arc::new(WorkerPool::new(config.worker_pool_size, config.queue_factor)),
        options: ImporterOptions::from_config(&config),
        progress: ImportProgress::new(),
        import: !args.no_import,
        clean: !args.no_clean,
    };

    let mut total = 0;
    for name in &selected {
        total += deployment.estimate_index(name).await;
    }
    info!(
        "deploying {} with {} workers, batch size {}",
        selected.join(", "),
        config.worker_pool_size,
        config.batch_size
    );
    println!("Processing roughly {} records", total);

    let mut succeeded = true;
    for name in &selected {
        info!("{}: starting", name);
        if let Err(err) = deployment.run_index(name).await {
            error!("{}: {}", name, err);
            succeeded = false;
        }
    }

    let snapshot = deployment.progress.snapshot();
    println!(
        "Indexed {} records, de-indexed {}",
        snapshot.indexed, snapshot.deleted
    );
    if snapshot.failed > 0 {
        error!("{} units of work failed", snapshot.failed);
    }

    Ok(succeeded && snapshot.failed == 0)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logger();
    let args = Args::parse();

    match deploy(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("search deploy failed: {}", err);
            ExitCode::FAILURE
        }
    }
}
