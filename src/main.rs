use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use sri_authorizer::application::batch::{QueueBatchProcessor, StreamBatchProcessor};
use sri_authorizer::application::dispatcher::ChangeDispatcher;
use sri_authorizer::application::publisher::NotificationPublisher;
use sri_authorizer::application::worker::AuthorizationWorker;
use sri_authorizer::config::{
    DEFAULT_PRODUCTION_ENDPOINT, DEFAULT_REMOTE_TIMEOUT_SECS, DEFAULT_TEST_ENDPOINT,
    RemoteAuthorityConfig, TableConfig, WorkerConfig,
};
use sri_authorizer::domain::access_key::AccessKey;
use sri_authorizer::domain::ports::{
    ArtifactStoreRef, AuthorizationServiceRef, NotificationTopicRef, VoucherStoreRef, WorkQueueRef,
};
use sri_authorizer::infrastructure::fs::FsArtifactStore;
use sri_authorizer::infrastructure::in_memory::InMemoryVoucherStore;
use sri_authorizer::infrastructure::soap::SoapAuthorizationClient;
use sri_authorizer::interfaces::json::outbox::JsonLinesOutbox;
use sri_authorizer::interfaces::json::queue_batch::{read_queue_batch, write_batch_response};
use sri_authorizer::interfaces::json::stream_batch::read_stream_batch;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log filter directive (e.g. `info`, `sri_authorizer=debug`)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(clap::Args)]
struct TableArgs {
    /// Name of the voucher table
    #[arg(long, env = "TABLE_NAME")]
    table_name: String,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "DB_PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Decode an access key into the voucher identity
    Decode {
        access_key: String,
    },
    /// Process a batch of authorization queue messages
    Authorize {
        /// Queue batch JSON file; stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,

        #[command(flatten)]
        table: TableArgs,

        /// Production authorization endpoint
        #[arg(long, env = "SRI_ENDPOINT", default_value = DEFAULT_PRODUCTION_ENDPOINT)]
        sri_endpoint: String,

        /// Test authorization endpoint
        #[arg(long, env = "SRI_TEST_ENDPOINT", default_value = DEFAULT_TEST_ENDPOINT)]
        sri_test_endpoint: String,

        /// Time budget for one authorization call, in seconds
        #[arg(long, env = "REMOTE_TIMEOUT_SECS", default_value_t = DEFAULT_REMOTE_TIMEOUT_SECS)]
        remote_timeout_secs: u64,

        /// Directory for authorized documents; storage is skipped when absent
        #[arg(long, env = "ARTIFACT_DIR")]
        artifact_dir: Option<PathBuf>,
    },
    /// Route a batch of voucher table change events
    Dispatch {
        /// Change-stream batch JSON file; stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,

        /// Name of the voucher table the events come from
        #[arg(long, env = "TABLE_NAME")]
        table_name: String,
    },
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter =
        EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().flatten_event(true).init(),
    }
}

fn open_input(input: Option<PathBuf>) -> Result<Box<dyn Read>> {
    Ok(match input {
        Some(path) => Box::new(BufReader::new(File::open(path).into_diagnostic()?)),
        None => Box::new(io::stdin().lock()),
    })
}

fn open_store(table: &TableConfig) -> Result<VoucherStoreRef> {
    if let Some(db_path) = &table.db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            use sri_authorizer::infrastructure::rocksdb::RocksDBStore;
            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            info!(
                table = %table.table_name,
                path = %db_path.display(),
                "using persistent voucher table"
            );
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        warn!(
            path = %db_path.display(),
            "built without the storage-rocksdb feature, falling back to in-memory storage"
        );
    }
    Ok(Arc::new(InMemoryVoucherStore::new()))
}

async fn authorize(config: WorkerConfig, input: Option<PathBuf>) -> Result<()> {
    let store = open_store(&config.table)?;
    let authority: AuthorizationServiceRef =
        Arc::new(SoapAuthorizationClient::new(&config.remote).into_diagnostic()?);

    let mut worker =
        AuthorizationWorker::new(store, authority).with_remote_timeout(config.remote.timeout);
    match &config.artifact_dir {
        Some(dir) => {
            let artifacts: ArtifactStoreRef =
                Arc::new(FsArtifactStore::new(dir.clone()).await.into_diagnostic()?);
            worker = worker.with_artifact_store(artifacts);
        }
        None => {
            warn!("no artifact directory configured, authorized documents will not be stored");
        }
    }

    let records = read_queue_batch(open_input(input)?).into_diagnostic()?;
    let response = QueueBatchProcessor::new(worker).process(&records).await;
    write_batch_response(io::stdout().lock(), &response).into_diagnostic()?;
    Ok(())
}

async fn dispatch(table: TableConfig, input: Option<PathBuf>) -> Result<()> {
    let batch = read_stream_batch(open_input(input)?).into_diagnostic()?;

    let outbox = Arc::new(JsonLinesOutbox::new(io::stdout()));
    let queue: WorkQueueRef = outbox.clone();
    let topic: NotificationTopicRef = outbox;
    let dispatcher =
        ChangeDispatcher::new(queue, NotificationPublisher::new(topic), table.table_name);

    let mut response = StreamBatchProcessor::new(dispatcher).process(&batch.events).await;
    for identifier in batch.undecodable {
        response.record_failure(identifier);
    }
    let failed: Vec<&str> = response.failed_items().collect();
    info!(events = batch.events.len(), ?failed, "dispatch batch finished");
    write_batch_response(io::stderr().lock(), &response).into_diagnostic()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    match cli.command {
        Command::Decode { access_key } => {
            let key = AccessKey::parse(&access_key).into_diagnostic()?;
            let decoded = serde_json::json!({
                "accessKey": key.as_str(),
                "companyId": key.company_id(),
                "identity": key.identity(),
                "storeKey": key.identity().store_key(),
            });
            println!("{decoded}");
        }
        Command::Authorize {
            input,
            table,
            sri_endpoint,
            sri_test_endpoint,
            remote_timeout_secs,
            artifact_dir,
        } => {
            let config = WorkerConfig {
                table: TableConfig::new(table.table_name, table.db_path).into_diagnostic()?,
                remote: RemoteAuthorityConfig::new(
                    sri_endpoint,
                    sri_test_endpoint,
                    remote_timeout_secs,
                )
                .into_diagnostic()?,
                artifact_dir,
            };
            authorize(config, input).await?;
        }
        Command::Dispatch { input, table_name } => {
            let table = TableConfig::new(table_name, None).into_diagnostic()?;
            dispatch(table, input).await?;
        }
    }

    Ok(())
}
