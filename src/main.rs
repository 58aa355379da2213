use anyhow::{Context, Result};
use azlist::azure::auth::AzureCredentials;
use azlist::azure::client::ArmClient;
use azlist::azure::cloud::CloudEnvironment;
use azlist::config::Config;
use azlist::resource::{AuthorizationScopeFilter, ExtensionResource, SchemaTree};
use azlist::{Error, ListResult, Lister, Options, DEFAULT_TABLE};
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{Dispatch, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// List Azure resources by an Azure Resource Graph `where` predicate
#[derive(Parser, Debug)]
#[command(name = "azlist", version, about, long_about = None)]
struct Args {
    /// Azure Resource Graph `where` predicate
    predicate: String,

    /// Subscription to list in (falls back to ARM_SUBSCRIPTION_ID, the config file,
    /// AZURE_SUBSCRIPTION_ID and the Azure CLI default subscription)
    #[arg(short, long, env = "AZLIST_SUBSCRIPTION_ID")]
    subscription_id: Option<String>,

    /// Cloud environment
    #[arg(long = "env", value_enum, env = "AZLIST_ENV")]
    environment: Option<CloudEnvironment>,

    /// Recursively list child resources of the query result
    #[arg(short, long, env = "AZLIST_RECURSIVE")]
    recursive: bool,

    /// Print each resource's body
    #[arg(short = 'b', long, env = "AZLIST_WITH_BODY")]
    with_body: bool,

    /// Include resources whose lifecycle is managed by others
    #[arg(short = 'm', long, env = "AZLIST_INCLUDE_MANAGED")]
    include_managed: bool,

    /// Include the resource groups that the listed resources belong to
    #[arg(long, env = "AZLIST_INCLUDE_RESOURCE_GROUP")]
    include_resource_group: bool,

    /// Limit the number of parallel listings (defaults to available parallelism)
    #[arg(short, long, env = "AZLIST_PARALLELISM")]
    parallelism: Option<usize>,

    /// Extension resource type to list under every resource, e.g.
    /// "Microsoft.Authorization/roleAssignments" (only role assignments scoped
    /// to the resource itself are kept)
    #[arg(long = "extension", env = "AZLIST_EXTENSION", value_delimiter = ',')]
    extensions: Vec<String>,

    /// Azure Resource Graph table name
    #[arg(short, long, env = "AZLIST_TABLE", default_value = DEFAULT_TABLE)]
    table: String,

    /// Azure Resource Graph authorization scope filter
    #[arg(long, value_enum, ignore_case = true, env = "AZLIST_AUTHORIZATION_SCOPE_FILTER")]
    authorization_scope_filter: Option<AuthorizationScopeFilter>,

    /// Print errors received while listing resources
    #[arg(short = 'e', long, env = "AZLIST_PRINT_ERROR")]
    print_error: bool,

    /// Resource type schema snapshot (defaults to <config dir>/azlist/armschema.json)
    #[arg(long, env = "AZLIST_SCHEMA")]
    schema: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Persist the effective subscription, environment, parallelism and schema path
    #[arg(long)]
    save_config: bool,

    /// Log level for debugging
    #[arg(short = 'L', long, value_enum, default_value = "off", env = "AZLIST_LOG_LEVEL")]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

struct Logging {
    dispatch: Dispatch,
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

fn setup_logging(level: LogLevel, log_file: Option<&Path>) -> Result<Option<Logging>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let (non_blocking, guard) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(tracing_level).into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    let dispatch = Dispatch::new(subscriber);
    tracing::dispatcher::set_global_default(dispatch.clone())
        .context("installing the log subscriber")?;

    tracing::info!("azlist started with log level: {:?}", level);
    if let Some(path) = log_file {
        tracing::info!("Log file: {:?}", path);
    }

    Ok(Some(Logging {
        dispatch,
        _guard: guard,
    }))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let logging = setup_logging(args.log_level, args.log_file.as_deref())?;
    let logger = logging.as_ref().map(|l| l.dispatch.clone());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    match run(&args, logger, cancel).await {
        Ok(result) => {
            print_result(&args, &result)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::Cancelled) => Ok(ExitCode::from(130)),
        Err(err) => {
            eprintln!("Error: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(
    args: &Args,
    logger: Option<Dispatch>,
    cancel: CancellationToken,
) -> azlist::Result<ListResult> {
    // CLI > ARM_SUBSCRIPTION_ID > config > ambient default
    let mut config = Config::load();
    let environment = args
        .environment
        .unwrap_or_else(|| config.effective_environment());
    let subscription_id = config
        .resolve_subscription(args.subscription_id.as_deref())
        .ok_or_else(|| {
            Error::configuration(
                "no subscription configured; set AZURE_SUBSCRIPTION_ID or use --subscription-id",
            )
        })?;
    let schema_path = args
        .schema
        .clone()
        .or_else(|| config.effective_schema_path())
        .ok_or_else(|| Error::configuration("no schema snapshot path; use --schema"))?;
    let parallelism = args.parallelism.or(config.parallelism);

    tracing::info!(
        "Using subscription: {}, environment: {}, schema: {}",
        subscription_id,
        environment,
        schema_path.display()
    );

    if args.save_config {
        config.subscription_id = Some(subscription_id.clone());
        config.environment = Some(environment);
        config.parallelism = parallelism;
        config.schema_path = Some(schema_path.clone());
        config
            .save()
            .map_err(|e| Error::configuration(format!("saving configuration: {e:#}")))?;
    }

    let schema = SchemaTree::load(&schema_path)?;
    tracing::debug!("Loaded {} schema entries", schema.len());

    let credentials = AzureCredentials::from_env(environment)
        .map_err(|e| Error::configuration(format!("failed to obtain a credential: {e:#}")))?;
    let client = ArmClient::new(&subscription_id, credentials, environment)?;

    let options = Options {
        subscription_id,
        parallelism,
        recursive: args.recursive,
        include_managed: args.include_managed,
        include_resource_group: args.include_resource_group,
        extension_resource_types: args
            .extensions
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| ExtensionResource::with_default_filter(t.trim()))
            .collect(),
        table: args.table.clone(),
        authorization_scope_filter: args.authorization_scope_filter,
        logger,
        cancel,
    };

    let lister = Lister::new(Arc::new(client), Arc::new(schema), options)?;
    lister.list(&args.predicate).await
}

fn print_result(args: &Args, result: &ListResult) -> Result<()> {
    let mut out = std::io::stdout().lock();

    match args.output {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, result)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            if args.print_error && !result.errors.is_empty() {
                writeln!(out, "Listing errors:")?;
                for err in &result.errors {
                    writeln!(out, "\t{}", err)?;
                }
                writeln!(out)?;
            }

            for res in &result.resources {
                writeln!(out, "{}", res.id)?;
                if args.with_body {
                    writeln!(out, "{}", serde_json::to_string_pretty(&res.properties)?)?;
                }
            }
        }
    }

    Ok(())
}
