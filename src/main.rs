use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_arbiter::{
    config::{Config, LogFormat},
    errors::{AppError, ConfigError, JobError},
    job_scheduling::{ExitStatus, JobEngine, JobRegistry, JobSchedulingApi},
    jobs::{JobServices, builtin_handlers},
    models::{JobStatus, MediaType},
    observability::AppObservability,
    repositories::{
        CatalogSnapshot, InMemoryJobHistory, InMemoryProviderRepository, InMemoryTitleRepository,
        JobHistoryRepository, JsonFileJobHistory, ProviderRepository, TitleRepository,
    },
    services::{DecisionCache, HealthTracker, ProviderCache, SourceRequest, SourceSelector, UrlProber},
    sources::ProviderClientFactory,
};

#[derive(Parser)]
#[command(name = "iptv-arbiter")]
#[command(version)]
#[command(about = "IPTV provider aggregation with scheduled sync jobs and load-balanced source selection")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (overrides the config file)
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted
    Run,
    /// Inspect or drive jobs
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },
    /// Resolve the best upstream URL for a title
    Select {
        /// Consolidated title id
        title: String,
        #[arg(long, default_value = "movies")]
        media_type: MediaType,
        #[arg(long)]
        season: Option<u32>,
        #[arg(long)]
        episode: Option<u32>,
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum JobsCommand {
    /// List registered jobs with their last status
    List,
    /// Run a job now and wait for it
    Run { name: String },
    /// Show one job's status
    Status { name: String },
}

/// Everything the subcommands share
struct App {
    config: Config,
    engine: JobEngine,
    selector: Arc<SourceSelector>,
    providers: Arc<InMemoryProviderRepository>,
    titles: Arc<InMemoryTitleRepository>,
}

impl App {
    async fn build(config: Config) -> Result<Self> {
        let snapshot = match &config.providers.catalog_path {
            Some(path) if path.exists() => CatalogSnapshot::load(path).await?,
            Some(path) => {
                warn!("Catalog {} not found, starting empty", path.display());
                CatalogSnapshot::default()
            }
            None => CatalogSnapshot::default(),
        };
        let providers = Arc::new(InMemoryProviderRepository::new(snapshot.providers));
        let titles = Arc::new(InMemoryTitleRepository::new(snapshot.titles));

        let history: Arc<dyn JobHistoryRepository> = match &config.engine.history_path {
            Some(path) => {
                info!("Persisting job history to {}", path.display());
                Arc::new(JsonFileJobHistory::new(path.clone()))
            }
            None => Arc::new(InMemoryJobHistory::new()),
        };

        let observability = AppObservability::new();
        let provider_cache = Arc::new(ProviderCache::new(
            providers.clone() as Arc<dyn ProviderRepository>
        ));
        let decisions = Arc::new(DecisionCache::new(&config.selector));
        let health = Arc::new(HealthTracker::new(&config.selector, &config.health));
        let prober = Arc::new(UrlProber::new(&config.prober)?);

        let selector = Arc::new(
            SourceSelector::new(
                config.selector.clone(),
                titles.clone() as Arc<dyn TitleRepository>,
                provider_cache.clone(),
                prober,
                health,
            )
            .with_decision_cache(decisions.clone())
            .with_observability(observability.clone()),
        );

        let services = Arc::new(JobServices {
            providers: providers.clone(),
            titles: titles.clone(),
            clients: ProviderClientFactory::with_defaults(&config)?,
            provider_cache,
            decisions,
            config: config.providers.clone(),
        });

        let registry = JobRegistry::new(config.jobs.clone())?;
        let engine = JobEngine::builder(registry, history)
            .handlers(builtin_handlers(services))
            .config(config.engine.clone())
            .observability(observability)
            .build()?;

        Ok(Self {
            config,
            engine,
            selector,
            providers,
            titles,
        })
    }

    /// Write the provider and title stores back to the catalog file
    async fn save_catalog(&self) {
        let Some(path) = &self.config.providers.catalog_path else {
            return;
        };
        let snapshot = CatalogSnapshot {
            providers: match self.providers.list_all().await {
                Ok(providers) => providers,
                Err(e) => {
                    error!("Failed to read providers for the catalog snapshot: {}", e);
                    return;
                }
            },
            titles: self.titles.all().await,
        };
        if let Err(e) = snapshot.save(path).await {
            error!("Failed to save catalog snapshot: {}", e);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load_from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", cli.config, e);
            return exit(ExitStatus::InvalidArguments);
        }
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, config.logging.format);
    info!("Starting IPTV arbiter v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", cli.config);

    match dispatch(cli.command.unwrap_or(Command::Run), config).await {
        Ok(status) => exit(status),
        Err(e) => {
            error!("{:#}", e);
            exit(exit_status_of(&e))
        }
    }
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("iptv_arbiter={level}").into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn dispatch(command: Command, config: Config) -> Result<ExitStatus> {
    let app = App::build(config).await?;

    match command {
        Command::Run => run_scheduler(&app).await,
        Command::Jobs { command } => {
            let api = JobSchedulingApi::new(app.engine.clone());
            match command {
                JobsCommand::List => {
                    for job in api.list_jobs().await {
                        println!("{}", serde_json::to_string(&job)?);
                    }
                    Ok(ExitStatus::Success)
                }
                JobsCommand::Status { name } => {
                    let info = api.get_job_status(&name).await?;
                    println!("{}", serde_json::to_string_pretty(&info)?);
                    Ok(ExitStatus::Success)
                }
                JobsCommand::Run { name } => {
                    app.engine.initialize().await?;
                    let run = api.trigger_job(&name, Some("cli")).await;
                    app.save_catalog().await;
                    let run = run?;
                    println!("{}", serde_json::to_string_pretty(&run)?);
                    Ok(if run.status == JobStatus::Completed {
                        ExitStatus::Success
                    } else {
                        ExitStatus::Failure
                    })
                }
            }
        }
        Command::Select {
            title,
            media_type,
            season,
            episode,
            user,
        } => {
            let request = SourceRequest {
                title_id: title,
                media_type,
                season,
                episode,
                username: user,
            };
            match app.selector.select(&request, &CancellationToken::new()).await {
                Some(selection) => {
                    println!("{}", serde_json::to_string_pretty(&selection)?);
                    Ok(ExitStatus::Success)
                }
                None => {
                    warn!("No working source for {}", request.title_key());
                    Ok(ExitStatus::NotFound)
                }
            }
        }
    }
}

async fn run_scheduler(app: &App) -> Result<ExitStatus> {
    let recovered = app.engine.initialize().await?;
    info!("Job history ready ({} interrupted runs recovered)", recovered);
    app.engine.start()?;

    let sweeper_token = CancellationToken::new();
    let sweeper = tokio::spawn(
        app.selector
            .clone()
            .run_sweeper(app.config.health.sweep_interval, sweeper_token.clone()),
    );

    info!("Scheduler running with {} jobs; press Ctrl-C to stop", app.engine.registry().len());
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    app.engine.stop().await;
    sweeper_token.cancel();
    if let Err(e) = sweeper.await {
        warn!("Selector sweeper ended abnormally: {}", e);
    }
    app.save_catalog().await;
    info!("Shutdown complete");
    Ok(ExitStatus::Success)
}

fn exit_status_of(error: &anyhow::Error) -> ExitStatus {
    if let Some(job) = error.downcast_ref::<JobError>() {
        return job.into();
    }
    if let Some(app) = error.downcast_ref::<AppError>() {
        return app.into();
    }
    if error.downcast_ref::<ConfigError>().is_some() {
        return ExitStatus::InvalidArguments;
    }
    ExitStatus::Failure
}

fn exit(status: ExitStatus) -> ExitCode {
    ExitCode::from(status.code() as u8)
}
