//! ForeignEye CLI - news concept extraction and knowledge maps

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use foreigneye_core::config::Config;
use foreigneye_core::graph::{self, GraphStore, GraphSynchronizer};
use foreigneye_core::jobs::{JobQueue, Task, TaskRunner, WorkerPool};
use foreigneye_core::ledger::LedgerWriter;
use foreigneye_core::llm::LlmClient;
use foreigneye_core::pipeline::{
    AnalyzerSettings, ArticleSource, GNewsSource, IngestionPipeline, LlmConceptAnalyzer,
    StaticSource,
};
use foreigneye_core::query::{
    CollectionService, DEFAULT_USER_ID, DEFAULT_USERNAME, KnowledgeMapBuilder, RelativeSelector,
    SearchService, UserService,
};
use foreigneye_core::storage::{Database, DatabaseConfig};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "foreigneye")]
#[command(author, version, about = "News concept extraction and knowledge maps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, analyse and store news articles
    Ingest {
        /// Maximum articles to fetch (defaults to pipeline.max_articles)
        #[arg(short, long)]
        max_articles: Option<usize>,
        /// Replay articles from a JSON file instead of the news API
        #[arg(long)]
        from_file: Option<PathBuf>,
    },

    /// Discover relations across all stored concepts
    Relations,

    /// Run background workers until interrupted
    Worker {
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Queue a background task
    Enqueue {
        #[command(subcommand)]
        task: EnqueueAction,
    },

    /// Sync a user's collection into the graph view now
    Sync {
        #[arg(short, long, default_value_t = DEFAULT_USER_ID)]
        user: i64,
    },

    /// Collect a concept (by id or name)
    Collect {
        #[arg(short, long, default_value_t = DEFAULT_USER_ID)]
        user: i64,
        #[arg(short, long)]
        concept: String,
    },

    /// List a user's collected concepts
    Collections {
        #[arg(short, long, default_value_t = DEFAULT_USER_ID)]
        user: i64,
    },

    /// Show a user's knowledge map
    Map {
        #[arg(short, long, default_value_t = DEFAULT_USER_ID)]
        user: i64,
    },

    /// Find articles mentioning every given concept
    Search {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Show relative concepts for an article
    Relatives {
        #[arg(short, long)]
        article: i64,
    },

    /// Create the default user if missing
    SeedUser {
        #[arg(long, default_value_t = DEFAULT_USER_ID)]
        id: i64,
        #[arg(long, default_value = DEFAULT_USERNAME)]
        username: String,
    },

    /// Show the job queue
    Jobs {
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum EnqueueAction {
    /// Queue an ingestion run
    Ingest {
        #[arg(short, long)]
        max_articles: Option<usize>,
    },
    /// Queue a graph view sync for a user
    Sync {
        #[arg(short, long, default_value_t = DEFAULT_USER_ID)]
        user: i64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

/// Handles shared by most commands
struct App {
    config: Config,
    db: Database,
    graph: Arc<dyn GraphStore>,
}

impl App {
    async fn open(config: Config) -> anyhow::Result<Self> {
        let db = Database::new(DatabaseConfig::from_settings(&config.database)).await?;
        let graph = graph::connect(&config.graph).await?;
        Ok(Self { config, db, graph })
    }

    fn writer(&self) -> LedgerWriter {
        LedgerWriter::new(self.db.pool().clone(), self.graph.clone())
    }

    fn queue(&self) -> JobQueue {
        JobQueue::from_config(self.db.pool().clone(), &self.config.worker)
    }

    fn synchronizer(&self) -> GraphSynchronizer {
        GraphSynchronizer::new(self.db.pool().clone(), self.graph.clone())
    }

    fn pipeline(&self, source: Arc<dyn ArticleSource>) -> anyhow::Result<IngestionPipeline> {
        let client = LlmClient::from_config(&self.config.llm)?;
        let settings = AnalyzerSettings::from_config(&self.config.llm, &self.config.pipeline);
        let analyzer = LlmConceptAnalyzer::new(Arc::new(client), settings);
        Ok(IngestionPipeline::new(source, Arc::new(analyzer), self.writer()))
    }

    fn news_source(&self, from_file: Option<&Path>) -> anyhow::Result<Arc<dyn ArticleSource>> {
        Ok(match from_file {
            Some(path) => Arc::new(StaticSource::from_json_file(path)?),
            None => Arc::new(GNewsSource::from_config(&self.config.news)?),
        })
    }
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(value),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize tracing; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("foreigneye=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let quiet = cli.quiet;

    let command = match cli.command {
        Commands::Config { action } => return cmd_config(action, quiet),
        Commands::Doctor => return cmd_doctor(quiet).await,
        command => command,
    };

    let app = App::open(Config::load()?).await?;

    let result = match command {
        Commands::Ingest {
            max_articles,
            from_file,
        } => cmd_ingest(&app, max_articles, from_file.as_deref(), format, quiet).await,
        Commands::Relations => cmd_relations(&app, format, quiet).await,
        Commands::Worker { concurrency } => cmd_worker(&app, concurrency, quiet).await,
        Commands::Enqueue { task } => cmd_enqueue(&app, task, format, quiet).await,
        Commands::Sync { user } => cmd_sync(&app, user, format, quiet).await,
        Commands::Collect { user, concept } => cmd_collect(&app, user, &concept, format, quiet).await,
        Commands::Collections { user } => cmd_collections(&app, user, format).await,
        Commands::Map { user } => cmd_map(&app, user, format).await,
        Commands::Search { names } => cmd_search(&app, &names, format).await,
        Commands::Relatives { article } => cmd_relatives(&app, article, format).await,
        Commands::SeedUser { id, username } => cmd_seed_user(&app, id, &username, format, quiet).await,
        Commands::Jobs { limit } => cmd_jobs(&app, limit, format).await,
        Commands::Config { .. } | Commands::Doctor => Ok(()),
    };

    app.db.close().await;
    result
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ingest(
    app: &App,
    max_articles: Option<usize>,
    from_file: Option<&Path>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let max = max_articles.unwrap_or(app.config.pipeline.max_articles);
    let pipeline = app.pipeline(app.news_source(from_file)?)?;

    if !quiet && format == OutputFormat::Text {
        println!("Ingesting up to {} articles from {}...", max, pipeline.source_name());
    }
    let report = pipeline.run(max).await?;

    emit(format, &report, |r| {
        if quiet {
            return;
        }
        println!("Fetched:             {}", r.fetched);
        println!("Created:             {}", r.created);
        println!("Duplicates:          {}", r.duplicates);
        println!("Extraction failures: {}", r.extraction_failures);
        println!("Store failures:      {}", r.store_failures);
        println!("Relations saved:     {}", r.relations_saved);
    })
}

async fn cmd_relations(app: &App, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let pipeline = app.pipeline(Arc::new(StaticSource::default()))?;
    let report = pipeline.run_relations().await?;

    emit(format, &report, |r| {
        if quiet {
            return;
        }
        println!("Concepts analysed:  {}", r.total_concepts);
        if r.analysis_failed {
            println!("Relation analysis failed; see logs.");
            return;
        }
        println!("Candidates:         {}", r.candidates);
        println!("Saved:              {}", r.relations.saved);
        println!("Already stored:     {}", r.relations.skipped_duplicate);
        println!("Unresolved:         {}", r.relations.skipped_unresolved);
    })
}

async fn cmd_worker(app: &App, concurrency: Option<usize>, quiet: bool) -> anyhow::Result<()> {
    let mut runner = TaskRunner::new(app.synchronizer());
    match app
        .news_source(None)
        .and_then(|source| app.pipeline(source))
    {
        Ok(pipeline) => runner = runner.with_pipeline(pipeline),
        Err(e) => warn!(error = %e, "Ingestion tasks disabled for this worker"),
    }

    let mut pool = WorkerPool::new(app.queue(), Arc::new(runner), &app.config.worker);
    if let Some(concurrency) = concurrency {
        pool = pool.with_concurrency(concurrency);
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            signal.cancel();
        }
    });

    if !quiet {
        println!("Worker running. Press Ctrl-C to stop.");
    }
    pool.run(shutdown).await?;
    Ok(())
}

async fn cmd_enqueue(
    app: &App,
    action: EnqueueAction,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let task = match action {
        EnqueueAction::Ingest { max_articles } => Task::RunIngestion {
            max_articles: max_articles.unwrap_or(app.config.pipeline.max_articles),
        },
        EnqueueAction::Sync { user } => Task::SyncUserGraph { user_id: user },
    };
    let job_id = app.queue().enqueue(&task).await?;

    emit(
        format,
        &serde_json::json!({"job_id": job_id, "task": task}),
        |_| {
            if !quiet {
                println!("Queued job {}: {}", job_id, task);
            }
        },
    )
}

async fn cmd_sync(app: &App, user: i64, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let report = app.synchronizer().sync_user(user).await?;
    emit(format, &report, |r| {
        if !quiet {
            println!(
                "Synced user {} ({} concepts, {} relations) to {}",
                r.user_id,
                r.concepts,
                r.relations,
                app.graph.backend_name()
            );
        }
    })
}

async fn cmd_collect(
    app: &App,
    user: i64,
    concept: &str,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let service = CollectionService::new(app.db.pool().clone()).with_queue(app.queue());
    let result = match concept.trim().parse::<i64>() {
        Ok(id) => service.collect_concept(user, id).await,
        Err(_) => service.collect_by_name(user, concept).await,
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) if e.is_duplicate() => {
            if !quiet {
                println!("Already collected: {}", concept.trim());
            }
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    emit(format, &outcome, |o| {
        if quiet {
            return;
        }
        println!("Collected '{}'.", o.concept_name);
        if !o.new_connections.is_empty() {
            println!("Found {} strong connection(s):", o.new_connections.len());
            for c in &o.new_connections {
                let arrow = if c.outgoing { "->" } else { "<-" };
                println!("  {} {} [{}] (strength {})", arrow, c.name, c.relation_type.label(), c.strength);
            }
        }
    })
}

async fn cmd_collections(app: &App, user: i64, format: OutputFormat) -> anyhow::Result<()> {
    let collections = CollectionService::new(app.db.pool().clone())
        .list_collections(user)
        .await?;

    emit(format, &collections, |items| {
        if items.is_empty() {
            println!("No collected concepts.");
        }
        for item in items {
            println!(
                "{:>5}  {}  ({})",
                item.concept.id,
                item.concept.name,
                item.collected_at.format("%Y-%m-%d %H:%M")
            );
        }
    })
}

async fn cmd_map(app: &App, user: i64, format: OutputFormat) -> anyhow::Result<()> {
    let map = KnowledgeMapBuilder::new(app.db.pool().clone())
        .build_map(user)
        .await?;

    emit(format, &map, |m| {
        println!("{} concept(s), {} relation(s)", m.nodes.len(), m.edges.len());
        for node in &m.nodes {
            println!("  [{}] {}", node.id, node.data.concept.name);
        }
        for edge in &m.edges {
            println!("  {} --{}--> {}", edge.source, edge.label, edge.target);
        }
    })
}

async fn cmd_search(app: &App, names: &[String], format: OutputFormat) -> anyhow::Result<()> {
    let results = SearchService::new(app.db.pool().clone())
        .articles_by_concepts(names)
        .await?;

    emit(format, &results, |items| {
        if items.is_empty() {
            println!("No matching articles.");
        }
        for item in items {
            println!("{:>5}  {}", item.article.id, item.article.title);
            println!("       {}", item.article.original_url);
            let concepts: Vec<&str> = item.concepts.iter().map(|c| c.name.as_str()).collect();
            println!("       concepts: {}", concepts.join(", "));
            if !item.relative_concepts.is_empty() {
                let relatives: Vec<&str> =
                    item.relative_concepts.iter().map(|r| r.name.as_str()).collect();
                println!("       related:  {}", relatives.join(", "));
            }
        }
    })
}

async fn cmd_relatives(app: &App, article: i64, format: OutputFormat) -> anyhow::Result<()> {
    let relatives = RelativeSelector::new(app.db.pool().clone())
        .relatives(article)
        .await?;

    emit(format, &relatives, |items| {
        if items.is_empty() {
            println!("No relative concepts.");
        }
        for r in items {
            println!("{:>5}  {:<30} {:<14} {}", r.concept_id, r.name, r.relation_type.label(), r.strength);
        }
    })
}

async fn cmd_seed_user(
    app: &App,
    id: i64,
    username: &str,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let (user, created) = UserService::new(app.db.pool().clone())
        .ensure_user(id, username)
        .await?;

    emit(format, &serde_json::json!({"user": user, "created": created}), |_| {
        if quiet {
            return;
        }
        if created {
            println!("Created user {} ({}).", user.id, user.username);
        } else {
            println!("User {} ({}) already exists. Skipping seed.", user.id, user.username);
        }
    })
}

async fn cmd_jobs(app: &App, limit: i64, format: OutputFormat) -> anyhow::Result<()> {
    let queue = app.queue();
    let stats = queue.stats().await?;
    let recent = queue.recent(limit).await?;

    emit(
        format,
        &serde_json::json!({"stats": stats, "jobs": recent}),
        |_| {
            println!(
                "pending {}  running {}  done {}  dead {}",
                stats.pending, stats.running, stats.done, stats.dead
            );
            for job in &recent {
                println!(
                    "{:>5}  {:<16} {:<8} attempts {}/{}  {}",
                    job.id,
                    job.kind,
                    job.status,
                    job.attempts,
                    job.max_attempts,
                    job.last_error.as_deref().unwrap_or("")
                );
            }
        },
    )
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("ForeignEye Health Check");
        println!("=======================");
        println!();
    }

    let mut all_ok = true;
    let report = |ok: bool, line: String| {
        if !quiet {
            println!("{} {}", if ok { "[OK]" } else { "[!!]" }, line);
        }
    };

    let config = match Config::load() {
        Ok(config) => {
            report(true, "Configuration: Valid".to_string());
            config
        }
        Err(e) => {
            report(false, format!("Configuration: Error - {}", e));
            return Err(anyhow::anyhow!("Health check failed"));
        }
    };

    match config.llm.resolved_api_key() {
        Ok(Some(_)) => {
            let redacted = config.llm.redacted_api_key()?.unwrap_or_default();
            report(true, format!("LLM API key: Configured ({})", redacted));
        }
        Ok(None) => {
            all_ok = false;
            report(false, "LLM API key: Not configured".to_string());
            if !quiet {
                println!("     Set FOREIGNEYE_API_KEY or OPENROUTER_API_KEY environment variable");
            }
        }
        Err(e) => {
            all_ok = false;
            report(false, format!("LLM API key: Error - {}", e));
        }
    }

    match config.news.resolved_api_key() {
        Ok(Some(_)) => report(true, "News API key: Configured".to_string()),
        Ok(None) => {
            // Only needed for live ingestion; --from-file works without it.
            if !quiet {
                println!("[--] News API key: Not configured (set GNEWS_API_KEY)");
            }
        }
        Err(e) => {
            all_ok = false;
            report(false, format!("News API key: Error - {}", e));
        }
    }

    match Database::new(DatabaseConfig::from_settings(&config.database)).await {
        Ok(db) => {
            match db.health_check().await {
                Ok(()) => report(true, format!("Database: {}", db.path().display())),
                Err(e) => {
                    all_ok = false;
                    report(false, format!("Database: Error - {}", e));
                }
            }
            if let Ok(status) = db.migration_status().await {
                report(
                    !status.needs_migration,
                    format!(
                        "Schema: v{} (latest v{})",
                        status.current_version, status.target_version
                    ),
                );
            }
            if let Ok(stats) = JobQueue::new(db.pool().clone()).stats().await {
                report(
                    stats.dead == 0,
                    format!(
                        "Job queue: {} pending, {} running, {} dead",
                        stats.pending, stats.running, stats.dead
                    ),
                );
            }
            db.close().await;
        }
        Err(e) => {
            all_ok = false;
            report(false, format!("Database: Error - {}", e));
        }
    }

    match graph::connect(&config.graph).await {
        Ok(store) => match store.health_check().await {
            Ok(()) => report(true, format!("Graph view: {}", store.backend_name())),
            Err(e) => {
                all_ok = false;
                report(false, format!("Graph view: {} - {}", store.backend_name(), e));
            }
        },
        Err(e) => {
            all_ok = false;
            report(false, format!("Graph view: Error - {}", e));
        }
    }

    if !quiet {
        match Config::config_path() {
            Ok(path) if path.exists() => println!("[OK] Config file: {}", path.display()),
            Ok(path) => println!("[--] Config file: {} (using defaults)", path.display()),
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
        println!();
        if all_ok {
            println!("All checks passed.");
        } else {
            println!("Some checks need attention.");
        }
    }

    Ok(())
}
