//! Libris Server - Library Management System
//!
//! ```bash
//! libris-server                     # same as `serve`
//! libris-server serve               # start the REST API
//! libris-server init-database       # drop and recreate all tables
//! libris-server import-all --data-dir export/ --batch-size 500 --yes
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libris_server::{
    api,
    config::AppConfig,
    import::{discover_files, orchestrator::default_files},
    models::import_report::TableOutcome,
    repository::Repository,
    services::Services,
    AppState,
};

#[derive(Parser)]
#[command(name = "libris-server", version)]
#[command(about = "Library management server and legacy CSV importer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,

    /// Drop and recreate every table of the library schema
    InitDatabase {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Import all legacy CSV files in dependency order
    ImportAll {
        /// Directory holding the CSV export (default from config)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Rows per committed batch (default from config)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Skip rows whose natural key already exists (default from config)
        #[arg(long)]
        skip_duplicates: Option<bool>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Validate the import against an in-memory store
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::InitDatabase { yes } => init_database(config, yes).await,
        Commands::ImportAll {
            data_dir,
            batch_size,
            skip_duplicates,
            yes,
            dry_run,
        } => import_all(config, data_dir, batch_size, skip_duplicates, yes, dry_run).await,
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("libris_server={},tower_http=debug", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn connect(config: &AppConfig, lazy: bool) -> anyhow::Result<Pool<Postgres>> {
    let options = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections);

    let pool = if lazy {
        options.connect_lazy(&config.database.url)?
    } else {
        let pool = options
            .connect(&config.database.url)
            .await
            .context("Failed to connect to database")?;
        tracing::info!("Connected to database");
        pool
    };
    Ok(pool)
}

fn build_services(config: &AppConfig, pool: Pool<Postgres>) -> anyhow::Result<Services> {
    Services::new(Repository::new(pool), config).context("Failed to create services")
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Libris Server v{}", env!("CARGO_PKG_VERSION"));

    let pool = connect(&config, false).await?;
    let services = build_services(&config, pool)?;

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };
    let app = api::create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn init_database(config: AppConfig, yes: bool) -> anyhow::Result<()> {
    if !yes && !confirm("This drops every library table and all its data. Continue?")? {
        println!("Initialization cancelled");
        return Ok(());
    }

    let pool = connect(&config, false).await?;
    let services = build_services(&config, pool)?;
    let tables = services.import.init_database().await?;

    println!("Database initialized: {} tables created", tables);
    Ok(())
}

async fn import_all(
    config: AppConfig,
    data_dir: Option<PathBuf>,
    batch_size: Option<usize>,
    skip_duplicates: Option<bool>,
    yes: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let data_dir = data_dir.unwrap_or_else(|| config.import.data_dir.clone());

    if !yes {
        println!("This will import data from the following files:");
        for (_, file) in default_files() {
            println!("  - {}", data_dir.join(file).display());
        }
        if !confirm("Continue with import?")? {
            println!("Import cancelled");
            return Ok(());
        }
    }

    let (files, missing) = discover_files(&data_dir);
    if !missing.is_empty() {
        eprintln!("Warning: Missing files: {}", missing.join(", "));
    }
    if files.is_empty() {
        anyhow::bail!("No valid files found to import in {}", data_dir.display());
    }

    // A dry run never touches the database
    let pool = connect(&config, dry_run).await?;
    let services = build_services(&config, pool)?;
    let options = services.import.options(batch_size, skip_duplicates);
    let report = services.import.import_files(&files, &options, dry_run).await?;

    println!("\nImport results:");
    for (table, outcome) in &report.tables {
        match outcome {
            TableOutcome::Imported { count } => println!("  - {}: {} records imported", table, count),
            TableOutcome::Failed { error } => eprintln!("  - {}: ERROR - {}", table, error),
        }
    }
    println!("\nTotal records imported: {}", report.total_imported());
    if dry_run {
        println!("(dry run, nothing was written)");
    }

    Ok(())
}
