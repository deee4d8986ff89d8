//! Dataprep processing server CLI
//!
//! Entry point for the `dataprep` command-line tool.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dataprep_processing::api::hash_token;
use dataprep_processing::config::{self, EffectiveConfig};
use dataprep_processing::pipeline::recover_interrupted_runs;
use dataprep_processing::seed::SeedFile;
use dataprep_processing::signal::{self, SignalState};
use dataprep_processing::store::{self, SCHEMA_VERSION};
use dataprep_processing::{open_store, telemetry, App, RunStore, ServerConfig};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "dataprep")]
#[command(about = "Dataset preparation processing server", version)]
struct Cli {
    /// Path to project config file (default: ./dataprep.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Override database.path (":memory:" for a throwaway database)
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Override server.bind
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Create or upgrade the database schema (not while a server holds it)
    Migrate,

    /// Load projects and sources from a TOML file (not while a server holds
    /// the database)
    Seed {
        /// Seed file with [[project]] and [[source]] tables
        file: PathBuf,
    },

    /// Print the effective configuration with provenance (secrets redacted)
    Config,

    /// Print the SHA-256 digest of a bearer token, for auth.tokens
    HashToken {
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let project_config = cli.config.unwrap_or_else(config::project_config_path);

    match cli.command {
        Commands::HashToken { token } => {
            println!("{}", hash_token(&token));
            Ok(())
        }
        Commands::Config => {
            let effective = load_config(&project_config, cli.database.as_deref(), None)?;
            println!("{}", effective.to_json()?);
            Ok(())
        }
        Commands::Migrate => {
            let settings = load_config(&project_config, cli.database.as_deref(), None)?.settings;
            telemetry::init(&settings.log)?;
            open_store(&settings.database).context("failed to open database")?;
            println!(
                "Database ready: {} (schema version {})",
                settings.database.path, SCHEMA_VERSION
            );
            Ok(())
        }
        Commands::Seed { file } => {
            let settings = load_config(&project_config, cli.database.as_deref(), None)?.settings;
            telemetry::init(&settings.log)?;
            let seed = SeedFile::load(&file)
                .with_context(|| format!("failed to load seed file {}", file.display()))?;
            let store = open_store(&settings.database).context("failed to open database")?;
            let summary = seed.apply(&store)?;
            println!(
                "Seeded {} project(s) and {} source(s) into {}",
                summary.projects, summary.sources, settings.database.path
            );
            Ok(())
        }
        Commands::Serve { bind } => {
            let settings = load_config(&project_config, cli.database.as_deref(), bind)?.settings;
            telemetry::init(&settings.log)?;
            serve(settings).await
        }
    }
}

fn load_config(
    project_config: &Path,
    database: Option<&str>,
    bind: Option<SocketAddr>,
) -> anyhow::Result<EffectiveConfig> {
    let mut overrides = Map::new();
    if let Some(path) = database {
        overrides.insert("database".to_string(), json!({ "path": path }));
    }
    if let Some(addr) = bind {
        overrides.insert("server".to_string(), json!({ "bind": addr.to_string() }));
    }
    let cli = (!overrides.is_empty()).then(|| Value::Object(overrides));

    let host = config::host_config_path();
    EffectiveConfig::build(host.as_deref(), Some(project_config), cli)
        .context("failed to load configuration")
}

async fn serve(settings: ServerConfig) -> anyhow::Result<()> {
    let store: Arc<dyn RunStore> =
        Arc::new(open_store(&settings.database).context("failed to open database")?);

    let recovered = store::blocking(&store, recover_interrupted_runs).await?;
    if !recovered.is_empty() {
        tracing::warn!(count = recovered.len(), "marked interrupted runs as failed");
    }
    if settings.auth.tokens.is_empty() {
        tracing::warn!("no auth.tokens configured; every processing request will be rejected");
    }

    let shutdown = CancellationToken::new();
    let signals = Arc::new(SignalState::new());
    tokio::spawn(signal::listen(Arc::clone(&signals), shutdown.clone()));

    let listener = TcpListener::bind(settings.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.server.bind))?;

    let app = App::new(&settings, store, shutdown.clone());
    app.serve(listener, shutdown, signals.grace_period()).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
