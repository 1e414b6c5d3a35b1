//! Grantflow server binary

use anyhow::Context;
use clap::Parser;
use grantflow::ai::HttpAiClient;
use grantflow::catalog::QuestionCatalog;
use grantflow::cli::{Cli, Command};
use grantflow::config::Config;
use grantflow::error::Result;
use grantflow::interpreter::AnswerInterpreter;
use grantflow::recommend::RecommendationService;
use grantflow::server::{self, AppState};
use grantflow::storage::{Grant, SqliteStorage};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db_path) = &cli.db_path {
        config.db_path = Some(db_path.clone());
    }

    let storage = Arc::new(match &config.db_path {
        Some(path) => SqliteStorage::new_with_path(path.clone())?,
        None => SqliteStorage::new()?,
    });

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config, storage).await
        }
        Command::SeedGrants { file } => seed_grants(&file, &storage),
    }
}

async fn serve(config: Config, storage: Arc<SqliteStorage>) -> Result<()> {
    let catalog = Arc::new(match &config.catalog_path {
        Some(path) => QuestionCatalog::load(path)?,
        None => QuestionCatalog::default(),
    });

    let ai = Arc::new(HttpAiClient::new(config.ai.clone())?);
    let interpreter = Arc::new(AnswerInterpreter::new(ai.clone()));
    let recommender = Arc::new(RecommendationService::new(
        storage.clone(),
        ai,
        config.matching.top_n,
        config.matching.relaxation_order.clone(),
    ));

    let state = AppState {
        storage,
        catalog,
        interpreter,
        recommender,
    };
    server::serve(state, &config).await
}

fn seed_grants(file: &std::path::Path, storage: &SqliteStorage) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let grants: Vec<Grant> =
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", file.display()))?;
    let count = storage.seed_grants(&grants)?;
    tracing::info!("Seeded {} grant records", count);
    println!("Seeded {} grant records", count);
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "grantflow=debug"
    } else {
        "grantflow=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
