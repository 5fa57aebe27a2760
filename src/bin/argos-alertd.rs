use std::sync::Arc;

use clap::Parser;
use tracing::{info, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use argos::alertd::{engine::Engine, loader::load_hybrid};
use argos::storage::SqliteStore;

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Local rules file, used as a fallback and as the mail/SMTP source;
    /// falls back to `$RULES_PATH`.
    #[arg(long, default_value = "rules.yaml", env = "RULES_PATH")]
    rules: String,

    /// Ingestion & query API base URL; falls back to `$API_URL`.
    #[arg(long, default_value = "http://localhost:8081", env = "API_URL")]
    api_url: String,

    /// SQLite database path; falls back to `$DATABASE_URL`, then `argos.db`.
    /// Used only to record active-alert rows; all metric reads go through
    /// `api_url`.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("argos=trace"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let cfg = load_hybrid(&args.api_url, &args.rules).await?;
    info!("loaded {} alert rules", cfg.rules.len());

    let database_url = args.database_url.unwrap_or_else(|| "argos.db".to_string());
    let store = SqliteStore::new(&database_url).await?;

    let engine = Engine::new(cfg.rules, args.api_url, cfg.email, Arc::new(store));
    engine.run().await;

    Ok(())
}
