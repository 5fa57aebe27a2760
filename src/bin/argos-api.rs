use std::sync::Arc;

use clap::Parser;
use tracing::{info, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use argos::api::{serve, ApiConfig, ApiState};
use argos::storage::SqliteStore;

#[derive(Debug, Clone, Parser)]
struct Args {
    /// SQLite database path; falls back to `$DATABASE_URL`, then `argos.db`.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Full bind address; overrides `--port`/`$API_PORT` when set.
    #[arg(long)]
    bind: Option<String>,

    /// Port to bind on `0.0.0.0`; falls back to `$API_PORT`, then 8081.
    #[arg(long, env = "API_PORT", default_value_t = 8081)]
    port: u16,
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

    let database_url = args.database_url.unwrap_or_else(|| "argos.db".to_string());

    let store = connect_with_retry(&database_url).await?;
    let state = ApiState::new(Arc::new(store));

    let bind_addr = match args.bind {
        Some(raw) => raw.parse()?,
        None => format!("0.0.0.0:{}", args.port).parse()?,
    };
    let config = ApiConfig { bind_addr };

    info!("starting API server on {}", config.bind_addr);
    serve(config, state).await
}

/// Up to 30 × 1s retries against the database, matching the documented
/// startup-failure exit condition (§6: "DB unreachable after 30 × 1s
/// retries").
async fn connect_with_retry(database_url: &str) -> anyhow::Result<SqliteStore> {
    let mut attempts = 0;
    loop {
        match SqliteStore::new(database_url).await {
            Ok(store) => return Ok(store),
            Err(e) if attempts < 30 => {
                attempts += 1;
                tracing::warn!("database unavailable ({e}), retrying ({attempts}/30)...");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
