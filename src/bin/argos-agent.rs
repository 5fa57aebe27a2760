use clap::Parser;
use tracing::{info, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use argos::agent::{config::read_config_file, scheduler::Scheduler};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Agent config file (YAML); falls back to `$CONFIG_PATH`.
    #[arg(short, long, default_value = "config.yaml", env = "CONFIG_PATH")]
    config: String,
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

    let config = read_config_file(&args.config)?.resolve();
    info!(
        "agent {} resolved: {} http, {} dns, {} smtp, {} icmp, {} sql targets",
        config.agent_id,
        config.http.len(),
        config.dns.len(),
        config.smtp.len(),
        config.icmp.len(),
        config.sql.len(),
    );

    Scheduler::new(config).run().await;

    Ok(())
}
