//! township-node: HTTP service for the TownShip civic report lifecycle

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use township_node::{create_router, AppState, Config};

#[derive(Parser)]
#[command(name = "township-node")]
#[command(about = "HTTP service for the TownShip civic report lifecycle")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "township-node.toml")]
    config: String,

    /// HTTP port (overrides config file)
    #[arg(long, env = "TOWNSHIP_HTTP_PORT")]
    http_port: Option<u16>,

    /// Up-votes needed for community status (overrides config file)
    #[arg(long, env = "TOWNSHIP_COMMUNITY_THRESHOLD")]
    community_threshold: Option<u32>,

    /// Emit logs as JSON
    #[arg(long, env = "TOWNSHIP_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::from_default_env()
        .add_directive("township_node=info".parse()?)
        .add_directive("township_lifecycle=info".parse()?);
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting township-node");
    info!("Config file: {}", cli.config);

    let mut config = Config::load(&cli.config)?;

    // Apply CLI overrides
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(threshold) = cli.community_threshold {
        config.lifecycle.escalation.community_threshold = threshold;
    }
    config.validate()?;

    info!(
        node = %config.node.name,
        community_threshold = config.lifecycle.escalation.community_threshold,
        inbox_per_report = config.inbox.max_per_report,
        "Configuration loaded"
    );

    let addr = config.listen_addr();
    let app = create_router(AppState::new(config));

    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
