use clap::Parser;
use env_logger::Env;

use caliper::config::{CliConfig, ServerConfig};
use caliper::server;

/// Conversational NL-to-SQL service for a relational healthcare database.
#[derive(Parser, Debug)]
#[command(name = "caliper", version, about)]
struct Cli {
    /// HTTP host to bind (overrides CALIPER_HOST)
    #[arg(long)]
    host: Option<String>,

    /// HTTP port to bind (overrides CALIPER_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Maximum generate-validate cycles per turn (overrides CALIPER_MAX_ATTEMPTS)
    #[arg(long)]
    max_attempts: Option<u8>,

    /// Path to a YAML catalog overlay (overrides CALIPER_CATALOG_OVERLAY)
    #[arg(long)]
    catalog_overlay: Option<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env().and_then(|config| {
        config.apply_cli(CliConfig {
            http_host: cli.host,
            http_port: cli.port,
            max_attempts: cli.max_attempts,
            catalog_overlay: cli.catalog_overlay,
        })
    });

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server::run_with_config(config).await {
        log::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}
