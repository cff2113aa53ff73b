//! Cirrus CLI - Main entry point.

use cirrus::classify::ClassificationEngine;
use cirrus::cli::{Cli, Commands};
use cirrus::config::CirrusConfig;
use cirrus::types::RequestMeta;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Serve {
            bind,
            origin,
            prerender_dir,
            metrics_addr,
        } => {
            // Build configuration from file or defaults, then apply CLI args
            let mut config = match &cli.config {
                Some(config_path) => CirrusConfig::from_file(config_path)?,
                None => CirrusConfig::development(),
            };
            config.gateway.bind_addr = bind.parse()?;
            if let Some(origin) = origin {
                config.gateway.origin_url = origin;
            }
            if prerender_dir.is_some() {
                config.gateway.prerender_dir = prerender_dir;
            }
            if let Some(addr) = metrics_addr {
                config.observability.metrics_enabled = true;
                config.observability.metrics_addr = addr.parse()?;
            }
            config.observability.log_level = cli.log_level;
            config.validate()?;

            cirrus::run(config).await?;
        }

        Commands::Classify {
            user_agent,
            remote_addr,
            path,
        } => {
            let config = match &cli.config {
                Some(config_path) => CirrusConfig::from_file(config_path)?,
                None => CirrusConfig::development(),
            };
            let engine = ClassificationEngine::new(config.classifier);

            let mut meta = RequestMeta::get(&path).with_header("user-agent", &user_agent);
            if let Some(addr) = remote_addr {
                meta = meta.with_remote_addr(&addr);
            }

            let result = engine.classify(&meta);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Version => {
            println!("Cirrus v{}", env!("CARGO_PKG_VERSION"));
            println!("Edge traffic-shaping and caching pipeline");
        }
    }

    Ok(())
}
