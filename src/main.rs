//! DEVON - Main entry point

use anyhow::Result;
use clap::Parser;
use devon::cli::{self, Cli, Context};
use devon::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for command output
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    // Load configuration
    let settings = Settings::load(cli.config)?;
    settings.validate()?;

    tracing::debug!(
        storage = ?settings.storage.base_path,
        default_source = %settings.sources.default,
        max_size_gb = ?settings.storage.max_size_gb,
        "Configuration loaded"
    );

    let ctx = Context::new(settings).await?;
    cli::run(cli.command, ctx).await
}
