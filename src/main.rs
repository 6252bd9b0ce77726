use anyhow::Result;
use clap::Parser;
use sheet_bridge::cli;
use sheet_bridge::config::BridgeConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli_args = cli::Cli::parse();
    let config = BridgeConfig::from_args(cli_args.config)?;
    init_logging(&config.log_filter);
    tracing::debug!(workspace = %config.workspace_root.display(), "configuration loaded");

    let payload = cli::run_command(config, cli_args.command).await?;
    cli::output::emit_value(&payload, cli_args.compact)?;
    Ok(())
}
