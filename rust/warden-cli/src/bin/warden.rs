use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use warden_cli::{
    ALLOW_FAIL_OPEN_VAR, Config, Services,
    cli::{WardenCli, execute},
};

#[tokio::main]
pub async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = WardenCli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %cli.config.display(), error = %e, "Failed to load configuration");
            return Err(anyhow::anyhow!("invalid configuration: {e}"));
        }
    };

    let allow_override = std::env::var(ALLOW_FAIL_OPEN_VAR).is_ok_and(|value| !value.is_empty());
    let services = Services::build(&config, allow_override)?;
    services.start().await;

    let output = execute(&cli.command, &services).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
