//! malpac - Main Entry Point

use clap::Parser;
use malpac::cli::{cmd_predict, cmd_train, load_settings, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "malpac=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_deref())?;

    match &cli.command {
        Commands::Train(args) => cmd_train(&settings, args)?,
        Commands::Predict(args) => cmd_predict(&settings, args)?,
    }

    Ok(())
}
