use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use sql_exporter::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let settings = config::load_settings(&args.config)?;
    init_tracing(&settings.server.log_level, settings.log_format());

    match args.get_command() {
        cli::Commands::Start => {
            commands::start::execute(settings).await?;
        }
        cli::Commands::Test => {
            commands::test::execute(&settings)?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&settings)?,
            cli::ConfigCommands::Validate => commands::config::validate(&settings)?,
        },
        cli::Commands::Version => {
            println!("SQL Exporter v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
