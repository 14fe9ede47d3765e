mod cli;
mod commands;
mod config;
mod storage;

use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Init => {
            let path = storage::store_path(cli.store.as_deref(), &config)?;
            let store = storage::init_store(&path, &config).await?;
            println!(
                "Store ready at {} ({} records)",
                path.display(),
                store.ids().await.len()
            );
        }
        command => {
            let path = storage::store_path(cli.store.as_deref(), &config)?;
            let store = storage::open_store(&path, &config).await?;
            let password = commands::resolve_password(cli.password);
            let output = commands::run(&command, &store, password.as_deref()).await?;
            print!("{output}");
        }
    }

    Ok(())
}

fn init_tracing() {
    // Logs go to stderr so command output stays pipeable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("keystash {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
