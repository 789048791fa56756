mod cli;
mod lsp;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Cli, Commands};

const LOG_ENV: &str = "BITBAKE_LS_LOG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env(LOG_ENV)
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| "bitbake_ls=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            tracing::info!("starting bitbake-ls {}", env!("CARGO_PKG_VERSION"));
            lsp::serve_stdio().await;
        }
        Commands::Shadow { file, language, offsets } => {
            cli::print_shadow(&file, language, offsets)?;
        }
        Commands::Declarations { file, format } => {
            cli::print_declarations(&file, &format)?;
        }
        Commands::Resolve {
            file,
            layers,
            inventory,
            trace,
        } => {
            cli::resolve_directives(&file, layers, inventory, trace)?;
        }
        Commands::Scan { roots, watch } => {
            cli::scan_layers(&roots, watch)?;
        }
        Commands::Check { paths } => {
            if cli::check_paths(&paths)? > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
