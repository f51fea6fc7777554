use std::io;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use simrelay_cli::app::{self, Session};
use simrelay_cli::cli::Cli;
use simrelay_cli::console::ConsoleFrontend;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stderr; RUST_LOG wins over the flags
    let env_filter = EnvFilter::builder()
        .with_default_directive(cli.level_filter().into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    let config = cli.relay_config()?;
    let frontend = ConsoleFrontend::new(io::stdin().lock(), io::stdout());
    let code = app::run(config, Session::from_cli(&cli), frontend)?;
    std::process::exit(code);
}
