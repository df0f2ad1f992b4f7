//! Ghost CLI - install, configure and run self-hosted Ghost blogs
//!
//! This is the main entry point for the ghost command-line interface.

mod cli;
mod commands;
mod output;
mod ui;
mod version;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;

#[tokio::main]
async fn main() {
    // Initialize rustls crypto provider (required for rustls 0.23+)
    // This must be done before any TLS operations
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse_from(cli::normalize_args(std::env::args()));
    init_tracing(cli.verbose);
    install_panic_hook();

    let verbose = cli.verbose > 0;
    if let Err(err) = commands::run(cli).await {
        output::report_error(&err, verbose);
        std::process::exit(1);
    }
}

/// Step progress is rendered by the UI, so logs stay at `warn` unless asked
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Log panics before the default hook prints them
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("Unexpected failure: {}", info);
        default_hook(info);
    }));
}
