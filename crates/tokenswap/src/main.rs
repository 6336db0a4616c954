//! Tokenswap - OAuth token exchange relay for native clients
//!
//! Main entry point for the tokenswap CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{start, token};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Tokenswap - OAuth token exchange relay for native clients
#[derive(Parser)]
#[command(name = "tokenswap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the token relay server
    Start(start::StartArgs),

    /// Encrypt or decrypt refresh tokens with the configured cipher
    Token(token::TokenArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "tokenswap=debug,tokenswap_relay=debug,tokenswap_config=debug,tower_http=debug,info"
    } else {
        "tokenswap=info,tokenswap_relay=info,warn"
    };

    let log_dir = tokenswap_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tokenswap.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "tokenswap=trace,tokenswap_relay=trace,tokenswap_config=trace,tower_http=debug,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Token(args) => token::run(args, &ctx),
    }
}
