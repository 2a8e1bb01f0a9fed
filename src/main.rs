//! FlashResp - The Network Core of a Redis-Compatible Server
//!
//! This is the main entry point for the FlashResp server.
//! It parses flags, sets up logging, and serves connections until a
//! termination signal arrives.

use anyhow::Context;
use clap::Parser;
use flashresp::{Args, CommandHandler, Server, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
FlashResp v{} - Redis-Protocol Server Core
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        flashresp::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Set up logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = ServerConfig::from(args);

    // Bind the TCP listener
    let server = Server::bind(&config, CommandHandler::new())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    print_banner(&config);
    info!(
        drain_timeout_secs = config.drain_timeout.as_secs(),
        max_bulk_len = config.limits.max_bulk_len,
        "Server configured"
    );

    server.run().await;

    Ok(())
}
