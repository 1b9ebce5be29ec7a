//! FlashRESP - RESP echo server
//!
//! This is the main entry point for the FlashRESP server.
//! It loads the configuration, sets up logging, and serves connections with
//! the echo handler until Ctrl+C.

use clap::Parser;
use flashresp::connection::EchoHandler;
use flashresp::{listen_and_serve_with_signal, CliArgs, Config};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
FlashRESP v{} - RESP Protocol Core for FlashKV
──────────────────────────────────────────────────────────────
Server starting on {}
Max connections: {}

Use Ctrl+C to shutdown gracefully.
"#,
        flashresp::VERSION,
        config.address,
        match config.max_connect {
            0 => "unlimited".to_string(),
            n => n.to_string(),
        }
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Set up logging; RUST_LOG takes precedence over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = Config::load(&args)?;
    print_banner(&config);

    let handler = Arc::new(EchoHandler::new().with_idle_timeout(config.idle_timeout()));
    info!(
        address = %config.address,
        max_connect = config.max_connect,
        idle_timeout = ?config.idle_timeout(),
        "Echo handler initialized"
    );

    listen_and_serve_with_signal(config, handler).await
}
