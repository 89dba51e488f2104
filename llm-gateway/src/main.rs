//! # LLM Gateway Binary
//!
//! Entry point for the standalone gateway process.
//!
//! ## Usage
//!
//! ```bash
//! llm-gateway --config gateway.toml
//! llm-gateway --host 0.0.0.0 --port 8080
//! llm-gateway --log-level debug
//! ```

use clap::Parser;
use std::net::SocketAddr;

use llm_gateway::{config::Config, create_server};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: String,

    /// Port number for the HTTP server.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Host address to bind the server to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Logging level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt().with_env_filter(&args.log_level).init();

    let mut config = Config::load(&args.config)?;
    if args.host != "127.0.0.1" {
        config.server.host = args.host.clone();
    }
    if args.port != 3000 {
        config.server.port = args.port;
    }
    config.validate()?;

    let app = create_server(config.clone()).await?;

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("starting llm-gateway on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
