//! Forward HTTP proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                    FORWARD PROXY                      │
//!   Client        │  ┌──────────┐   ┌───────────┐   ┌─────────────────┐  │
//!   ──────────────┼─▶│   net    │──▶│  session  │──▶│ http::assembler │  │
//!                 │  │ listener │   │   task    │   │ http::request   │  │
//!                 │  └──────────┘   └─────┬─────┘   └─────────────────┘  │
//!                 │                       │                               │
//!                 │          CONNECT ◀────┴────▶ other methods            │
//!                 │       ┌──────────────┐   ┌──────────────────────┐    │
//!                 │       │ tunnel: 200/ │   │ forward: rewrite req │    │   Target
//!                 │       │ 502 + relay  │   │ rewrite resp + relay │────┼──▶ host
//!                 │       └──────────────┘   └──────────────────────┘    │
//!                 │                                                       │
//!                 │  config · lifecycle · observability · resilience      │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use forward_proxy::config::{read_config, validate_config, ConfigError, ProxyConfig};
use forward_proxy::lifecycle::{signals, Shutdown};
use forward_proxy::net::Listener;
use forward_proxy::observability::{logging, metrics};
use forward_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "forward-proxy")]
#[command(about = "Forward HTTP proxy with CONNECT tunnelling", long_about = None)]
struct Cli {
    /// Port to listen on.
    port: Option<u16>,

    /// Address to bind.
    #[arg(short, long)]
    bind: Option<String>,

    /// TOML configuration file. Command-line values take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ProxyConfig::default(),
        };
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init_logging(&config.observability.log_filter);
    tracing::info!(
        bind_address = %config.listener.bind_address,
        port = config.listener.port,
        max_connections = config.listener.max_connections,
        connect_timeout_secs = ?config.timeouts.connect_secs,
        half_close = config.relay.half_close,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    tokio::spawn(signals::trigger_on_signal(shutdown));

    let server = ProxyServer::new(&config);
    server.run(listener, stop).await?;

    // In-flight sessions are not drained.
    tracing::info!("Shutdown complete");
    std::process::exit(0);
}
