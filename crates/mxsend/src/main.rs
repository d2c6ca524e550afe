//! `mxsend` - Outbound mail submission over HTTP
//!
//! Accepts delivery requests as JSON and relays each message through the
//! mail exchangers of the sender's domain (or the recipient's, if configured).

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod server;
mod settings;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use mxsend_smtp::{Dispatcher, DnsLookup, TcpTransport};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "mxsend", version, about = "Relay mail to MX hosts over HTTP")]
struct Args {
    /// Settings file (default: <config dir>/mxsend/settings.json).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the settings file.
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mxsend=info,mxsend_smtp=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut settings = settings::load(args.config.as_deref()).await?;
    if let Some(listen) = args.listen {
        settings.listen = listen;
    }

    info!(helo = %settings.helo_name, "Starting mxsend");

    let config = settings.to_config();
    let transport = TcpTransport::new(config.connect_timeout);
    let dispatcher = Dispatcher::new(config, DnsLookup::from_system_conf()?, transport).await?;

    server::serve(settings.listen, server::router(Arc::new(dispatcher))).await
}
