//! Entry point for the `jeux` game server.
//!
//! Wires together the CLI config, the listening socket, and the shared
//! session/player registries, then runs the accept loop until `SIGHUP`.

mod config;
mod dispatch;
mod error;
mod server;

use clap::Parser;
use tokio::net::TcpListener;

use config::Config;
use error::JeuxError;
use server::AppState;

#[tokio::main]
async fn main() -> Result<(), JeuxError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let state = AppState::new();

    server::run(listener, state).await
}
