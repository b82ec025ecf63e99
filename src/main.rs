//! CLI for topichub
//!
//! Subcommands:
//! - `server`: run the WebSocket hub
//! - `client`: run a simple example client (useful for smoke tests)

use clap::Parser;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use topichub::broker::Router;
use topichub::client::HubProxy;
use topichub::config::{Settings, load_config};
use topichub::transport::websocket::{WsConnection, start_websocket_server};
use topichub::utils::HubError;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "topichub")]
enum Command {
    /// Start the WebSocket hub
    Server,
    /// Run the example client (connects, subscribes, sends one message)
    Client {
        /// WebSocket hub URL to connect to (default: ws://127.0.0.1:8080)
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        /// Topic to subscribe and publish to
        #[arg(long, default_value = "chat")]
        topic: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cmd = Command::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    topichub::utils::logging::init(&config.log.level);

    match cmd {
        Command::Server => {
            if let Err(e) = run_server(config).await {
                error!("Server failed: {}", e);
            }
        }
        Command::Client { url, topic } => {
            if let Err(e) = run_client(&url, &topic).await {
                error!("Client failed: {}", e);
            }
        }
    }
}

async fn run_server(config: Settings) -> Result<(), HubError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let router = Arc::new(Mutex::new(Router::new()));

    tokio::select! {
        result = start_websocket_server(&addr, router) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_client(url: &str, topic: &str) -> Result<(), HubError> {
    let proxy = HubProxy::new(WsConnection::new(url));
    proxy.connect().await?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    proxy
        .subscribe(topic, move |text: String| {
            let _ = tx.send(text);
        })
        .await?;

    proxy
        .send(topic, &"Hello from the example client".to_string())
        .await?;

    match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        Ok(Some(text)) => info!("Received on '{topic}': {text}"),
        _ => warn!("No message received on '{topic}'"),
    }

    proxy.disconnect().await;
    Ok(())
}
