use stockd::config::Config;
use stockd::ledger::Ledger;
use stockd::{logging, server};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Parse command line args
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_args(&args);

    let log = logging::init(&config.loglevel);

    let ledger = Arc::new(Ledger::with_shards(config.shards));
    let config = Arc::new(RwLock::new(config));

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received ctrl-c");
                on_signal.cancel();
            }
            Err(e) => tracing::warn!("Unable to listen for ctrl-c: {e}"),
        }
    });

    server::run_server(ledger, config, Some(log), shutdown).await
}
