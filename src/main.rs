use broker::{Broker, MemoryBroker};
use log::*;
use service::{config::Config, logging::Logger, AppState};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config);

    info!(
        "Starting up feed notify backend in {} mode",
        config.runtime_env()
    );

    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
    let pipeline = service::init_pipeline(&config, broker);
    let listener = pipeline.spawn_listener();

    let (shutdown, shutdown_rx) = watch::channel(false);
    let signal = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for the shutdown signal: {e}");
            // Keep the sender alive so open streams are not torn down.
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = shutdown.send(true);
    });

    let app_state = AppState::new(config, pipeline, shutdown_rx);
    if let Err(e) = web::init_server(app_state).await {
        error!("Server stopped with an error: {e}");
    }

    signal.abort();
    listener.shutdown().await;
    info!("Feed notify backend stopped");
}
