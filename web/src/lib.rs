use axum::http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use log::*;
use service::config::Config;
use time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

pub use service::AppState;

mod controller;
mod error;
mod extractors;
mod router;
mod sse;

pub use error::{Error, Result};
pub use extractors::authenticated_user::USER_ID_KEY;

/// Serves the API until the application's shutdown signal flips, then
/// waits for open connections (including notification streams) to end.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    debug!("Using in-memory session store");

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(app_state.config.is_production())
        .with_expiry(Expiry::OnInactivity(Duration::seconds(
            app_state.config.backend_session_expiry_seconds as i64,
        )));

    let cors_layer = cors_layer(&app_state.config);
    let mut shutdown = app_state.shutdown_signal();

    let server_url = format!("{}:{}", app_state.config.interface(), app_state.config.port);
    let listener = TcpListener::bind(&server_url).await?;

    info!("Server starting... listening for connections on http://{server_url}");

    let router = router::define_routes(app_state)
        .layer(session_layer)
        .layer(cors_layer);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            // An error means every sender is gone, which is as good as a shutdown.
            let _ = shutdown.wait_for(|stop| *stop).await;
            info!("Server shutting down, draining open connections");
        })
        .await
}

// Browsers only send the session cookie cross-origin in credentials mode, which
// requires explicit origins. With no usable origins configured CORS stays permissive
// and cookies are not shared.
fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid allowed origin {origin}");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_methods([Method::GET])
            .allow_headers(Any)
            .allow_origin(Any)
    } else {
        CorsLayer::new()
            .allow_methods([Method::GET])
            .allow_headers([ACCEPT, CACHE_CONTROL, CONTENT_TYPE])
            .allow_credentials(true)
            .allow_origin(origins)
    }
}
