use broker::Broker;
use config::Config;
use log::info;
use notifications::Pipeline;
use std::sync::Arc;
use tokio::sync::watch;

pub mod config;
pub mod logging;

/// Builds this instance's notification pipeline on top of the shared broker.
pub fn init_pipeline(config: &Config, broker: Arc<dyn Broker>) -> Pipeline {
    let settings = config.notification_settings();
    info!(
        "Notification pipeline config: debounce_window={}ms, heartbeat_interval={}s, \
         job_ttl={}s, listener_backoff_max={}s",
        settings.debounce_window.as_millis(),
        settings.heartbeat_interval.as_secs(),
        settings.job_ttl.as_secs(),
        settings.listener_backoff.max_delay().as_secs(),
    );

    Pipeline::new(broker, settings)
}

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: Pipeline,
    shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(app_config: Config, pipeline: Pipeline, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            config: app_config,
            pipeline,
            shutdown,
        }
    }

    pub fn broker(&self) -> Arc<dyn Broker> {
        Arc::clone(self.pipeline.broker())
    }

    /// Flips to `true` when the process starts shutting down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }
}
