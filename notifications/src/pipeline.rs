use crate::debounce::DebounceStore;
use crate::domain_event_handler::NotificationEventHandler;
use crate::flush::FlushEngine;
use crate::jobs::JobStore;
use crate::listener::{ExpiryListener, ListenerHandle};
use crate::notifier::Notifier;
use crate::settings::Settings;
use broker::Broker;
use events::EventPublisher;
use std::sync::Arc;

/// The notification components of one backend instance, wired to a shared
/// broker.
#[derive(Clone)]
pub struct Pipeline {
    broker: Arc<dyn Broker>,
    settings: Settings,
    notifier: Notifier,
    flush: FlushEngine,
    events: EventPublisher,
    jobs: JobStore,
}

impl Pipeline {
    pub fn new(broker: Arc<dyn Broker>, settings: Settings) -> Self {
        let store = DebounceStore::new(Arc::clone(&broker), settings.debounce_window);
        let notifier = Notifier::new(store.clone());
        let flush = FlushEngine::new(Arc::clone(&broker), store);
        let events = EventPublisher::new()
            .with_handler(Arc::new(NotificationEventHandler::new(notifier.clone())));
        let jobs = JobStore::new(Arc::clone(&broker), settings.job_ttl)
            .with_event_publisher(events.clone());

        Self {
            broker,
            settings,
            notifier,
            flush,
            events,
            jobs,
        }
    }

    /// Starts this instance's timer expiry listener.
    pub fn spawn_listener(&self) -> ListenerHandle {
        ExpiryListener::new(
            Arc::clone(&self.broker),
            self.flush.clone(),
            self.settings.listener_backoff,
        )
        .spawn()
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Publisher that backend components use to report domain events.
    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }
}
