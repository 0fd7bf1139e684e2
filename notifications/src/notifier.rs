use crate::debounce::DebounceStore;
use crate::error::Result;
use crate::keys::DebounceKey;
use crate::topic::EventDelta;
use log::*;

/// Result of queueing a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queued {
    /// The event started a new debounce cycle; a flush is scheduled.
    ArmedTimer,
    /// The event joined a cycle whose flush is already scheduled.
    Merged,
}

/// Notification publisher: the sole write entry point into the pipeline.
///
/// Many events queued for the same (user, topic) within one debounce window
/// collapse into exactly one scheduled flush. Queueing never waits for
/// delivery.
#[derive(Clone)]
pub struct Notifier {
    store: DebounceStore,
}

impl Notifier {
    pub fn new(store: DebounceStore) -> Self {
        Self { store }
    }

    /// Merges `delta` into the user's pending aggregate for the delta's topic
    /// and arms the debounce timer if none is running.
    ///
    /// The merge happens first: if arming then fails, the pending data is
    /// still there and the next event for the key arms the timer.
    pub async fn queue_event(&self, user_id: &str, delta: EventDelta) -> Result<Queued> {
        let key = DebounceKey::new(user_id, delta.topic())?;

        self.store.merge(&key, &delta).await?;

        if self.store.arm_timer(&key).await? {
            debug!(
                "Armed {}ms debounce timer for {key}",
                self.store.window().as_millis()
            );
            Ok(Queued::ArmedTimer)
        } else {
            trace!("Merged event into pending debounce cycle for {key}");
            Ok(Queued::Merged)
        }
    }
}
