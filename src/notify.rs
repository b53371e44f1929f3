use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Live feed of committed calendar changes, one broadcast channel per provider.
///
/// A provider dashboard subscribes and refreshes on every event. Slow
/// subscribers lag and lose events (`RecvError::Lagged`); they are expected
/// to re-read the agenda when that happens.
#[derive(Default)]
pub struct CalendarFeed {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl CalendarFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a provider's changes. Creates the channel if needed.
    pub fn subscribe(&self, provider_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(provider_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a committed event. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        let provider_id = event.provider_id();
        let orphaned = match self.channels.get(&provider_id) {
            Some(sender) => sender.send(event.clone()).is_err(),
            None => false,
        };
        // Every receiver was dropped; forget the channel until someone resubscribes.
        if orphaned {
            self.channels
                .remove_if(&provider_id, |_, sender| sender.receiver_count() == 0);
        }
    }

    pub fn remove(&self, provider_id: &Ulid) {
        self.channels.remove(provider_id);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
