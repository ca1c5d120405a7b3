use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

use photon_types::PhotoDigest;

use crate::catalog::BackupState;

/// Typed engine events published to UI-layer subscribers.
///
/// Fire-and-forget: publishing never blocks and never fails; subscribers
/// that dropped their receiver are pruned on the next publish.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A new catalog version was published locally.
    CatalogPublished { version: u64, pointer: PhotoDigest },
    /// The local catalog was replaced by a newer remote version.
    CatalogSynced {
        pointer: PhotoDigest,
        changed_shards: usize,
    },
    /// A photo's backup state changed.
    BackupStateChanged {
        photo_key: String,
        state: BackupState,
    },
    /// An upload failed; `transient` distinguishes retryable network
    /// failures from permanent source/content failures.
    UploadFailed { photo_key: String, transient: bool },
    /// A thumbnail became available in the local cache.
    ThumbnailReady { digest: PhotoDigest },
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<EngineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub fn publish(&self, event: EngineEvent) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_published_events() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        bus.publish(EngineEvent::ThumbnailReady {
            digest: PhotoDigest::compute(b"t"),
        });
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::ThumbnailReady { .. }
        ));
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish(EngineEvent::UploadFailed {
            photo_key: "k".into(),
            transient: true,
        });
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        bus.publish(EngineEvent::UploadFailed {
            photo_key: "k".into(),
            transient: false,
        });
        assert!(bus.subscribers.lock().unwrap().is_empty());
    }

    #[test]
    fn multiple_subscribers_each_receive() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();
        bus.publish(EngineEvent::BackupStateChanged {
            photo_key: "k".into(),
            state: BackupState::Queued,
        });
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
