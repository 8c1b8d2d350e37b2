//! Change notification bus.
//!
//! Broadcast fan-out decoupling producers (coordinator, refresh loop) from consumers
//! (list screens, add/remove modals). Delivery is in publish order to all currently
//! subscribed consumers; there is no replay - a late subscriber has missed past events
//! and must request a fresh snapshot to catch up.

use crate::{entry::CoinId, mutation::MutationAction};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// Default broadcast buffer capacity. A consumer further behind than this observes
/// `Lagged` and must resubscribe and resnapshot.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Events published after engine state changes become visible.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchlistEvent {
    /// A batch mutation committed; `affected` holds the ids that actually changed.
    WatchlistChanged {
        action: MutationAction,
        affected: Vec<CoinId>,
    },
    /// A refresh tick materially changed the quotes for `affected`.
    QuotesChanged { affected: Vec<CoinId> },
    /// A refresh tick failed; non-fatal, the loop continues on the next tick.
    RefreshFailed { reason: String },
}

/// Publish point for [`WatchlistEvent`]s.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<WatchlistEvent>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to events published from this point on. Dropping the subscription
    /// unsubscribes; events published after the drop are never delivered.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Publish to all current subscribers. Publishing with no subscribers is not an
    /// error - events are fire-and-forget.
    pub fn publish(&self, event: WatchlistEvent) {
        let receivers = self.tx.receiver_count();
        debug!(?event, receivers, "publishing watchlist event");
        let _ = self.tx.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live subscription to the bus.
#[derive(Debug)]
pub struct EventSubscription {
    rx: broadcast::Receiver<WatchlistEvent>,
}

impl EventSubscription {
    /// Receive the next event, waiting if none is buffered.
    pub async fn recv(&mut self) -> Result<WatchlistEvent, broadcast::error::RecvError> {
        self.rx.recv().await
    }

    /// Receive the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Result<WatchlistEvent, broadcast::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Adapt the subscription into a `Stream` of events.
    pub fn into_stream(self) -> BroadcastStream<WatchlistEvent> {
        BroadcastStream::new(self.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[tokio::test]
    async fn test_events_delivered_in_publish_order() {
        let bus = NotificationBus::default();
        let mut subscription = bus.subscribe();

        bus.publish(WatchlistEvent::QuotesChanged {
            affected: vec![CoinId(1)],
        });
        bus.publish(WatchlistEvent::RefreshFailed {
            reason: "rate limited".to_string(),
        });

        assert_eq!(
            subscription.recv().await.unwrap(),
            WatchlistEvent::QuotesChanged {
                affected: vec![CoinId(1)]
            }
        );
        assert_eq!(
            subscription.recv().await.unwrap(),
            WatchlistEvent::RefreshFailed {
                reason: "rate limited".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_no_replay() {
        let bus = NotificationBus::default();
        bus.publish(WatchlistEvent::QuotesChanged {
            affected: vec![CoinId(1)],
        });

        let mut late = bus.subscribe();
        assert_eq!(late.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_receiving() {
        let bus = NotificationBus::default();
        let subscription = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);

        drop(subscription);
        assert_eq!(bus.receiver_count(), 0);

        // No subscribers left: publish is still fine.
        bus.publish(WatchlistEvent::QuotesChanged {
            affected: vec![CoinId(2)],
        });
    }
}
