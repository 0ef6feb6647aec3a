//! Session events and the notifier that fans them out.
//!
//! The controller talks to the outside world only through these events:
//! - inbound: [`InboundEvent`] (participant joined/left), fed by the transport;
//! - outbound: [`SessionEvent`], broadcast to every subscriber.
//!
//! Delivery is fire-and-forget. Emitting with no subscribers is fine, and a
//! subscriber that falls behind loses the oldest events. Consumers must treat
//! events as idempotent, since the transport may deliver them more than once.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::admission::SessionState;
use crate::participant::ParticipantId;

/// Default number of buffered events per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Events produced by the transport layer for the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundEvent {
    ParticipantJoined { id: ParticipantId, name: String },
    ParticipantLeft { id: ParticipantId },
}

/// Events produced by the controller, forwarded to all participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    StateChanged { state: SessionState },
    GameStarted,
    GameConcluded { winner: String },
}

/// Broadcasts [`SessionEvent`]s to subscribers.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl Notifier {
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Notifier { tx }
    }

    /// Registers a new subscriber. It only sees events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emits an event to all current subscribers.
    pub fn emit(&self, event: SessionEvent) {
        match self.tx.send(event) {
            Ok(receivers) => trace!(receivers, "Session event emitted"),
            Err(broadcast::error::SendError(event)) => {
                trace!(?event, "Session event dropped, no subscribers")
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Drains every event currently queued on `rx` without waiting.
///
/// Lagged receivers skip the lost events and keep draining.
pub fn drain_ready(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                trace!(skipped, "Subscriber lagged");
            }
            Err(broadcast::error::TryRecvError::Empty)
            | Err(broadcast::error::TryRecvError::Closed) => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_silent() {
        let notifier = Notifier::default();
        notifier.emit(SessionEvent::GameStarted);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn every_subscriber_sees_each_event() {
        let notifier = Notifier::default();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        notifier.emit(SessionEvent::GameStarted);

        assert_eq!(drain_ready(&mut a), vec![SessionEvent::GameStarted]);
        assert_eq!(drain_ready(&mut b), vec![SessionEvent::GameStarted]);
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let notifier = Notifier::default();
        notifier.emit(SessionEvent::GameStarted);
        let mut rx = notifier.subscribe();
        assert!(drain_ready(&mut rx).is_empty());
    }

    #[test]
    fn lagging_subscriber_keeps_newest_events() {
        let notifier = Notifier::with_capacity(2);
        let mut rx = notifier.subscribe();
        for name in ["a", "b", "c"] {
            notifier.emit(SessionEvent::GameConcluded {
                winner: name.to_string(),
            });
        }

        let got = drain_ready(&mut rx);
        assert_eq!(
            got,
            vec![
                SessionEvent::GameConcluded { winner: "b".into() },
                SessionEvent::GameConcluded { winner: "c".into() },
            ]
        );
    }
}
