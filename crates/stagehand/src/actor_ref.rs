//! # Actor References
//!
//! The parent side of the send contract. Behaviors only ever push envelopes
//! into an [`ActorRef`]; what the receiving system does with them is up to it.

use crate::event::Envelope;
use crate::id::ActorId;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Something that can accept enveloped events.
pub trait ActorRef: Send + Sync {
    /// Identity of the referenced actor
    fn id(&self) -> &ActorId;

    /// Delivers an envelope. Delivery failures are the implementation's
    /// concern and never surface to the sending behavior.
    fn send(&self, envelope: Envelope);
}

/// Shared handle to the parent actor of a behavior.
pub type ParentRef = Arc<dyn ActorRef>;

/// # ChannelActorRef
///
/// An [`ActorRef`] backed by an unbounded tokio channel. The receiving half
/// belongs to whoever runs the parent actor.
#[derive(Clone)]
pub struct ChannelActorRef {
    id: ActorId,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelActorRef {
    /// Creates a reference and the receiver its envelopes arrive on.
    pub fn new(id: ActorId) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    pub fn from_sender(id: ActorId, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { id, tx }
    }

    /// Wraps this reference for use as a behavior parent.
    pub fn into_parent(self) -> ParentRef {
        Arc::new(self)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl ActorRef for ChannelActorRef {
    fn id(&self) -> &ActorId {
        &self.id
    }

    fn send(&self, envelope: Envelope) {
        trace!(
            "Delivering '{}' event to actor {}",
            envelope.event.kind(),
            self.id
        );
        if let Err(e) = self.tx.send(envelope) {
            warn!(
                "Actor {} is no longer receiving, dropped '{}' event",
                self.id,
                e.0.event.kind()
            );
        }
    }
}

impl fmt::Debug for ChannelActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelActorRef")
            .field("id", &self.id)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    #[tokio::test]
    async fn test_send_delivers_envelope() {
        let id = ActorId::generate();
        let (actor_ref, mut rx) = ChannelActorRef::new(id.clone());
        actor_ref.send(Envelope::new(Event::message("hello")));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event, Event::message("hello"));
        assert_eq!(actor_ref.id(), &id);
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (actor_ref, rx) = ChannelActorRef::new(ActorId::generate());
        drop(rx);
        assert!(actor_ref.is_closed());
        actor_ref.send(Envelope::new(Event::message("lost")));
    }
}
