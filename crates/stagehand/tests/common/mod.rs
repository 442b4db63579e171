#![allow(dead_code)]

use serde_json::Value;
use stagehand::{ActorContext, ActorId, ChannelActorRef, Envelope, Event, ParentRef};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How long to wait for an envelope that should arrive
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);
/// How long to wait before concluding nothing else is coming
pub const QUIET_PERIOD: Duration = Duration::from_millis(50);

/// A parent actor that records everything sent to it
pub struct RecordingParent {
    pub parent: ParentRef,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl RecordingParent {
    pub fn new() -> Self {
        let (actor_ref, rx) = ChannelActorRef::new(ActorId::generate());
        Self {
            parent: actor_ref.into_parent(),
            rx,
        }
    }

    pub fn parent(&self) -> ParentRef {
        self.parent.clone()
    }

    pub async fn expect_envelope(&mut self) -> Envelope {
        timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for an envelope")
            .expect("parent channel closed")
    }

    pub async fn expect_event(&mut self) -> Event {
        self.expect_envelope().await.event
    }

    /// Takes an event that has already been delivered, without waiting
    pub fn try_event(&mut self) -> Option<Event> {
        self.rx.try_recv().ok().map(|envelope| envelope.event)
    }

    /// Asserts that nothing arrives within the quiet period
    pub async fn expect_silence(&mut self) {
        if let Ok(Some(envelope)) = timeout(QUIET_PERIOD, self.rx.recv()).await {
            panic!("expected no envelope, got {:?}", envelope);
        }
    }

    /// Collects everything that arrives until the quiet period passes
    pub async fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(Some(envelope)) = timeout(QUIET_PERIOD, self.rx.recv()).await {
            events.push(envelope.event);
        }
        events
    }
}

/// Shared log of what an observer saw
#[derive(Clone, Default)]
pub struct ObserverLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ObserverLog {
    pub fn observer(&self) -> stagehand::Observer<Value> {
        let next = self.entries.clone();
        let error = self.entries.clone();
        let complete = self.entries.clone();
        stagehand::Observer::new()
            .on_next(move |value: &Value| next.lock().unwrap().push(format!("next:{}", value)))
            .on_error(move |e| error.lock().unwrap().push(format!("error:{}", e)))
            .on_complete(move || complete.lock().unwrap().push("complete".to_string()))
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

pub fn context(name: &str) -> ActorContext {
    ActorContext::named(name)
}

pub fn message(payload: impl Into<Value>) -> Envelope {
    Envelope::new(Event::message(payload))
}
