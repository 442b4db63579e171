//! # Observable Behavior
//!
//! Relays a push source to the parent. `Stop` closes the relay and then
//! unsubscribes, so a source that is mid-emission when stopped still cannot
//! reach the parent.

use super::{emit, payload_event, Behavior, Subscribe};
use crate::actor_ref::ParentRef;
use crate::context::ActorContext;
use crate::event::{Envelope, Event};
use crate::observer::{lock, Observer, SharedSource, Subscription};
use crate::signal::LifecycleSignal;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

pub struct ObservableBehavior<T> {
    parent: ParentRef,
    source: SharedSource<T>,
    subscription: Option<Subscription>,
    open: Arc<Mutex<bool>>,
}

/// Forwards source notifications to the parent while the behavior is open.
#[derive(Clone)]
struct Relay {
    parent: ParentRef,
    ctx: ActorContext,
    open: Arc<Mutex<bool>>,
}

impl Relay {
    fn deliver(&self, event: Event) {
        let open = lock(&self.open);
        if !*open {
            trace!("Observable '{}' is closed, dropping {}", self.ctx.name, event.name());
            return;
        }
        emit(&self.parent, &self.ctx, event);
    }
}

impl<T> ObservableBehavior<T>
where
    T: Serialize + Send + 'static,
{
    pub fn new(parent: ParentRef, source: SharedSource<T>) -> Self {
        Self {
            parent,
            source,
            subscription: None,
            open: Arc::new(Mutex::new(true)),
        }
    }

    /// Whether the behavior is currently relaying the source.
    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|subscription| !subscription.is_closed())
    }

    fn start(&mut self, ctx: &ActorContext) {
        if self.subscription.is_some() {
            warn!("Observable '{}' was already started", ctx.name);
            return;
        }
        debug!("Subscribing observable '{}' to its source", ctx.name);

        let relay = Relay {
            parent: self.parent.clone(),
            ctx: ctx.clone(),
            open: Arc::clone(&self.open),
        };
        let (on_error, on_complete) = (relay.clone(), relay.clone());

        let relay = Observer::new()
            .on_next(move |value: &T| {
                trace!("Observable '{}' relaying value", relay.ctx.name);
                let event =
                    payload_event(&relay.ctx.name, value, |payload| Event::Message { payload });
                relay.deliver(event);
            })
            .on_error(move |e| {
                debug!("Observable '{}' errored: {:#}", on_error.ctx.name, e);
                on_error.deliver(Event::error(on_error.ctx.name.clone(), e));
            })
            .on_complete(move || {
                debug!("Observable '{}' completed", on_complete.ctx.name);
                on_complete.deliver(Event::done_invoke(on_complete.ctx.name.clone(), Value::Null));
            });

        self.subscription = Some(self.source.subscribe(relay));
    }

    fn stop(&mut self, ctx: &ActorContext) {
        *lock(&self.open) = false;
        if let Some(subscription) = self.subscription.as_ref() {
            debug!("Unsubscribing observable '{}'", ctx.name);
            subscription.unsubscribe();
        }
    }
}

impl<T> Behavior for ObservableBehavior<T>
where
    T: Serialize + Send + 'static,
{
    type Emitted = T;

    fn receive(self, ctx: &ActorContext, _event: Envelope) -> Self {
        trace!("Observable '{}' accepts no input, ignoring event", ctx.name);
        self
    }

    fn receive_signal(mut self, ctx: &ActorContext, signal: LifecycleSignal) -> Self {
        match signal {
            LifecycleSignal::Start => self.start(ctx),
            LifecycleSignal::Stop => self.stop(ctx),
        }
        self
    }

    fn initial(&self) -> Option<T> {
        None
    }
}

impl<T> Subscribe for ObservableBehavior<T>
where
    T: Serialize + Send + 'static,
{
    /// Subscribes straight to the source, bypassing the relay to the parent.
    fn subscribe(&self, observer: Observer<T>) -> Option<Subscription> {
        Some(self.source.subscribe(observer))
    }
}
