//! # Promise Behavior
//!
//! Wraps a single deferred value. Whichever comes first of settlement and
//! `Stop` wins; the loser produces nothing observable.

use super::{emit, payload_event, spawn_continuation, Behavior, Subscribe};
use crate::actor_ref::ParentRef;
use crate::context::ActorContext;
use crate::event::{Envelope, Event};
use crate::observer::{lock, Observer, ObserverSet, Subscription};
use crate::signal::LifecycleSignal;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, trace, warn};

/// A value that settles to success or failure exactly once.
pub type Deferred<T> = BoxFuture<'static, anyhow::Result<T>>;

struct PromiseState {
    canceled: bool,
}

/// # PromiseBehavior
///
/// On success the parent gets a completion event carrying the value and
/// observers get `next` then `complete`. On failure the parent gets an error
/// event and observers get `error` then `complete`.
///
/// The deferred value is driven on the current tokio runtime. Started outside
/// one, the promise fails straight away with an error event.
pub struct PromiseBehavior<T> {
    parent: ParentRef,
    deferred: Option<Deferred<T>>,
    state: Arc<Mutex<PromiseState>>,
    observers: ObserverSet<T>,
}

impl<T> PromiseBehavior<T>
where
    T: Serialize + Send + 'static,
{
    pub fn new(
        parent: ParentRef,
        future: impl Future<Output = anyhow::Result<T>> + Send + 'static,
    ) -> Self {
        Self::from_deferred(parent, future.boxed())
    }

    pub fn from_deferred(parent: ParentRef, deferred: Deferred<T>) -> Self {
        Self {
            parent,
            deferred: Some(deferred),
            state: Arc::new(Mutex::new(PromiseState { canceled: false })),
            observers: ObserverSet::new(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        lock(&self.state).canceled
    }

    fn start(&mut self, ctx: &ActorContext) {
        let Some(deferred) = self.deferred.take() else {
            warn!("Promise '{}' was already started", ctx.name);
            return;
        };
        debug!("Starting promise '{}'", ctx.name);

        let parent = self.parent.clone();
        let state = Arc::clone(&self.state);
        let observers = self.observers.clone();
        let task_ctx = ctx.clone();
        let continuation = async move {
            let outcome = deferred.await;
            settle(&parent, &state, &observers, &task_ctx, outcome);
        };

        if let Err(e) = spawn_continuation(continuation) {
            error!("Promise '{}' cannot run: {:#}", ctx.name, e);
            settle(&self.parent, &self.state, &self.observers, ctx, Err(e));
        }
    }

    fn stop(&mut self, ctx: &ActorContext) {
        debug!("Stopping promise '{}'", ctx.name);
        lock(&self.state).canceled = true;
        self.observers.clear();
    }
}

/// Reports the outcome unless `Stop` got there first. The parent is told
/// under the state lock, so a `Stop` that has returned is never followed by
/// a delivery. Observers are detached under the same lock and always see
/// their terminal pair in full.
fn settle<T: Serialize + 'static>(
    parent: &ParentRef,
    state: &Mutex<PromiseState>,
    observers: &ObserverSet<T>,
    ctx: &ActorContext,
    outcome: anyhow::Result<T>,
) {
    let event = match &outcome {
        Ok(value) => payload_event(&ctx.name, value, |payload| {
            Event::done_invoke(ctx.name.clone(), payload)
        }),
        Err(e) => {
            debug!("Promise '{}' rejected: {:#}", ctx.name, e);
            Event::error(ctx.name.clone(), e)
        }
    };

    let observers = {
        let mut state = lock(state);
        if state.canceled {
            trace!("Promise '{}' settled after cancel", ctx.name);
            return;
        }
        state.canceled = true;
        emit(parent, ctx, event);
        observers.detach()
    };

    match outcome {
        Ok(value) => observers.notify_next(&value),
        Err(e) => observers.notify_error(&e),
    }
    observers.notify_complete();
}

impl<T> Behavior for PromiseBehavior<T>
where
    T: Serialize + Send + 'static,
{
    type Emitted = T;

    fn receive(self, ctx: &ActorContext, _event: Envelope) -> Self {
        trace!("Promise '{}' accepts no input, ignoring event", ctx.name);
        self
    }

    fn receive_signal(mut self, ctx: &ActorContext, signal: LifecycleSignal) -> Self {
        match signal {
            LifecycleSignal::Start => self.start(ctx),
            LifecycleSignal::Stop => self.stop(ctx),
        }
        self
    }

    /// Always `None`; settlement is only reported through events and observers.
    fn initial(&self) -> Option<T> {
        None
    }
}

impl<T> Subscribe for PromiseBehavior<T>
where
    T: Serialize + Send + 'static,
{
    fn subscribe(&self, observer: Observer<T>) -> Option<Subscription> {
        Some(self.observers.insert(observer))
    }
}
