//! # Behaviors
//!
//! A behavior is what a supervisor drives once it has spawned an actor:
//! `receive_signal(Start)` once, any number of `receive` calls, then
//! `receive_signal(Stop)`. Every variant here wraps one shape of
//! asynchronous work behind that same protocol.
//!
//! Calls take the behavior by value and hand back the behavior to keep using.
//! All variants in this crate return themselves; their mutable state lives in
//! private structs shared only with their own continuations.

pub mod callback;
pub mod machine;
pub mod observable;
pub mod promise;
pub mod reducer;
pub mod service;

pub use callback::{
    CallbackBehavior, CallbackFn, CallbackReturn, CallbackSender, Disposer, ReceiverRegistrar,
};
pub use machine::{MachineBehavior, MachineOptions};
pub use observable::ObservableBehavior;
pub use promise::{Deferred, PromiseBehavior};
pub use reducer::ReducerBehavior;
pub use service::ServiceBehavior;

use crate::actor_ref::ParentRef;
use crate::context::ActorContext;
use crate::event::{Envelope, Event};
use crate::observer::{Observer, Subscription};
use crate::signal::LifecycleSignal;
use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use tracing::error;

/// The lifecycle contract every behavior variant implements.
pub trait Behavior: Sized + Send {
    /// Values this behavior reports to subscribers
    type Emitted;

    /// Consumes one domain event.
    fn receive(self, ctx: &ActorContext, event: Envelope) -> Self;

    /// Consumes one lifecycle signal. `Stop` is safe to send even if `Start`
    /// never ran, and no outbound message follows it.
    fn receive_signal(self, ctx: &ActorContext, signal: LifecycleSignal) -> Self;

    /// The value considered current before anything asynchronous has arrived.
    fn initial(&self) -> Option<Self::Emitted>;
}

/// Behaviors whose emitted values can be observed.
pub trait Subscribe: Behavior {
    /// Registers interest in future emitted values. `None` means there is
    /// nothing to subscribe to yet, e.g. a nested machine before `Start`.
    fn subscribe(&self, observer: Observer<Self::Emitted>) -> Option<Subscription>;
}

/// Sends `event` to the parent tagged as coming from this actor.
pub(crate) fn emit(parent: &ParentRef, ctx: &ActorContext, event: Event) {
    parent.send(Envelope::from_origin(event, ctx.self_id.clone()));
}

/// Serializes an emitted value into an event payload, turning a failure into
/// an error event for `source_name`.
pub(crate) fn payload_event<T: Serialize>(
    source_name: &str,
    value: &T,
    into_event: impl FnOnce(Value) -> Event,
) -> Event {
    match serde_json::to_value(value) {
        Ok(payload) => into_event(payload),
        Err(e) => {
            error!("Failed to serialize value emitted by '{}': {}", source_name, e);
            Event::error(source_name, &e.into())
        }
    }
}

/// Runs `continuation` on the current tokio runtime. Fails instead of
/// panicking when there is none.
pub(crate) fn spawn_continuation(
    continuation: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Handle::try_current()
        .context("starting a deferred value needs a tokio runtime")?;
    runtime.spawn(continuation);
    Ok(())
}
