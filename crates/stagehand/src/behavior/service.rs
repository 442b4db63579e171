use super::{Behavior, Subscribe};
use crate::context::ActorContext;
use crate::event::Envelope;
use crate::interpreter::Interpreter;
use crate::observer::{Observer, Subscription};
use crate::signal::LifecycleSignal;
use tracing::trace;

/// # ServiceBehavior
///
/// Wraps an interpreter that is already running and owned elsewhere. Its
/// lifecycle belongs to whoever created it, so signals are ignored here.
pub struct ServiceBehavior<I: Interpreter> {
    interpreter: I,
    initial: I::State,
}

impl<I: Interpreter> ServiceBehavior<I> {
    /// Wraps `interpreter`, capturing its current state as the initial value.
    pub fn new(interpreter: I) -> Self {
        let initial = interpreter.state();
        Self {
            interpreter,
            initial,
        }
    }

    pub fn interpreter(&self) -> &I {
        &self.interpreter
    }
}

impl<I: Interpreter> Behavior for ServiceBehavior<I> {
    type Emitted = I::State;

    fn receive(self, ctx: &ActorContext, event: Envelope) -> Self {
        self.interpreter.send(event.with_origin(ctx.self_id.clone()));
        self
    }

    fn receive_signal(self, ctx: &ActorContext, signal: LifecycleSignal) -> Self {
        trace!("Service '{}' ignores {} signal", ctx.name, signal);
        self
    }

    fn initial(&self) -> Option<I::State> {
        Some(self.initial.clone())
    }
}

impl<I: Interpreter> Subscribe for ServiceBehavior<I> {
    fn subscribe(&self, observer: Observer<I::State>) -> Option<Subscription> {
        Some(self.interpreter.subscribe(observer))
    }
}
