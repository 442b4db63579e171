use super::{Behavior, Subscribe};
use crate::context::ActorContext;
use crate::event::Envelope;
use crate::observer::{Observer, ObserverSet, Subscription};
use crate::signal::LifecycleSignal;
use tracing::trace;

/// # ReducerBehavior
///
/// Folds every received event into a state with a pure transition function
/// and reports each new state to its observers.
pub struct ReducerBehavior<S, F> {
    transition: F,
    initial: S,
    state: S,
    stopped: bool,
    observers: ObserverSet<S>,
}

impl<S, F> ReducerBehavior<S, F>
where
    S: Clone + Send + 'static,
    F: FnMut(&S, &Envelope, &ActorContext) -> S + Send,
{
    pub fn new(transition: F, initial: S) -> Self {
        Self {
            transition,
            state: initial.clone(),
            initial,
            stopped: false,
            observers: ObserverSet::new(),
        }
    }

    /// The latest state.
    pub fn snapshot(&self) -> &S {
        &self.state
    }
}

impl<S, F> Behavior for ReducerBehavior<S, F>
where
    S: Clone + Send + 'static,
    F: FnMut(&S, &Envelope, &ActorContext) -> S + Send,
{
    type Emitted = S;

    fn receive(mut self, ctx: &ActorContext, event: Envelope) -> Self {
        if self.stopped {
            trace!("Reducer '{}' is stopped, ignoring event", ctx.name);
            return self;
        }
        self.state = (self.transition)(&self.state, &event, ctx);
        self.observers.notify_next(&self.state);
        self
    }

    fn receive_signal(mut self, _ctx: &ActorContext, signal: LifecycleSignal) -> Self {
        if signal == LifecycleSignal::Stop {
            self.stopped = true;
            self.observers.clear();
        }
        self
    }

    fn initial(&self) -> Option<S> {
        Some(self.initial.clone())
    }
}

impl<S, F> Subscribe for ReducerBehavior<S, F>
where
    S: Clone + Send + 'static,
    F: FnMut(&S, &Envelope, &ActorContext) -> S + Send,
{
    fn subscribe(&self, observer: Observer<S>) -> Option<Subscription> {
        Some(self.observers.insert(observer))
    }
}
