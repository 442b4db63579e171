//! # Machine Behavior
//!
//! Spawns a nested interpreter for a statechart definition and relays its
//! completion (and, when synchronized, every state it enters) to the parent.

use super::{emit, payload_event, Behavior, Subscribe};
use crate::actor_ref::ParentRef;
use crate::config::StagehandConfig;
use crate::context::ActorContext;
use crate::event::{Envelope, Event};
use crate::interpreter::{Interpreter, InterpreterOptions, MachineDefinition};
use crate::observer::{Observer, Subscription};
use crate::signal::LifecycleSignal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Options for spawning a nested machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineOptions {
    /// Relay every nested state to the parent as an update event
    #[serde(default)]
    pub sync: bool,
}

impl MachineOptions {
    pub fn synced() -> Self {
        Self { sync: true }
    }
}

impl From<&StagehandConfig> for MachineOptions {
    fn from(config: &StagehandConfig) -> Self {
        Self {
            sync: config.sync_machines,
        }
    }
}

pub struct MachineBehavior<D: MachineDefinition> {
    parent: ParentRef,
    definition: D,
    options: MachineOptions,
    initial: D::State,
    interpreter: Option<D::Interpreter>,
    sync_subscription: Option<Subscription>,
}

impl<D: MachineDefinition> MachineBehavior<D> {
    pub fn new(parent: ParentRef, definition: D, options: MachineOptions) -> Self {
        let initial = definition.initial_state();
        Self {
            parent,
            definition,
            options,
            initial,
            interpreter: None,
            sync_subscription: None,
        }
    }

    pub fn options(&self) -> MachineOptions {
        self.options
    }

    /// The nested interpreter, once started.
    pub fn interpreter(&self) -> Option<&D::Interpreter> {
        self.interpreter.as_ref()
    }

    fn start(&mut self, ctx: &ActorContext) {
        if self.interpreter.is_some() {
            warn!("Machine '{}' was already started", ctx.name);
            return;
        }
        debug!("Starting nested machine '{}' (sync: {})", ctx.name, self.options.sync);

        let interpreter = self.definition.interpret(InterpreterOptions {
            parent: Some(ctx.self_id.clone()),
            id: ctx.name.clone(),
            sync: self.options.sync,
        });

        let (done_parent, done_ctx) = (self.parent.clone(), ctx.clone());
        interpreter.on_done(Box::new(move |output| {
            debug!("Nested machine '{}' reached a final state", done_ctx.name);
            emit(
                &done_parent,
                &done_ctx,
                Event::done_invoke(done_ctx.name.clone(), output),
            );
        }));

        if self.options.sync {
            let (update_parent, update_ctx) = (self.parent.clone(), ctx.clone());
            let subscription = interpreter.subscribe(Observer::from_next(move |state: &D::State| {
                trace!("Relaying state of nested machine '{}'", update_ctx.name);
                let event = payload_event(&update_ctx.name, state, Event::update);
                emit(&update_parent, &update_ctx, event);
            }));
            self.sync_subscription = Some(subscription);
        }

        // Hooks are in place, nothing the interpreter does from here is missed
        interpreter.start();
        self.interpreter = Some(interpreter);
    }

    fn stop(&mut self, ctx: &ActorContext) {
        if let Some(interpreter) = self.interpreter.as_ref() {
            debug!("Stopping nested machine '{}'", ctx.name);
            interpreter.stop();
        }
        if let Some(subscription) = self.sync_subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl<D: MachineDefinition> Behavior for MachineBehavior<D> {
    type Emitted = D::State;

    fn receive(self, ctx: &ActorContext, event: Envelope) -> Self {
        match self.interpreter.as_ref() {
            Some(interpreter) => interpreter.send(event),
            None => warn!("Machine '{}' received an event before start", ctx.name),
        }
        self
    }

    fn receive_signal(mut self, ctx: &ActorContext, signal: LifecycleSignal) -> Self {
        match signal {
            LifecycleSignal::Start => self.start(ctx),
            LifecycleSignal::Stop => self.stop(ctx),
        }
        self
    }

    fn initial(&self) -> Option<D::State> {
        Some(self.initial.clone())
    }
}

impl<D: MachineDefinition> Subscribe for MachineBehavior<D> {
    fn subscribe(&self, observer: Observer<D::State>) -> Option<Subscription> {
        self.interpreter
            .as_ref()
            .map(|interpreter| interpreter.subscribe(observer))
    }
}
