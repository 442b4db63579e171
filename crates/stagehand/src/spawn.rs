//! # Dispatch
//!
//! Turns something spawnable into the behavior that drives it. This is the
//! only place a variant is chosen; afterwards all variants are peers behind
//! [`AnyBehavior`].

use crate::actor_ref::ParentRef;
use crate::behavior::{
    Behavior, CallbackBehavior, CallbackFn, Deferred, MachineBehavior, MachineOptions,
    ObservableBehavior, PromiseBehavior, ServiceBehavior, Subscribe,
};
use crate::context::ActorContext;
use crate::errors::BehaviorError;
use crate::event::Envelope;
use crate::interpreter::MachineDefinition;
use crate::observer::{Observer, SharedSource, Subscription};
use crate::signal::LifecycleSignal;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, error};

/// The shapes of asynchronous work a behavior can be created from, in the
/// order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpawnKind {
    Deferred,
    Stream,
    Machine,
    Callback,
}

impl SpawnKind {
    /// Order in which candidates are tried by [`create_behavior_from`].
    pub const PRECEDENCE: [SpawnKind; 4] = [
        SpawnKind::Deferred,
        SpawnKind::Stream,
        SpawnKind::Machine,
        SpawnKind::Callback,
    ];
}

/// One concrete spawnable value.
pub enum Spawnable<D> {
    Deferred(Deferred<Value>),
    Stream(SharedSource<Value>),
    Machine(D),
    Callback(CallbackFn),
}

impl<D> Spawnable<D> {
    pub fn kind(&self) -> SpawnKind {
        match self {
            Spawnable::Deferred(_) => SpawnKind::Deferred,
            Spawnable::Stream(_) => SpawnKind::Stream,
            Spawnable::Machine(_) => SpawnKind::Machine,
            Spawnable::Callback(_) => SpawnKind::Callback,
        }
    }
}

impl<D> fmt::Debug for Spawnable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Spawnable::{:?}", self.kind())
    }
}

/// Capability probing for values that may be spawned.
///
/// A value may support several kinds; [`create_behavior_from`] takes the
/// first supported one in [`SpawnKind::PRECEDENCE`] order.
pub trait Spawn<D> {
    fn supports(&self, kind: SpawnKind) -> bool;

    /// Converts the value into the requested kind. Only called with a kind
    /// for which `supports` returned true.
    fn into_spawnable(self, kind: SpawnKind) -> Option<Spawnable<D>>;

    /// Human-readable description used when nothing matches.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl<D> Spawn<D> for Spawnable<D> {
    fn supports(&self, kind: SpawnKind) -> bool {
        self.kind() == kind
    }

    fn into_spawnable(self, kind: SpawnKind) -> Option<Spawnable<D>> {
        (self.kind() == kind).then_some(self)
    }

    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

/// The closed set of behavior variants, emitting JSON values.
pub enum AnyBehavior<D: MachineDefinition> {
    Callback(CallbackBehavior),
    Promise(PromiseBehavior<Value>),
    Observable(ObservableBehavior<Value>),
    Machine(MachineBehavior<D>),
    Service(ServiceBehavior<D::Interpreter>),
}

impl<D: MachineDefinition> AnyBehavior<D> {
    /// Wraps an interpreter that is already running elsewhere.
    pub fn service(interpreter: D::Interpreter) -> Self {
        AnyBehavior::Service(ServiceBehavior::new(interpreter))
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            AnyBehavior::Callback(_) => "callback",
            AnyBehavior::Promise(_) => "promise",
            AnyBehavior::Observable(_) => "observable",
            AnyBehavior::Machine(_) => "machine",
            AnyBehavior::Service(_) => "service",
        }
    }
}

impl<D: MachineDefinition> fmt::Debug for AnyBehavior<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyBehavior::{}", self.variant_name())
    }
}

fn state_to_value<S: Serialize>(state: &S) -> Value {
    serde_json::to_value(state).unwrap_or_else(|e| {
        error!("Failed to serialize machine state: {}", e);
        Value::Null
    })
}

impl<D: MachineDefinition> Behavior for AnyBehavior<D> {
    type Emitted = Value;

    fn receive(self, ctx: &ActorContext, event: Envelope) -> Self {
        match self {
            AnyBehavior::Callback(b) => AnyBehavior::Callback(b.receive(ctx, event)),
            AnyBehavior::Promise(b) => AnyBehavior::Promise(b.receive(ctx, event)),
            AnyBehavior::Observable(b) => AnyBehavior::Observable(b.receive(ctx, event)),
            AnyBehavior::Machine(b) => AnyBehavior::Machine(b.receive(ctx, event)),
            AnyBehavior::Service(b) => AnyBehavior::Service(b.receive(ctx, event)),
        }
    }

    fn receive_signal(self, ctx: &ActorContext, signal: LifecycleSignal) -> Self {
        match self {
            AnyBehavior::Callback(b) => AnyBehavior::Callback(b.receive_signal(ctx, signal)),
            AnyBehavior::Promise(b) => AnyBehavior::Promise(b.receive_signal(ctx, signal)),
            AnyBehavior::Observable(b) => AnyBehavior::Observable(b.receive_signal(ctx, signal)),
            AnyBehavior::Machine(b) => AnyBehavior::Machine(b.receive_signal(ctx, signal)),
            AnyBehavior::Service(b) => AnyBehavior::Service(b.receive_signal(ctx, signal)),
        }
    }

    fn initial(&self) -> Option<Value> {
        match self {
            AnyBehavior::Callback(_) => None,
            AnyBehavior::Promise(b) => b.initial(),
            AnyBehavior::Observable(b) => b.initial(),
            AnyBehavior::Machine(b) => b.initial().map(|state| state_to_value(&state)),
            AnyBehavior::Service(b) => b.initial().map(|state| state_to_value(&state)),
        }
    }
}

impl<D: MachineDefinition> Subscribe for AnyBehavior<D> {
    /// `None` for callbacks, which emit nothing.
    fn subscribe(&self, observer: Observer<Value>) -> Option<Subscription> {
        match self {
            AnyBehavior::Callback(_) => None,
            AnyBehavior::Promise(b) => b.subscribe(observer),
            AnyBehavior::Observable(b) => b.subscribe(observer),
            AnyBehavior::Machine(b) => {
                b.subscribe(observer.contramap(|state: &D::State| state_to_value(state)))
            }
            AnyBehavior::Service(b) => {
                b.subscribe(observer.contramap(|state: &D::State| state_to_value(state)))
            }
        }
    }
}

/// Creates the behavior for `candidate`, with nested machines unsynchronized.
pub fn create_behavior_from<D, S>(
    candidate: S,
    parent: ParentRef,
) -> Result<AnyBehavior<D>, BehaviorError>
where
    D: MachineDefinition,
    S: Spawn<D>,
{
    create_behavior_with(candidate, parent, MachineOptions::default())
}

/// Creates the behavior for `candidate`, probing deferred value, stream,
/// machine definition and callback in that order.
pub fn create_behavior_with<D, S>(
    candidate: S,
    parent: ParentRef,
    options: MachineOptions,
) -> Result<AnyBehavior<D>, BehaviorError>
where
    D: MachineDefinition,
    S: Spawn<D>,
{
    let description = candidate.describe();
    let kind = SpawnKind::PRECEDENCE
        .into_iter()
        .find(|kind| candidate.supports(*kind))
        .ok_or_else(|| BehaviorError::UnsupportedEntity(description.clone()))?;
    debug!("Spawning {} as {:?}", description, kind);

    let spawnable = candidate
        .into_spawnable(kind)
        .ok_or(BehaviorError::UnsupportedEntity(description))?;

    Ok(match spawnable {
        Spawnable::Deferred(deferred) => {
            AnyBehavior::Promise(PromiseBehavior::from_deferred(parent, deferred))
        }
        Spawnable::Stream(source) => {
            AnyBehavior::Observable(ObservableBehavior::new(parent, source))
        }
        Spawnable::Machine(definition) => {
            AnyBehavior::Machine(MachineBehavior::new(parent, definition, options))
        }
        Spawnable::Callback(callback) => {
            AnyBehavior::Callback(CallbackBehavior::from_boxed(parent, callback))
        }
    })
}
