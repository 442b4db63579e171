//! # Stagehand
//!
//! Stagehand is the behavior layer of a statechart actor runtime. It lets a
//! supervisor drive very different kinds of asynchronous work through one
//! lifecycle protocol: start once, receive events, stop once, and optionally
//! observe emitted values.
//!
//! ## Behaviors
//!
//! * `CallbackBehavior`: a function given a sender and a receiver registrar
//! * `PromiseBehavior`: a single deferred value
//! * `ObservableBehavior`: a push source of many values
//! * `MachineBehavior`: a nested statechart interpreter spawned on start
//! * `ServiceBehavior`: an interpreter already running elsewhere
//! * `ReducerBehavior`: a pure fold over received events
//!
//! `create_behavior_from` picks the right variant for a spawnable value and
//! returns it as an `AnyBehavior`.
//!
//! ## Cancellation
//!
//! `Stop` never aborts work that is already in flight. It marks the behavior
//! canceled (or unsubscribes from its source), and every asynchronous
//! continuation checks that before producing anything the parent could see.

pub mod actor_ref;
pub mod behavior;
pub mod config;
pub mod context;
pub mod driver;
pub mod errors;
pub mod event;
pub mod id;
pub mod interpreter;
pub mod logging;
pub mod observer;
pub mod signal;
pub mod spawn;
pub mod statechart;

pub use actor_ref::{ActorRef, ChannelActorRef, ParentRef};
pub use behavior::{
    Behavior, CallbackBehavior, CallbackReturn, CallbackSender, Deferred, MachineBehavior,
    MachineOptions, ObservableBehavior, PromiseBehavior, ReceiverRegistrar, ReducerBehavior,
    ServiceBehavior, Subscribe,
};
pub use config::{LogOutput, LoggingConfig, StagehandConfig};
pub use context::ActorContext;
pub use driver::{spawn_behavior, BehaviorHandle};
pub use errors::BehaviorError;
pub use event::{Envelope, Event};
pub use id::ActorId;
pub use interpreter::{Interpreter, InterpreterOptions, MachineDefinition};
pub use observer::{
    Observer, ObserverSet, SharedSource, StreamSource, Subject, Subscribable, Subscription,
};
pub use signal::LifecycleSignal;
pub use spawn::{
    create_behavior_from, create_behavior_with, AnyBehavior, Spawn, SpawnKind, Spawnable,
};
pub use statechart::{MachineInterpreter, MachineState, StateMachine};
