//! # Interpreter Boundary
//!
//! What the Machine and Service behaviors need from a statechart interpreter.
//! How an interpreter steps through its transitions is its own business; the
//! behaviors only decide when to start it, stop it and relay to it.

use crate::event::Envelope;
use crate::id::ActorId;
use crate::observer::{Observer, Subscription};
use serde::Serialize;
use serde_json::Value;

/// Called once with the output of a machine that reached a final state.
pub type DoneHandler = Box<dyn FnOnce(Value) + Send>;

/// Options a nested interpreter is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterOptions {
    /// The actor hosting the interpreter
    pub parent: Option<ActorId>,
    /// Identity of the interpreter, taken from the hosting actor's name
    pub id: String,
    /// Whether the host relays every state to its own parent
    pub sync: bool,
}

/// A handle to a running (or runnable) statechart interpreter.
///
/// Handles are cheap to clone and every clone drives the same interpreter.
pub trait Interpreter: Clone + Send + Sync + 'static {
    type State: Clone + Send + 'static;

    /// Enters the initial state. Starting twice is a no-op.
    fn start(&self);

    /// Stops processing events. No done hook fires after this.
    fn stop(&self);

    /// Queues an event for processing.
    fn send(&self, event: Envelope);

    /// Observes every state the interpreter enters from now on.
    fn subscribe(&self, observer: Observer<Self::State>) -> Subscription;

    /// Registers a hook for the machine reaching a final state.
    fn on_done(&self, handler: DoneHandler);

    /// The current state.
    fn state(&self) -> Self::State;
}

/// A statechart definition that can be interpreted any number of times.
pub trait MachineDefinition: Clone + Send + Sync + 'static {
    type State: Clone + Send + Serialize + 'static;
    type Interpreter: Interpreter<State = Self::State>;

    /// The starting configuration, independent of any particular interpreter.
    fn initial_state(&self) -> Self::State;

    /// Creates a fresh, not yet started interpreter.
    fn interpret(&self, options: InterpreterOptions) -> Self::Interpreter;
}
