//! # Flat Statecharts
//!
//! A small transition-table machine implementing [`MachineDefinition`], so
//! nested machines and services have a concrete interpreter to run on. States
//! are flat: there is no hierarchy, no parallel regions, no guards and no
//! actions. A transition is picked purely by the name of the incoming event.

use crate::errors::BehaviorError;
use crate::event::Envelope;
use crate::interpreter::{DoneHandler, Interpreter, InterpreterOptions, MachineDefinition};
use crate::observer::{lock, Observer, ObserverSet, SerialQueue, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// A snapshot of a flat machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    /// Name of the active state
    pub value: String,
    pub context: Value,
    /// Name of the event that led here; `None` for the initial state
    pub event: Option<String>,
    /// Whether the active state is final
    pub done: bool,
    /// Output of the final state, if any
    pub output: Option<Value>,
}

impl MachineState {
    pub fn matches(&self, value: &str) -> bool {
        self.value == value
    }
}

#[derive(Debug, Clone, Default)]
struct StateNode {
    on: BTreeMap<String, String>,
    /// `Some` for final states, holding their output
    output: Option<Value>,
}

/// # StateMachine
///
/// Built with chained calls:
///
/// ```rust
/// use serde_json::json;
/// use stagehand::statechart::StateMachine;
///
/// let machine = StateMachine::new("door", "closed")
///     .transition("closed", "OPEN", "open")
///     .transition("open", "CLOSE", "closed")
///     .transition("open", "REMOVE", "gone")
///     .final_state("gone", json!({"removed": true}));
/// assert!(machine.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StateMachine {
    id: String,
    initial: String,
    context: Value,
    states: BTreeMap<String, StateNode>,
}

impl StateMachine {
    pub fn new(id: impl Into<String>, initial: impl Into<String>) -> Self {
        let initial = initial.into();
        let mut states = BTreeMap::new();
        states.insert(initial.clone(), StateNode::default());
        Self {
            id: id.into(),
            initial,
            context: Value::Null,
            states,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn state(mut self, name: impl Into<String>) -> Self {
        self.states.entry(name.into()).or_default();
        self
    }

    /// Adds a transition from `source` to `target` on events named `event`.
    pub fn transition(
        mut self,
        source: impl Into<String>,
        event: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let target = target.into();
        self.states.entry(target.clone()).or_default();
        self.states
            .entry(source.into())
            .or_default()
            .on
            .insert(event.into(), target);
        self
    }

    /// Marks `name` as a final state producing `output`.
    pub fn final_state(mut self, name: impl Into<String>, output: Value) -> Self {
        self.states.entry(name.into()).or_default().output = Some(output);
        self
    }

    /// Checks that final states have no outgoing transitions.
    pub fn validate(&self) -> Result<(), BehaviorError> {
        for (name, node) in &self.states {
            if node.output.is_some() && !node.on.is_empty() {
                return Err(BehaviorError::Config(format!(
                    "final state '{}' of machine '{}' has outgoing transitions",
                    name, self.id
                )));
            }
        }
        Ok(())
    }

    fn snapshot(&self, value: &str, context: Value, event: Option<String>) -> MachineState {
        let output = self.states.get(value).and_then(|node| node.output.clone());
        MachineState {
            value: value.to_string(),
            context,
            event,
            done: output.is_some(),
            output,
        }
    }

    fn target(&self, value: &str, event: &str) -> Option<&str> {
        self.states
            .get(value)
            .and_then(|node| node.on.get(event))
            .map(String::as_str)
    }
}

impl MachineDefinition for StateMachine {
    type State = MachineState;
    type Interpreter = MachineInterpreter;

    fn initial_state(&self) -> MachineState {
        self.snapshot(&self.initial, self.context.clone(), None)
    }

    fn interpret(&self, options: InterpreterOptions) -> MachineInterpreter {
        MachineInterpreter::new(self.clone(), options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterStatus {
    NotStarted,
    Running,
    Stopped,
}

struct InterpreterInner {
    status: InterpreterStatus,
    state: MachineState,
    done_handlers: Vec<DoneHandler>,
}

enum Step {
    Start,
    Event(Envelope),
}

/// # MachineInterpreter
///
/// Runs a [`StateMachine`]. Subscribers see the initial state on `start` and
/// every state entered afterwards. Entering a final state fires the done
/// hooks once, completes subscribers and stops the interpreter.
///
/// Steps run one at a time. A subscriber or done hook that sends to the
/// interpreter has its event queued and processed after the current step
/// finishes, as does a send racing in from another thread.
#[derive(Clone)]
pub struct MachineInterpreter {
    machine: Arc<StateMachine>,
    options: InterpreterOptions,
    inner: Arc<Mutex<InterpreterInner>>,
    observers: ObserverSet<MachineState>,
    steps: Arc<SerialQueue<Step>>,
}

impl MachineInterpreter {
    pub fn new(machine: StateMachine, options: InterpreterOptions) -> Self {
        let state = machine.initial_state();
        Self {
            machine: Arc::new(machine),
            options,
            inner: Arc::new(Mutex::new(InterpreterInner {
                status: InterpreterStatus::NotStarted,
                state,
                done_handlers: Vec::new(),
            })),
            observers: ObserverSet::new(),
            steps: Arc::new(SerialQueue::new()),
        }
    }

    /// Creates and starts an interpreter that nothing hosts.
    pub fn start_standalone(machine: StateMachine) -> Self {
        let id = machine.id().to_string();
        let interpreter = Self::new(
            machine,
            InterpreterOptions {
                parent: None,
                id,
                sync: false,
            },
        );
        interpreter.start();
        interpreter
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    pub fn status(&self) -> InterpreterStatus {
        lock(&self.inner).status
    }

    fn step(&self, step: Step) {
        match step {
            Step::Start => self.begin(),
            Step::Event(event) => self.transition(event),
        }
    }

    fn begin(&self) {
        let state = {
            let mut inner = lock(&self.inner);
            if inner.status != InterpreterStatus::NotStarted {
                trace!("Interpreter '{}' already started", self.options.id);
                return;
            }
            inner.status = InterpreterStatus::Running;
            inner.state.clone()
        };
        debug!("Interpreter '{}' entering '{}'", self.options.id, state.value);
        self.enter(state);
    }

    fn transition(&self, event: Envelope) {
        let next = {
            let mut inner = lock(&self.inner);
            if inner.status != InterpreterStatus::Running {
                trace!(
                    "Interpreter '{}' is not running, dropping '{}'",
                    self.options.id,
                    event.name()
                );
                return;
            }
            let name = event.name();
            let Some(target) = self.machine.target(&inner.state.value, &name) else {
                trace!(
                    "No transition from '{}' on '{}'",
                    inner.state.value,
                    name
                );
                return;
            };
            let next = self.machine.snapshot(
                target,
                inner.state.context.clone(),
                Some(name.into_owned()),
            );
            inner.state = next.clone();
            next
        };
        self.enter(next);
    }

    /// Publishes `state` and finishes the run if it is final.
    fn enter(&self, state: MachineState) {
        self.observers.notify_next(&state);
        if !state.done {
            return;
        }

        let handlers = {
            let mut inner = lock(&self.inner);
            inner.status = InterpreterStatus::Stopped;
            std::mem::take(&mut inner.done_handlers)
        };
        debug!("Interpreter '{}' reached final state '{}'", self.options.id, state.value);
        let output = state.output.unwrap_or(Value::Null);
        for handler in handlers {
            handler(output.clone());
        }
        self.observers.notify_complete();
        self.observers.clear();
    }
}

impl Interpreter for MachineInterpreter {
    type State = MachineState;

    fn start(&self) {
        self.steps.run(Step::Start, |step| self.step(step));
    }

    fn stop(&self) {
        {
            let mut inner = lock(&self.inner);
            if inner.status == InterpreterStatus::Stopped {
                return;
            }
            inner.status = InterpreterStatus::Stopped;
            inner.done_handlers.clear();
        }
        debug!("Interpreter '{}' stopped", self.options.id);
        self.observers.clear();
    }

    fn send(&self, event: Envelope) {
        self.steps.run(Step::Event(event), |step| self.step(step));
    }

    fn subscribe(&self, mut observer: Observer<MachineState>) -> Subscription {
        if self.status() == InterpreterStatus::Stopped {
            observer.complete();
            return Subscription::closed();
        }
        self.observers.insert(observer)
    }

    fn on_done(&self, handler: DoneHandler) {
        lock(&self.inner).done_handlers.push(handler);
    }

    fn state(&self) -> MachineState {
        lock(&self.inner).state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn toggle() -> StateMachine {
        StateMachine::new("toggle", "off")
            .transition("off", "TOGGLE", "on")
            .transition("on", "TOGGLE", "off")
            .transition("on", "BREAK", "broken")
            .final_state("broken", json!({"reason": "overuse"}))
    }

    fn send(interpreter: &MachineInterpreter, name: &str) {
        interpreter.send(Envelope::new(Event::message(name)));
    }

    #[test]
    fn test_transitions_by_event_name() {
        let interpreter = MachineInterpreter::start_standalone(toggle());
        send(&interpreter, "TOGGLE");
        assert!(interpreter.state().matches("on"));
        send(&interpreter, "UNKNOWN");
        assert!(interpreter.state().matches("on"));
        send(&interpreter, "TOGGLE");
        assert!(interpreter.state().matches("off"));
        assert_eq!(interpreter.state().event.as_deref(), Some("TOGGLE"));
    }

    #[test]
    fn test_final_state_fires_done_once() {
        let interpreter = MachineInterpreter::new(
            toggle(),
            InterpreterOptions {
                parent: None,
                id: "toggle".to_string(),
                sync: false,
            },
        );
        let outputs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outputs);
        interpreter.on_done(Box::new(move |output| sink.lock().unwrap().push(output)));
        interpreter.start();

        send(&interpreter, "TOGGLE");
        send(&interpreter, "BREAK");
        send(&interpreter, "TOGGLE");

        assert_eq!(*outputs.lock().unwrap(), vec![json!({"reason": "overuse"})]);
        assert_eq!(interpreter.status(), InterpreterStatus::Stopped);
        assert!(interpreter.state().done);
    }

    #[test]
    fn test_subscribers_see_initial_state_on_start() {
        let interpreter = MachineInterpreter::new(
            toggle(),
            InterpreterOptions {
                parent: None,
                id: "toggle".to_string(),
                sync: true,
            },
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        interpreter.subscribe(Observer::from_next(move |state: &MachineState| {
            sink.lock().unwrap().push(state.value.clone())
        }));

        interpreter.start();
        send(&interpreter, "TOGGLE");

        assert_eq!(*seen.lock().unwrap(), vec!["off", "on"]);
    }

    #[test]
    fn test_subscriber_can_send_to_its_own_interpreter() {
        let interpreter = MachineInterpreter::new(
            toggle(),
            InterpreterOptions {
                parent: None,
                id: "toggle".to_string(),
                sync: true,
            },
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let inner = interpreter.clone();
        interpreter.subscribe(Observer::from_next(move |state: &MachineState| {
            sink.lock().unwrap().push(state.value.clone());
            if state.matches("on") {
                send(&inner, "BREAK");
                // Queued behind the current step, not applied yet.
                assert!(inner.state().matches("on"));
            }
        }));

        interpreter.start();
        send(&interpreter, "TOGGLE");

        assert_eq!(*seen.lock().unwrap(), vec!["off", "on", "broken"]);
        assert_eq!(interpreter.status(), InterpreterStatus::Stopped);
    }

    #[test]
    fn test_done_hook_sending_is_dropped() {
        let interpreter = MachineInterpreter::start_standalone(toggle());
        let inner = interpreter.clone();
        interpreter.on_done(Box::new(move |_| send(&inner, "TOGGLE")));

        send(&interpreter, "TOGGLE");
        send(&interpreter, "BREAK");

        assert!(interpreter.state().matches("broken"));
        assert_eq!(interpreter.status(), InterpreterStatus::Stopped);
    }

    #[test]
    fn test_stop_suppresses_done() {
        let interpreter = MachineInterpreter::start_standalone(toggle());
        let fired = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&fired);
        interpreter.on_done(Box::new(move |_| *flag.lock().unwrap() = true));

        interpreter.stop();
        send(&interpreter, "TOGGLE");
        send(&interpreter, "BREAK");

        assert!(!*fired.lock().unwrap());
        assert!(interpreter.state().matches("off"));
    }

    #[test]
    fn test_validate_rejects_transitions_out_of_final() {
        let machine = toggle().transition("broken", "FIX", "off");
        assert!(machine.validate().is_err());
    }
}
