mod common;

use common::{context, message, ObserverLog};
use pretty_assertions::assert_eq;
use serde_json::json;
use stagehand::interpreter::DoneHandler;
use stagehand::statechart::InterpreterStatus;
use stagehand::{
    ActorId, Behavior, Envelope, Interpreter, LifecycleSignal, MachineInterpreter, MachineState,
    Observer, ServiceBehavior, StateMachine, Subscribe, Subscription,
};
use std::sync::{Arc, Mutex};

/// Interpreter double that records what it is asked to do
#[derive(Clone, Default)]
struct RecordingInterpreter {
    received: Arc<Mutex<Vec<Envelope>>>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl Interpreter for RecordingInterpreter {
    type State = u32;

    fn start(&self) {
        self.calls.lock().unwrap().push("start");
    }

    fn stop(&self) {
        self.calls.lock().unwrap().push("stop");
    }

    fn send(&self, event: Envelope) {
        self.received.lock().unwrap().push(event);
    }

    fn subscribe(&self, _observer: Observer<u32>) -> Subscription {
        Subscription::closed()
    }

    fn on_done(&self, _handler: DoneHandler) {}

    fn state(&self) -> u32 {
        self.received.lock().unwrap().len() as u32
    }
}

fn counter() -> StateMachine {
    StateMachine::new("counter", "zero")
        .transition("zero", "INC", "one")
        .transition("one", "INC", "two")
}

#[test_log::test(tokio::test)]
async fn test_receive_retags_origin_as_self() {
    let interpreter = RecordingInterpreter::default();
    let ctx = context("service");
    let stranger = ActorId::generate();

    let _behavior = ServiceBehavior::new(interpreter.clone())
        .receive(&ctx, message("HELLO"))
        .receive(&ctx, Envelope::from_origin(stagehand::Event::message("BYE"), stranger));

    let received = interpreter.received.lock().unwrap();
    assert_eq!(received.len(), 2);
    assert!(received
        .iter()
        .all(|envelope| envelope.origin == Some(ctx.self_id.clone())));
    assert_eq!(received[1].name(), "BYE");
}

#[tokio::test]
async fn test_signals_leave_interpreter_alone() {
    let interpreter = RecordingInterpreter::default();
    let ctx = context("service");

    let _behavior = ServiceBehavior::new(interpreter.clone())
        .receive_signal(&ctx, LifecycleSignal::Start)
        .receive_signal(&ctx, LifecycleSignal::Stop);

    assert!(interpreter.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_service_keeps_running_after_stop_signal() {
    let interpreter = MachineInterpreter::start_standalone(counter());
    let ctx = context("service");

    let _behavior = ServiceBehavior::new(interpreter.clone())
        .receive_signal(&ctx, LifecycleSignal::Stop)
        .receive(&ctx, message("INC"));

    assert_eq!(interpreter.status(), InterpreterStatus::Running);
    assert!(interpreter.state().matches("one"));
}

#[tokio::test]
async fn test_initial_is_state_at_wrap_time() {
    let interpreter = MachineInterpreter::start_standalone(counter());
    interpreter.send(message("INC"));
    let ctx = context("service");

    let behavior = ServiceBehavior::new(interpreter.clone()).receive(&ctx, message("INC"));

    let initial: MachineState = behavior.initial().unwrap();
    assert!(initial.matches("one"));
    assert!(interpreter.state().matches("two"));
}

#[tokio::test]
async fn test_subscribe_delegates_to_interpreter() {
    let interpreter = MachineInterpreter::start_standalone(counter());
    let ctx = context("service");
    let log = ObserverLog::default();
    let behavior = ServiceBehavior::new(interpreter);

    let subscription = behavior
        .subscribe(log.observer().contramap(|state: &MachineState| json!(state.value.clone())))
        .unwrap();
    let behavior = behavior.receive(&ctx, message("INC"));
    subscription.unsubscribe();
    let _behavior = behavior.receive(&ctx, message("INC"));

    assert_eq!(log.entries(), vec![r#"next:"one""#]);
}
