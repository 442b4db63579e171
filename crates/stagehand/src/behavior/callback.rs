//! # Callback Behavior
//!
//! Wraps a function that is started once with two capabilities: a sender that
//! forwards values to the parent, and a registrar for functions that should see
//! every event this actor receives.

use super::{emit, spawn_continuation, Behavior, Deferred};
use crate::actor_ref::ParentRef;
use crate::context::ActorContext;
use crate::event::{Envelope, Event};
use crate::observer::lock;
use crate::signal::LifecycleSignal;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, trace, warn};

/// Cleanup returned by a callback, run once on `Stop`.
pub type Disposer = Box<dyn FnOnce() + Send>;

/// The wrapped function itself.
pub type CallbackFn = Box<dyn FnOnce(CallbackSender, ReceiverRegistrar) -> CallbackReturn + Send>;

type Receiver = Arc<Mutex<Box<dyn FnMut(&Value) + Send>>>;

/// What a callback hands back when it is started.
pub enum CallbackReturn {
    /// Nothing to clean up or wait for
    None,
    /// Run on `Stop`
    Disposer(Disposer),
    /// Settles into a completion or error event for the parent. It is driven
    /// on the current tokio runtime; without one the callback fails with an
    /// error event on `Start`.
    Deferred(Deferred<Value>),
}

impl CallbackReturn {
    pub fn disposer(dispose: impl FnOnce() + Send + 'static) -> Self {
        CallbackReturn::Disposer(Box::new(dispose))
    }

    pub fn deferred(future: impl Future<Output = anyhow::Result<Value>> + Send + 'static) -> Self {
        CallbackReturn::Deferred(future.boxed())
    }
}

impl From<()> for CallbackReturn {
    fn from(_: ()) -> Self {
        CallbackReturn::None
    }
}

impl fmt::Debug for CallbackReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackReturn::None => write!(f, "None"),
            CallbackReturn::Disposer(_) => write!(f, "Disposer"),
            CallbackReturn::Deferred(_) => write!(f, "Deferred"),
        }
    }
}

struct CallbackState {
    canceled: bool,
    receivers: Vec<Receiver>,
    disposer: Option<Disposer>,
}

/// Forwards values from the callback to the parent as domain events.
#[derive(Clone)]
pub struct CallbackSender {
    parent: ParentRef,
    ctx: ActorContext,
    state: Arc<Mutex<CallbackState>>,
}

impl CallbackSender {
    /// Forwards `payload` unless the callback was stopped or its deferred
    /// value already settled.
    pub fn send(&self, payload: impl Into<Value>) {
        let event = Event::message(payload);
        let state = lock(&self.state);
        if state.canceled {
            trace!("Callback '{}' is canceled, dropping sent value", self.ctx.name);
            return;
        }
        emit(&self.parent, &self.ctx, event);
    }
}

/// Registers functions that receive the payload of every incoming event.
#[derive(Clone)]
pub struct ReceiverRegistrar {
    state: Arc<Mutex<CallbackState>>,
}

impl ReceiverRegistrar {
    pub fn register(&self, receiver: impl FnMut(&Value) + Send + 'static) {
        let receiver: Box<dyn FnMut(&Value) + Send> = Box::new(receiver);
        lock(&self.state).receivers.push(Arc::new(Mutex::new(receiver)));
    }
}

/// # CallbackBehavior
///
/// Events received before the callback registers any receiver are dropped,
/// not buffered.
pub struct CallbackBehavior {
    parent: ParentRef,
    callback: Option<CallbackFn>,
    state: Arc<Mutex<CallbackState>>,
}

impl CallbackBehavior {
    pub fn new(
        parent: ParentRef,
        callback: impl FnOnce(CallbackSender, ReceiverRegistrar) -> CallbackReturn + Send + 'static,
    ) -> Self {
        Self::from_boxed(parent, Box::new(callback))
    }

    pub fn from_boxed(parent: ParentRef, callback: CallbackFn) -> Self {
        Self {
            parent,
            callback: Some(callback),
            state: Arc::new(Mutex::new(CallbackState {
                canceled: false,
                receivers: Vec::new(),
                disposer: None,
            })),
        }
    }

    pub fn is_canceled(&self) -> bool {
        lock(&self.state).canceled
    }

    fn start(&mut self, ctx: &ActorContext) {
        let Some(callback) = self.callback.take() else {
            warn!("Callback '{}' was already started", ctx.name);
            return;
        };
        debug!("Starting callback '{}'", ctx.name);

        let sender = CallbackSender {
            parent: self.parent.clone(),
            ctx: ctx.clone(),
            state: Arc::clone(&self.state),
        };
        let registrar = ReceiverRegistrar {
            state: Arc::clone(&self.state),
        };

        match callback(sender, registrar) {
            CallbackReturn::None => {}
            CallbackReturn::Disposer(disposer) => {
                lock(&self.state).disposer = Some(disposer);
            }
            CallbackReturn::Deferred(deferred) => {
                let parent = self.parent.clone();
                let state = Arc::clone(&self.state);
                let task_ctx = ctx.clone();
                let continuation = async move {
                    let outcome = deferred.await;
                    settle(&parent, &state, &task_ctx, outcome);
                };
                if let Err(e) = spawn_continuation(continuation) {
                    error!("Callback '{}' cannot run its deferred value: {:#}", ctx.name, e);
                    settle(&self.parent, &self.state, ctx, Err(e));
                }
            }
        }
    }

    fn stop(&mut self, ctx: &ActorContext) {
        let disposer = {
            let mut state = lock(&self.state);
            state.canceled = true;
            state.disposer.take()
        };
        debug!("Stopping callback '{}'", ctx.name);
        if let Some(dispose) = disposer {
            dispose();
        }
    }
}

/// Reports a settled deferred value once, unless `Stop` got there first.
/// Settling cancels the callback, so its sender goes quiet afterwards.
fn settle(
    parent: &ParentRef,
    state: &Mutex<CallbackState>,
    ctx: &ActorContext,
    outcome: anyhow::Result<Value>,
) {
    let event = match outcome {
        Ok(value) => Event::done_invoke(ctx.name.clone(), value),
        Err(e) => Event::error(ctx.name.clone(), &e),
    };
    let mut state = lock(state);
    if state.canceled {
        trace!("Callback '{}' settled after cancel", ctx.name);
        return;
    }
    state.canceled = true;
    emit(parent, ctx, event);
}

impl Behavior for CallbackBehavior {
    type Emitted = ();

    fn receive(self, ctx: &ActorContext, event: Envelope) -> Self {
        let receivers: Vec<Receiver> = lock(&self.state).receivers.clone();
        if receivers.is_empty() {
            trace!("Callback '{}' has no receivers, dropping event", ctx.name);
        }
        let payload = event.payload();
        for receiver in receivers {
            let mut receive = lock(&receiver);
            (*receive)(payload);
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

    fn initial(&self) -> Option<()> {
        None
    }
}
