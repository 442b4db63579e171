//! # Events
//!
//! Domain events exchanged between actors, plus the completion, failure and
//! synchronization events synthesized on behalf of a wrapped process.

use crate::id::ActorId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Event name prefix for completion of an invoked process
pub const DONE_INVOKE_PREFIX: &str = "done.invoke";
/// Event name prefix for failure of an invoked process
pub const ERROR_PLATFORM_PREFIX: &str = "error.platform";
/// Event name for a relayed nested machine state
pub const UPDATE_EVENT: &str = "xstate.update";

/// An event delivered to or emitted by a behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Event {
    /// A plain domain event
    Message { payload: Value },

    /// The wrapped process finished with `payload`
    DoneInvoke { source_name: String, payload: Value },

    /// The wrapped process failed with `reason`
    Error { source_name: String, reason: Value },

    /// A nested machine moved to `state`
    Update { state: Value },
}

impl Event {
    pub fn message(payload: impl Into<Value>) -> Self {
        Event::Message {
            payload: payload.into(),
        }
    }

    pub fn done_invoke(source_name: impl Into<String>, payload: Value) -> Self {
        Event::DoneInvoke {
            source_name: source_name.into(),
            payload,
        }
    }

    /// Builds an error event from a failure, keeping its full context chain.
    pub fn error(source_name: impl Into<String>, reason: &anyhow::Error) -> Self {
        Event::Error {
            source_name: source_name.into(),
            reason: Value::String(format!("{reason:#}")),
        }
    }

    pub fn update(state: Value) -> Self {
        Event::Update { state }
    }

    /// The wire kind of this event, matching its serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Message { .. } => "message",
            Event::DoneInvoke { .. } => "done-invoke",
            Event::Error { .. } => "error",
            Event::Update { .. } => "update",
        }
    }

    /// SCXML-style event name used by interpreters to pick transitions.
    ///
    /// A message is named by the `"type"` field of an object payload, or by
    /// the payload itself when it is a string. Anything else is unnamed.
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Event::Message { payload } => match payload {
                Value::String(name) => Cow::Borrowed(name.as_str()),
                Value::Object(map) => match map.get("type") {
                    Some(Value::String(name)) => Cow::Borrowed(name.as_str()),
                    _ => Cow::Borrowed(""),
                },
                _ => Cow::Borrowed(""),
            },
            Event::DoneInvoke { source_name, .. } => {
                Cow::Owned(format!("{}.{}", DONE_INVOKE_PREFIX, source_name))
            }
            Event::Error { source_name, .. } => {
                Cow::Owned(format!("{}.{}", ERROR_PLATFORM_PREFIX, source_name))
            }
            Event::Update { .. } => Cow::Borrowed(UPDATE_EVENT),
        }
    }

    /// The plain payload carried by this event.
    pub fn payload(&self) -> &Value {
        match self {
            Event::Message { payload } => payload,
            Event::DoneInvoke { payload, .. } => payload,
            Event::Error { reason, .. } => reason,
            Event::Update { state } => state,
        }
    }

    pub fn into_payload(self) -> Value {
        match self {
            Event::Message { payload } => payload,
            Event::DoneInvoke { payload, .. } => payload,
            Event::Error { reason, .. } => reason,
            Event::Update { state } => state,
        }
    }
}

/// # Envelope
///
/// An event tagged with the actor that sent it. This is the unit that crosses
/// actor boundaries; interpreting it is the receiving system's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: Event,
    pub origin: Option<ActorId>,
}

impl Envelope {
    /// Wraps an event with no known origin.
    pub fn new(event: Event) -> Self {
        Self {
            event,
            origin: None,
        }
    }

    pub fn from_origin(event: Event, origin: ActorId) -> Self {
        Self {
            event,
            origin: Some(origin),
        }
    }

    /// Re-tags the envelope as coming from `origin`.
    pub fn with_origin(mut self, origin: ActorId) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn name(&self) -> Cow<'_, str> {
        self.event.name()
    }

    pub fn payload(&self) -> &Value {
        self.event.payload()
    }
}

impl From<Event> for Envelope {
    fn from(event: Event) -> Self {
        Envelope::new(event)
    }
}
