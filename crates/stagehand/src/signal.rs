use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle control sent by the owning supervisor, distinct from domain events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleSignal {
    /// The actor has been spawned; bring the wrapped process up
    Start,
    /// The actor is being torn down; no further outbound effects
    Stop,
}

impl fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleSignal::Start => write!(f, "start"),
            LifecycleSignal::Stop => write!(f, "stop"),
        }
    }
}
