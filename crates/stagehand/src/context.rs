use crate::id::ActorId;

/// Identity handed to a behavior on every call.
///
/// `self_id` tags outgoing envelopes with their origin and `name` seeds the
/// `source_name` of synthesized completion and error events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub self_id: ActorId,
    pub name: String,
}

impl ActorContext {
    pub fn new(self_id: ActorId, name: impl Into<String>) -> Self {
        Self {
            self_id,
            name: name.into(),
        }
    }

    /// A context with a freshly generated id.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(ActorId::generate(), name)
    }
}
