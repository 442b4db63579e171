use thiserror::Error;

/// # BehaviorError
///
/// Failures that reach the caller of this crate. Failures of the wrapped
/// process itself never show up here; they are turned into error events for
/// the parent instead.
#[derive(Error, Debug)]
pub enum BehaviorError {
    /// The candidate passed to the dispatch factory exposes no spawnable capability
    #[error("Unsupported entity: {0}")]
    UnsupportedEntity(String),

    /// The mailbox of a driven behavior is gone
    #[error("Behavior mailbox closed")]
    ChannelClosed,

    /// The driven behavior was already stopped
    #[error("Behavior already stopped")]
    AlreadyStopped,

    /// Failed to serialize or deserialize data
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
