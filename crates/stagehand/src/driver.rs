//! # Behavior Driver
//!
//! Runs one behavior on its own task behind a mailbox, the way a supervisor
//! drives a spawned actor: `Start` first, received events in mailbox order,
//! and `Stop` exactly once, either on request or when every handle is gone.

use crate::behavior::Behavior;
use crate::config::StagehandConfig;
use crate::context::ActorContext;
use crate::errors::BehaviorError;
use crate::event::{Envelope, Event};
use crate::id::ActorId;
use crate::signal::LifecycleSignal;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

#[derive(Debug)]
enum BehaviorCommand {
    Receive(Envelope),
    Stop { response_tx: oneshot::Sender<()> },
}

/// # BehaviorHandle
///
/// Cloneable handle to a driven behavior. Dropping the last handle stops it.
#[derive(Clone, Debug)]
pub struct BehaviorHandle {
    context: ActorContext,
    command_tx: mpsc::Sender<BehaviorCommand>,
}

impl BehaviorHandle {
    pub fn id(&self) -> &ActorId {
        &self.context.self_id
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    /// Queues an envelope for the behavior.
    pub async fn send(&self, envelope: Envelope) -> Result<(), BehaviorError> {
        self.command_tx
            .send(BehaviorCommand::Receive(envelope))
            .await
            .map_err(|e| {
                error!("Failed to deliver to behavior '{}': {}", self.context.name, e);
                BehaviorError::ChannelClosed
            })
    }

    /// Queues a plain domain event tagged with `origin`.
    pub async fn send_from(&self, event: Event, origin: ActorId) -> Result<(), BehaviorError> {
        self.send(Envelope::from_origin(event, origin)).await
    }

    /// Stops the behavior after everything already queued, and waits for it.
    pub async fn stop(&self) -> Result<(), BehaviorError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(BehaviorCommand::Stop { response_tx })
            .await
            .map_err(|_| BehaviorError::AlreadyStopped)?;
        // A concurrent stop won the race and our request was discarded
        response_rx.await.map_err(|_| BehaviorError::AlreadyStopped)
    }

    pub fn is_stopped(&self) -> bool {
        self.command_tx.is_closed()
    }
}

/// Starts `behavior` on a new tokio task and returns a handle to it.
///
/// # Panics
///
/// Panics when called outside a tokio runtime, like [`tokio::spawn`].
pub fn spawn_behavior<B>(
    behavior: B,
    context: ActorContext,
    config: &StagehandConfig,
) -> BehaviorHandle
where
    B: Behavior + 'static,
{
    let (command_tx, mut command_rx) = mpsc::channel(config.mailbox_capacity.max(1));
    let handle = BehaviorHandle {
        context: context.clone(),
        command_tx,
    };

    tokio::spawn(async move {
        debug!("Starting behavior '{}' ({})", context.name, context.self_id);
        let mut behavior = behavior.receive_signal(&context, LifecycleSignal::Start);

        while let Some(command) = command_rx.recv().await {
            match command {
                BehaviorCommand::Receive(envelope) => {
                    behavior = behavior.receive(&context, envelope);
                }
                BehaviorCommand::Stop { response_tx } => {
                    command_rx.close();
                    let _ = behavior.receive_signal(&context, LifecycleSignal::Stop);
                    debug!("Behavior '{}' stopped", context.name);
                    let _ = response_tx.send(());
                    return;
                }
            }
        }

        debug!("All handles to behavior '{}' dropped, stopping", context.name);
        let _ = behavior.receive_signal(&context, LifecycleSignal::Stop);
    });

    handle
}
