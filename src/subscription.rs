use crate::error::{AxiumError, Result};
use crate::types::StateSnapshot;
use std::time::Duration;
use tokio::sync::broadcast;

/// Update published by the session
#[derive(Debug, Clone)]
pub enum StateUpdate {
    /// At least one tracked value changed; full state after the change
    Snapshot(Box<StateSnapshot>),

    /// The long-poll stream is open
    StreamConnected,

    /// The long-poll stream failed and will be reopened after `retry_in`
    StreamLost { retry_in: Duration },
}

/// Receiver for state updates
pub struct StateReceiver {
    rx: broadcast::Receiver<StateUpdate>,
}

impl StateReceiver {
    /// Create a new state receiver
    pub(crate) fn new(rx: broadcast::Receiver<StateUpdate>) -> Self {
        Self { rx }
    }

    /// Receive the next state update
    ///
    /// Fails with `ConnectionClosed` once the client has been dropped.
    pub async fn recv(&mut self) -> Result<StateUpdate> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => AxiumError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                AxiumError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive a state update without blocking
    ///
    /// Returns `None` if no message is available.
    pub fn try_recv(&mut self) -> Result<Option<StateUpdate>> {
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(AxiumError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(AxiumError::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }

    /// Wait for the next snapshot, skipping connectivity notices
    pub async fn next_snapshot(&mut self) -> Result<StateSnapshot> {
        loop {
            if let StateUpdate::Snapshot(snapshot) = self.recv().await? {
                return Ok(*snapshot);
            }
        }
    }
}
