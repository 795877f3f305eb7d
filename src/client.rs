use crate::config::AxiumConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::Command;
use crate::session::{Session, SessionPhase};
use crate::state::StateStore;
use crate::subscription::StateReceiver;
use crate::types::{StateSnapshot, ZoneId};
use crate::zone::Zone;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Client for one Axium amplifier
///
/// The `AxiumClient` runs the startup sequence, keeps the long-poll event
/// stream open in the background and provides access to zone controls and
/// state subscriptions.
pub struct AxiumClient {
    connection: Connection,
    store: Arc<StateStore>,
    session: Mutex<Session>,
    phase_rx: watch::Receiver<SessionPhase>,
}

impl AxiumClient {
    /// Connect to the amplifier described by `config`
    ///
    /// Only configuration errors fail here. An unreachable amplifier still
    /// yields a client; its zones stay unknown until the stream connects.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use axium_amp::{AxiumClient, AxiumConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = AxiumConfig::new("192.168.1.50").with_zones([1, 2, 3]);
    ///     let client = AxiumClient::connect(config).await?;
    ///     for zone in client.zones() {
    ///         println!("{}: {:?}", zone.display_name(), zone.power());
    ///     }
    ///     client.shutdown().await;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: AxiumConfig) -> Result<Self> {
        config.validate()?;

        let connection = Connection::new(&config.host, config.request_timeout, config.batch_timeout)?;
        let store = Arc::new(StateStore::new(&config.zones));
        let mut session = Session::new(connection.clone(), store.clone(), &config);
        let phase_rx = session.subscribe_phase();

        tracing::info!("Connecting to Axium amplifier at {}", config.host);
        session.start().await;

        Ok(Self {
            connection,
            store,
            session: Mutex::new(session),
            phase_rx,
        })
    }

    /// Get Zone interfaces for every configured zone
    pub fn zones(&self) -> Vec<Zone> {
        self.store
            .configured_zones()
            .into_iter()
            .map(|id| self.make_zone(id))
            .collect()
    }

    /// Get the Zone interface for a configured zone
    pub fn zone(&self, id: ZoneId) -> Option<Zone> {
        self.store
            .configured_zones()
            .contains(&id)
            .then(|| self.make_zone(id))
    }

    fn make_zone(&self, id: ZoneId) -> Zone {
        Zone::new(id, self.connection.clone(), self.store.clone())
    }

    /// Get a consistent snapshot of every tracked zone
    pub fn snapshot(&self) -> StateSnapshot {
        self.store.snapshot()
    }

    /// Subscribe to state updates
    ///
    /// Multiple subscriptions can be active simultaneously.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use axium_amp::{AxiumClient, AxiumConfig, StateUpdate};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = AxiumClient::connect(AxiumConfig::new("192.168.1.50")).await?;
    ///     let mut rx = client.subscribe_state();
    ///
    ///     while let Ok(update) = rx.recv().await {
    ///         if let StateUpdate::Snapshot(snapshot) = update {
    ///             println!("{} zones", snapshot.zones.len());
    ///         }
    ///     }
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe_state(&self) -> StateReceiver {
        StateReceiver::new(self.store.subscribe())
    }

    /// Current session phase
    pub fn phase(&self) -> SessionPhase {
        *self.phase_rx.borrow()
    }

    /// Watch session phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase_rx.clone()
    }

    /// Send a raw command and apply whatever the amplifier answers
    pub async fn send(&self, command: &Command) -> Result<()> {
        let text = self.connection.send(command).await?;
        self.store.ingest_text(&text, "command");
        Ok(())
    }

    /// Stop the background tasks
    ///
    /// The last published state stays readable afterwards.
    pub async fn shutdown(&self) {
        self.session.lock().await.stop().await;
        tracing::info!("Axium session stopped");
    }
}
