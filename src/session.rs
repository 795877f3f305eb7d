use crate::config::AxiumConfig;
use crate::connection::Connection;
use crate::error::{AxiumError, Result};
use crate::protocol::{Command, LineSplitter};
use crate::state::StateStore;
use crate::subscription::StateUpdate;
use crate::types::ZoneId;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Init,
    Probing,
    WebAppInit,
    ZoneSnapshot,
    /// Long-poll stream open
    Streaming,
    /// Long-poll stream lost, waiting to reopen
    Reconnecting,
    Stopped,
}

/// Exponential reconnect delay: initial, doubling per failure, capped
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait after a failure; the next one doubles
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Back to the initial delay after a successful reconnect
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Startup sequencing plus the background stream and name-retry tasks
///
/// Transport errors during startup are logged and skipped; the stream loop
/// retries forever until [`Session::stop`].
pub(crate) struct Session {
    connection: Connection,
    store: Arc<StateStore>,
    zones: Vec<ZoneId>,
    name_retry_delay: Duration,
    backoff: Backoff,
    phase_tx: watch::Sender<SessionPhase>,
    stop_tx: Option<broadcast::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    pub(crate) fn new(connection: Connection, store: Arc<StateStore>, config: &AxiumConfig) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Init);
        Self {
            connection,
            store,
            zones: config.zones.clone(),
            name_retry_delay: config.name_retry_delay,
            backoff: Backoff::new(config.backoff_initial, config.backoff_max),
            phase_tx,
            stop_tx: None,
            tasks: Vec::new(),
        }
    }

    pub(crate) fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    /// Run the startup phases, then start streaming and the name retry
    ///
    /// If the session is already running it is stopped first.
    pub(crate) async fn start(&mut self) {
        self.stop().await;
        self.phase_tx.send_replace(SessionPhase::Init);

        bring_up(&self.connection, &self.store, &self.zones, &self.phase_tx).await;

        let (stop_tx, _) = broadcast::channel(1);
        self.stop_tx = Some(stop_tx.clone());

        let connection = self.connection.clone();
        let store = self.store.clone();
        let phase_tx = self.phase_tx.clone();
        let backoff = self.backoff.clone();
        let stop_rx = stop_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            long_poll_loop(connection, store, backoff, phase_tx, stop_rx).await;
        }));

        let connection = self.connection.clone();
        let store = self.store.clone();
        let delay = self.name_retry_delay;
        let mut stop_rx = stop_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = stop_rx.recv() => {}
                _ = retry_missing_names(&connection, &store, delay) => {}
            }
        }));
    }

    /// Stop the background tasks and release any open stream
    pub(crate) async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        for mut handle in self.tasks.drain(..) {
            // Give it a moment to stop gracefully
            if tokio::time::timeout(Duration::from_millis(500), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }
        if *self.phase_tx.borrow() != SessionPhase::Init {
            self.phase_tx.send_replace(SessionPhase::Stopped);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for handle in &self.tasks {
            handle.abort();
        }
    }
}

/// Probe, web-app init burst, then one snapshot burst per zone
async fn bring_up(
    connection: &Connection,
    store: &StateStore,
    zones: &[ZoneId],
    phase_tx: &watch::Sender<SessionPhase>,
) {
    phase_tx.send_replace(SessionPhase::Probing);
    match connection.initial_probe().await {
        Ok(text) => {
            store.ingest_text(&text, "probe");
        }
        Err(e) => tracing::debug!("Initial probe failed: {}", e),
    }

    phase_tx.send_replace(SessionPhase::WebAppInit);
    match connection.webapp_init_burst().await {
        Ok(text) => {
            store.ingest_text(&text, "webinit");
        }
        Err(e) => tracing::debug!("Web-app init burst failed: {}", e),
    }

    phase_tx.send_replace(SessionPhase::ZoneSnapshot);
    for (index, zone) in zones.iter().enumerate() {
        match connection.snapshot_burst(*zone, index == 0).await {
            Ok(text) => {
                store.ingest_text(&text, "snapshot");
            }
            Err(e) => tracing::debug!("Snapshot burst failed for zone {}: {}", zone, e),
        }
    }

    tracing::info!("Startup complete for {} zone(s)", zones.len());
}

async fn long_poll_loop(
    connection: Connection,
    store: Arc<StateStore>,
    mut backoff: Backoff,
    phase_tx: watch::Sender<SessionPhase>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut retry_in: Option<Duration> = None;

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                tracing::info!("Long-poll stopped");
                break;
            }
            _ = async {
                if let Some(delay) = retry_in.take() {
                    sleep(delay).await;
                }

                let err = match read_stream(&connection, &store, &mut backoff, &phase_tx).await {
                    Ok(()) => AxiumError::ConnectionClosed,
                    Err(e) => e,
                };

                // Exponential backoff: 1s, 2s, 4s, 8s, 16s, 30s (max)
                let delay = backoff.next_delay();
                tracing::warn!("Long-poll error, retrying in {:?}: {}", delay, err);
                phase_tx.send_replace(SessionPhase::Reconnecting);
                store.notify(StateUpdate::StreamLost { retry_in: delay });
                retry_in = Some(delay);
            } => {}
        }
    }
}

/// Open the stream and apply lines until it ends
///
/// Returns `Ok(())` when the amplifier closes the body cleanly.
async fn read_stream(
    connection: &Connection,
    store: &StateStore,
    backoff: &mut Backoff,
    phase_tx: &watch::Sender<SessionPhase>,
) -> Result<()> {
    let response = connection.open_long_poll().await?;
    backoff.reset();
    phase_tx.send_replace(SessionPhase::Streaming);
    store.notify(StateUpdate::StreamConnected);
    tracing::info!("Long-poll stream connected");

    let mut splitter = LineSplitter::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        for line in splitter.push(&chunk?) {
            store.ingest_line(&line, "stream");
        }
    }
    if let Some(line) = splitter.finish() {
        store.ingest_line(&line, "stream");
    }

    Ok(())
}

/// Re-request names for configured zones that still have none
async fn retry_missing_names(connection: &Connection, store: &StateStore, delay: Duration) {
    sleep(delay).await;

    let missing = store.zones_missing_names();
    if missing.is_empty() {
        return;
    }

    tracing::debug!("Retrying zone-name request for zones missing names: {:?}", missing);
    let commands: Vec<Command> = missing
        .iter()
        .map(|zone| Command::request_zone_names(Some(*zone)))
        .collect();

    match connection.send_batch(&commands).await {
        Ok(text) => {
            store.ingest_text(&text, "names");
        }
        Err(e) => tracing::debug!("Zone-name retry failed: {}", e),
    }
}
