use crate::connection::Connection;
use crate::error::{AxiumError, Result};
use crate::protocol::{Command, Event};
use crate::state::StateStore;
use crate::types::{Power, SourceIndex, ZoneId, ZoneSnapshot};
use std::sync::Arc;

/// Interface for controlling one amplifier zone
///
/// Accessors read the shared state; commands are sent to the amplifier and
/// applied locally as soon as the request succeeds, so readers see the new
/// value before the amplifier echoes it on the event stream.
#[derive(Clone)]
pub struct Zone {
    id: ZoneId,
    connection: Connection,
    store: Arc<StateStore>,
}

impl Zone {
    pub(crate) fn new(id: ZoneId, connection: Connection, store: Arc<StateStore>) -> Self {
        Self {
            id,
            connection,
            store,
        }
    }

    /// Get the zone number
    pub fn id(&self) -> ZoneId {
        self.id
    }

    /// Get a snapshot of the zone's state
    pub fn snapshot(&self) -> ZoneSnapshot {
        self.store
            .zone(self.id)
            .unwrap_or_else(|| ZoneSnapshot::unknown(self.id))
    }

    pub fn power(&self) -> Option<Power> {
        self.snapshot().power
    }

    /// Raw volume byte (0..=max_volume)
    pub fn volume(&self) -> Option<u8> {
        self.snapshot().volume
    }

    /// Volume as a fraction of the zone's ceiling
    pub fn volume_level(&self) -> Option<f64> {
        self.snapshot().volume_level()
    }

    pub fn max_volume(&self) -> u8 {
        self.snapshot().max_volume
    }

    /// Get the selected logical source
    pub fn source(&self) -> Option<SourceIndex> {
        self.snapshot().source
    }

    /// Get the label of the selected source
    pub fn source_label(&self) -> Option<String> {
        let snapshot = self.snapshot();
        snapshot.source.map(|s| snapshot.source_label(s))
    }

    /// Get the labels of all eight inputs
    pub fn source_list(&self) -> Vec<String> {
        self.snapshot().source_list()
    }

    /// Get the name reported by the amplifier
    pub fn name(&self) -> Option<String> {
        self.snapshot().name
    }

    /// Get the reported name, or `Axium Z<n>` until one arrives
    pub fn display_name(&self) -> String {
        self.snapshot().display_name()
    }

    /// Switch the zone on or off
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use axium_amp::{AxiumClient, AxiumConfig, Power};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = AxiumClient::connect(AxiumConfig::new("192.168.1.50")).await?;
    /// let zone = client.zone(1).expect("zone 1 is configured");
    /// zone.set_power(Power::On).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn set_power(&self, power: Power) -> Result<()> {
        let command = Command::set_power(self.id, power.is_on());
        self.execute(command, Event::Power { zone: self.id, power }).await
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.set_power(Power::On).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.set_power(Power::Off).await
    }

    /// Set the raw volume byte
    ///
    /// Values above the zone's ceiling are clamped to it.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use axium_amp::{AxiumClient, AxiumConfig};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = AxiumClient::connect(AxiumConfig::new("192.168.1.50")).await?;
    /// let zone = client.zone(2).expect("zone 2 is configured");
    /// zone.set_volume(0x40).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn set_volume(&self, volume: u8) -> Result<()> {
        let volume = volume.min(self.max_volume());
        let command = Command::set_volume(self.id, volume);
        self.execute(command, Event::Volume { zone: self.id, volume }).await
    }

    /// Set volume as a fraction (0.0..=1.0) of the zone's ceiling
    pub async fn set_volume_level(&self, level: f64) -> Result<()> {
        let max = self.max_volume();
        let volume = (level.clamp(0.0, 1.0) * f64::from(max)).round() as u8;
        self.set_volume(volume).await
    }

    /// Select a logical source (0..=7)
    ///
    /// Out-of-range indices fail with `InvalidSource` without any request.
    pub async fn select_source(&self, source: SourceIndex) -> Result<()> {
        let command = Command::select_source(self.id, source)?;
        let event = Event::Source {
            zone: self.id,
            source,
            powered_on: false,
        };
        self.execute(command, event).await
    }

    /// Select a source by its label or by `S<n>`
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use axium_amp::{AxiumClient, AxiumConfig};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = AxiumClient::connect(AxiumConfig::new("192.168.1.50")).await?;
    /// let zone = client.zone(1).expect("zone 1 is configured");
    /// zone.select_source_by_name("Tuner").await?;
    /// zone.select_source_by_name("S2").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn select_source_by_name(&self, label: &str) -> Result<()> {
        let source = self
            .snapshot()
            .resolve_source(label)
            .ok_or_else(|| AxiumError::UnknownSource(label.to_string()))?;
        self.select_source(source).await
    }

    /// Ask the amplifier to report this zone's name again
    pub async fn request_name(&self) -> Result<()> {
        let text = self.connection.request_zone_names(Some(self.id)).await?;
        self.store.ingest_text(&text, "command");
        Ok(())
    }

    async fn execute(&self, command: Command, optimistic: Event) -> Result<()> {
        let text = self.connection.send(&command).await?;
        self.store.apply(&optimistic);
        self.store.ingest_text(&text, "command");
        Ok(())
    }
}
