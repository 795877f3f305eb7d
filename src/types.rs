use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Logical zone number (1..=95, plus the broadcast value 0xFF)
pub type ZoneId = u8;

/// Logical source index (0..=7)
pub type SourceIndex = u8;

/// Locally assigned group slot; never sent on the wire
pub type GroupId = u8;

/// Volume ceiling assumed until the amplifier reports one
pub const DEFAULT_MAX_VOLUME: u8 = 0xA0;

/// Zone power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Power {
    On,
    Off,
}

impl Power {
    pub fn is_on(self) -> bool {
        self == Power::On
    }
}

impl From<bool> for Power {
    fn from(on: bool) -> Self {
        if on {
            Power::On
        } else {
            Power::Off
        }
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Power::On => f.write_str("on"),
            Power::Off => f.write_str("off"),
        }
    }
}

/// Link options carried by a group frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupOptions(pub u8);

impl GroupOptions {
    pub const SOURCE_LINKED: u8 = 0x01;
    pub const VOLUME_LINKED: u8 = 0x02;
    pub const POWER_LINKED: u8 = 0x04;
    pub const EXTENDED_PREAMBLE: u8 = 0x80;

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn source_linked(self) -> bool {
        self.0 & Self::SOURCE_LINKED != 0
    }

    pub fn volume_linked(self) -> bool {
        self.0 & Self::VOLUME_LINKED != 0
    }

    pub fn power_linked(self) -> bool {
        self.0 & Self::POWER_LINKED != 0
    }

    /// Whether a five byte preamble precedes the zone list
    pub fn extended_preamble(self) -> bool {
        self.0 & Self::EXTENDED_PREAMBLE != 0
    }

    /// Preamble length in bytes, options byte included
    pub fn preamble_len(self) -> usize {
        if self.extended_preamble() {
            5
        } else {
            1
        }
    }
}

/// Published state of one zone
///
/// `None` means the amplifier has not reported the value yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub zone: ZoneId,
    pub power: Option<Power>,
    pub volume: Option<u8>,
    pub source: Option<SourceIndex>,
    pub max_volume: u8,
    pub name: Option<String>,
    #[serde(default)]
    pub source_names: BTreeMap<SourceIndex, String>,
    pub group: Option<GroupId>,
}

impl ZoneSnapshot {
    /// A zone nothing has been reported for yet
    pub fn unknown(zone: ZoneId) -> Self {
        Self {
            zone,
            power: None,
            volume: None,
            source: None,
            max_volume: DEFAULT_MAX_VOLUME,
            name: None,
            source_names: BTreeMap::new(),
            group: None,
        }
    }

    /// Name shown for the zone, falling back to `Axium Z<n>`
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Axium Z{}", self.zone))
    }

    /// Label for a source: the device-reported name or `S<n>`
    pub fn source_label(&self, source: SourceIndex) -> String {
        self.source_names
            .get(&source)
            .cloned()
            .unwrap_or_else(|| format!("S{}", source + 1))
    }

    /// Labels for all eight inputs, in logical order
    pub fn source_list(&self) -> Vec<String> {
        (0..crate::addressing::SOURCE_COUNT)
            .map(|i| self.source_label(i))
            .collect()
    }

    /// Resolve a source label (or a bare `S<n>`) to its logical index
    pub fn resolve_source(&self, label: &str) -> Option<SourceIndex> {
        let label = label.trim();
        if let Some(index) = (0..crate::addressing::SOURCE_COUNT).find(|i| self.source_label(*i) == label) {
            return Some(index);
        }
        let number: u8 = label.strip_prefix(['S', 's'])?.parse().ok()?;
        (1..=crate::addressing::SOURCE_COUNT)
            .contains(&number)
            .then(|| number - 1)
    }

    /// Volume as a fraction of the zone's ceiling, clamped to 0..=1
    pub fn volume_level(&self) -> Option<f64> {
        let max = if self.max_volume == 0 {
            DEFAULT_MAX_VOLUME
        } else {
            self.max_volume
        };
        self.volume
            .map(|v| (f64::from(v) / f64::from(max)).clamp(0.0, 1.0))
    }
}

/// Consistent view of every tracked zone, taken at publish time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub zones: BTreeMap<ZoneId, ZoneSnapshot>,
}

impl StateSnapshot {
    pub fn zone(&self, zone: ZoneId) -> Option<&ZoneSnapshot> {
        self.zones.get(&zone)
    }
}
