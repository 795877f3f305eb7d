use crate::addressing::encode_zone;
use crate::error::{AxiumError, Result};
use crate::types::ZoneId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_ZONES: [ZoneId; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

/// Settings for one amplifier session
///
/// Every field except `host` has a default, so a JSON document only needs
/// the address:
///
/// ```
/// use axium_amp::AxiumConfig;
///
/// let config = AxiumConfig::from_json(r#"{ "host": "192.168.1.50", "zones": [1, 2] }"#).unwrap();
/// assert_eq!(config.zones, vec![1, 2]);
/// assert_eq!(config.request_timeout.as_secs(), 15);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxiumConfig {
    /// Host or `host:port` of the amplifier's web interface
    pub host: String,

    /// Zones to track and snapshot at startup
    #[serde(default = "default_zones")]
    pub zones: Vec<ZoneId>,

    /// Kept for compatibility with older setups; updates are event driven
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    #[serde(default = "default_request_timeout", with = "duration_ms")]
    pub request_timeout: Duration,

    #[serde(default = "default_batch_timeout", with = "duration_ms")]
    pub batch_timeout: Duration,

    /// Delay before re-requesting names that are still missing
    #[serde(default = "default_name_retry_delay", with = "duration_ms")]
    pub name_retry_delay: Duration,

    #[serde(default = "default_backoff_initial", with = "duration_ms")]
    pub backoff_initial: Duration,

    #[serde(default = "default_backoff_max", with = "duration_ms")]
    pub backoff_max: Duration,
}

fn default_zones() -> Vec<ZoneId> {
    DEFAULT_ZONES.to_vec()
}

fn default_scan_interval() -> u64 {
    3
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_batch_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_name_retry_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_backoff_initial() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(30)
}

impl AxiumConfig {
    /// Create a configuration for `host` with default zones and timings
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            zones: default_zones(),
            scan_interval_secs: default_scan_interval(),
            request_timeout: default_request_timeout(),
            batch_timeout: default_batch_timeout(),
            name_retry_delay: default_name_retry_delay(),
            backoff_initial: default_backoff_initial(),
            backoff_max: default_backoff_max(),
        }
    }

    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_zones(mut self, zones: impl IntoIterator<Item = ZoneId>) -> Self {
        self.zones = zones.into_iter().collect();
        self
    }

    pub fn with_timeouts(mut self, request: Duration, batch: Duration) -> Self {
        self.request_timeout = request;
        self.batch_timeout = batch;
        self
    }

    pub fn with_name_retry_delay(mut self, delay: Duration) -> Self {
        self.name_retry_delay = delay;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff_initial = initial;
        self.backoff_max = max;
        self
    }

    /// Check the configuration before any network traffic
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AxiumError::InvalidConfig("host is empty".to_string()));
        }
        if self.zones.is_empty() {
            return Err(AxiumError::InvalidConfig("no zones configured".to_string()));
        }
        if let Some(zone) = self.zones.iter().find(|z| encode_zone(**z).is_none()) {
            return Err(AxiumError::InvalidZone(*zone));
        }
        if self.backoff_initial.is_zero() || self.backoff_max < self.backoff_initial {
            return Err(AxiumError::InvalidConfig(
                "backoff must start above zero and not exceed its cap".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
