//! Rust library for controlling Axium multi-zone amplifiers
//!
//! This library provides an async API for the amplifier's ASCII-hex line
//! protocol over HTTP. It supports:
//!
//! - Startup sequencing (probe, web-app init burst, per-zone snapshot)
//! - A long-poll event stream with exponential reconnect backoff
//! - Power, volume and source control per zone
//! - Zone and source names reported by the amplifier
//! - Linked groups (source, volume and power follow their peers)
//! - Real-time state update subscriptions
//!
//! # Quick Start
//!
//! ```no_run
//! use axium_amp::{AxiumClient, AxiumConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AxiumConfig::new("192.168.1.50").with_zones([1, 2]);
//!     let client = AxiumClient::connect(config).await?;
//!
//!     if let Some(zone) = client.zone(1) {
//!         zone.turn_on().await?;
//!         zone.set_volume_level(0.25).await?;
//!         zone.select_source_by_name("S3").await?;
//!     }
//!
//!     // Subscribe to state updates
//!     let mut updates = client.subscribe_state();
//!     while let Ok(update) = updates.recv().await {
//!         println!("State update: {:?}", update);
//!         break; // Just show one update
//!     }
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Client**: Session ownership and zone access
//! - **Zone**: High-level control API for one zone
//! - **Session**: Startup phases, long-poll loop and name retry
//! - **Connection**: HTTP transport for the control and stream endpoints
//! - **State**: Reducer applying decoded frames, with group propagation
//! - **Protocol**: Line codec and opcodes
//! - **Addressing**: Zone and source wire mappings

pub mod addressing;
mod client;
mod config;
mod connection;
mod error;
pub mod protocol;
mod session;
mod state;
mod subscription;
mod types;
mod zone;

// Public exports
pub use addressing::{decode_source, decode_zone, encode_source, encode_zone, BROADCAST_ZONE, MAX_ZONE, SOURCE_COUNT};
pub use client::AxiumClient;
pub use config::AxiumConfig;
pub use connection::{Connection, CONTENT_TYPE_AXIUM};
pub use error::{AxiumError, Result};
pub use protocol::{decode_line, encode_batch, Command, Event, Frame, LineSplitter, Opcode};
pub use session::{Backoff, SessionPhase};
pub use state::AmpState;
pub use subscription::{StateReceiver, StateUpdate};
pub use types::{
    GroupId, GroupOptions, Power, SourceIndex, StateSnapshot, ZoneId, ZoneSnapshot,
    DEFAULT_MAX_VOLUME,
};
pub use zone::Zone;
