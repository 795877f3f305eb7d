//! Print zone state as the amplifier reports it
//!
//! Usage: `cargo run --example monitor -- <host> [zone ...]`
//!
//! Set `RUST_LOG=axium_amp=debug` to see every line on the wire.

use axium_amp::{AxiumClient, AxiumConfig, AxiumError, StateSnapshot, StateUpdate};
use tracing_subscriber::EnvFilter;

fn print_snapshot(snapshot: &StateSnapshot) {
    for zone in snapshot.zones.values() {
        let power = zone.power.map_or("?".to_string(), |p| p.to_string());
        let volume = zone
            .volume_level()
            .map_or("?".to_string(), |v| format!("{:.0}%", v * 100.0));
        let source = zone
            .source
            .map_or("?".to_string(), |s| zone.source_label(s));
        let group = zone.group.map_or("-".to_string(), |g| g.to_string());
        println!(
            "  Z{:<2} {:<16} power={:<3} volume={:<4} source={:<12} group={}",
            zone.zone,
            zone.display_name(),
            power,
            volume,
            source,
            group
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().ok_or("usage: monitor <host> [zone ...]")?;
    let zones: Vec<u8> = args.map(|z| z.parse()).collect::<Result<_, _>>()?;

    let mut config = AxiumConfig::new(host);
    if !zones.is_empty() {
        config = config.with_zones(zones);
    }

    let client = AxiumClient::connect(config).await?;
    println!("Startup finished ({:?})", client.phase());
    print_snapshot(&client.snapshot());

    let mut updates = client.subscribe_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update {
                Ok(StateUpdate::Snapshot(snapshot)) => {
                    println!("State changed:");
                    print_snapshot(&snapshot);
                }
                Ok(StateUpdate::StreamConnected) => println!("Event stream connected"),
                Ok(StateUpdate::StreamLost { retry_in }) => {
                    println!("Event stream lost, retrying in {:?}", retry_in)
                }
                Err(AxiumError::ChannelError(e)) => eprintln!("Missed updates: {}", e),
                Err(e) => {
                    eprintln!("Subscription error: {}", e);
                    break;
                }
            },
        }
    }

    client.shutdown().await;
    Ok(())
}
