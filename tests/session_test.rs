use axium_amp::{
    AxiumClient, AxiumConfig, AxiumError, Command, Power, SessionPhase, StateSnapshot, StateUpdate,
};
use mockito::{Matcher, Server, ServerGuard};
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn config(host: &str, zones: &[u8]) -> AxiumConfig {
    AxiumConfig::new(host)
        .with_zones(zones.iter().copied())
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(2))
        .with_name_retry_delay(Duration::from_millis(50))
        .with_backoff(Duration::from_millis(20), Duration::from_millis(40))
}

async fn wait_for(client: &AxiumClient, condition: impl Fn(&StateSnapshot) -> bool) -> StateSnapshot {
    timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = client.snapshot();
            if condition(&snapshot) {
                return snapshot;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("state never reached the expected condition")
}

async fn wait_for_phase(client: &AxiumClient, phase: SessionPhase) {
    let mut rx = client.subscribe_phase();
    timeout(Duration::from_secs(5), rx.wait_for(|p| *p == phase))
        .await
        .expect("phase never reached")
        .expect("phase channel closed");
}

/// An amplifier answering the startup sequence for zones 1 and 2
async fn amplifier() -> ServerGuard {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/axium.cgi")
        .match_body(Matcher::Exact(String::new()))
        .with_body("0D01A0\r\n")
        .create_async()
        .await;
    server
        .mock("POST", "/axium.cgi")
        .match_body(Matcher::Regex("^14FF06".to_string()))
        .with_body("1C014B69746368656E00\r\n")
        .create_async()
        .await;
    server
        .mock("POST", "/axium.cgi")
        .match_body(Matcher::Regex("^1BFF\r\n3001".to_string()))
        .with_body("010101\r\n030105\r\n04013C\r\n29FF0500000054560000\r\n")
        .create_async()
        .await;
    server
        .mock("POST", "/axium.cgi")
        .match_body(Matcher::Regex("^3002".to_string()))
        .with_body("010200\r\n040210\r\n")
        .create_async()
        .await;

    server
}

#[tokio::test]
async fn test_startup_populates_state() {
    let mut server = amplifier().await;
    server
        .mock("POST", "/axium.cgi")
        .match_body(Matcher::Regex("^1B02\r\n$".to_string()))
        .with_body("1C024F666669636500\r\n")
        .create_async()
        .await;

    let client = AxiumClient::connect(config(&server.host_with_port(), &[1, 2]))
        .await
        .unwrap();

    // startup responses are applied before connect returns
    let kitchen = client.zone(1).unwrap();
    assert_eq!(kitchen.name().as_deref(), Some("Kitchen"));
    assert_eq!(kitchen.power(), Some(Power::On));
    assert_eq!(kitchen.volume(), Some(0x3C));
    assert_eq!(kitchen.source_label().as_deref(), Some("TV"));

    let office = client.zone(2).unwrap();
    assert_eq!(office.power(), Some(Power::Off));
    assert_eq!(office.source_list()[0], "TV");

    // zone 2 had no name after startup; the retry fills it in
    let snapshot = wait_for(&client, |s| {
        s.zone(2).and_then(|z| z.name.as_deref()) == Some("Office")
    })
    .await;
    assert_eq!(snapshot.zones.len(), 2);

    assert!(client.zone(3).is_none());
    client.shutdown().await;
    assert_eq!(client.phase(), SessionPhase::Stopped);
}

#[tokio::test]
async fn test_stream_events_propagate_through_groups() {
    let mut server = amplifier().await;
    // all-linked group of zones 1 and 2, then a source change on zone 1
    server
        .mock("GET", "/axiumlong.cgi")
        .with_body("30FF070102\r\n030107\r\n04014")
        .create_async()
        .await;

    let client = AxiumClient::connect(config(&server.host_with_port(), &[1, 2]))
        .await
        .unwrap();

    let snapshot = wait_for(&client, |s| {
        s.zone(2).and_then(|z| z.source) == Some(2)
    })
    .await;
    let (one, two) = (snapshot.zone(1).unwrap(), snapshot.zone(2).unwrap());
    assert_eq!(one.source, Some(2));
    assert!(one.group.is_some());
    assert_eq!(one.group, two.group);
    // the truncated trailing line is dropped
    assert_eq!(one.volume, Some(0x3C));

    client.shutdown().await;
}

#[tokio::test]
async fn test_stream_reconnects_with_notifications() {
    let mut server = amplifier().await;
    server
        .mock("GET", "/axiumlong.cgi")
        .with_body("040140\r\n")
        .expect_at_least(2)
        .create_async()
        .await;

    let client = AxiumClient::connect(config(&server.host_with_port(), &[1, 2]))
        .await
        .unwrap();
    let mut updates = client.subscribe_state();

    let mut connected = false;
    let mut lost = None;
    timeout(Duration::from_secs(5), async {
        while !(connected && lost.is_some()) {
            match updates.recv().await {
                Ok(StateUpdate::StreamConnected) => connected = true,
                Ok(StateUpdate::StreamLost { retry_in }) => lost = Some(retry_in),
                Ok(StateUpdate::Snapshot(_)) | Err(AxiumError::ChannelError(_)) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
    })
    .await
    .expect("no reconnect cycle observed");

    let retry_in = lost.unwrap();
    assert!(retry_in >= Duration::from_millis(20) && retry_in <= Duration::from_millis(40));
    wait_for(&client, |s| s.zone(1).and_then(|z| z.volume) == Some(0x40)).await;

    client.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_amplifier_still_connects() {
    let client = AxiumClient::connect(config("127.0.0.1:1", &[1, 2, 3]))
        .await
        .unwrap();

    let snapshot = client.snapshot();
    assert_eq!(snapshot.zones.len(), 3);
    assert!(snapshot.zones.values().all(|z| z.power.is_none() && z.name.is_none()));
    assert_eq!(client.zone(3).unwrap().display_name(), "Axium Z3");

    wait_for_phase(&client, SessionPhase::Reconnecting).await;
    client.shutdown().await;
    assert_eq!(client.phase(), SessionPhase::Stopped);
}

#[tokio::test]
async fn test_failed_phases_do_not_stop_later_ones() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/axium.cgi")
        .match_body(Matcher::Exact(String::new()))
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("POST", "/axium.cgi")
        .match_body(Matcher::Regex("^1BFF\r\n3001".to_string()))
        .with_status(500)
        .create_async()
        .await;
    let zone_two = server
        .mock("POST", "/axium.cgi")
        .match_body(Matcher::Regex("^3002".to_string()))
        .with_body("010201\r\n040218\r\n")
        .create_async()
        .await;

    let client = AxiumClient::connect(config(&server.host_with_port(), &[1, 2]))
        .await
        .unwrap();

    zone_two.assert_async().await;
    let office = client.zone(2).unwrap();
    assert_eq!(office.power(), Some(Power::On));
    assert_eq!(office.volume(), Some(0x18));
    assert_eq!(client.zone(1).unwrap().power(), None);

    client.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let result = AxiumClient::connect(config("127.0.0.1:1", &[1, 96])).await;
    assert!(matches!(result, Err(AxiumError::InvalidZone(96))));
}

#[tokio::test]
async fn test_raw_command_response_is_applied() {
    let mut server = amplifier().await;
    let mock = server
        .mock("POST", "/axium.cgi")
        .match_body("040220\r\n")
        .with_body("040220\r\n")
        .create_async()
        .await;

    let client = AxiumClient::connect(config(&server.host_with_port(), &[1, 2]))
        .await
        .unwrap();
    assert_eq!(client.zone(2).unwrap().volume(), Some(0x10));

    client.send(&Command::set_volume(2, 0x20)).await.unwrap();
    mock.assert_async().await;
    assert_eq!(client.zone(2).unwrap().volume(), Some(0x20));

    client.shutdown().await;
}
