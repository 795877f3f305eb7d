use crate::addressing::BROADCAST_ZONE;
use crate::error::Result;
use crate::protocol::{encode_batch, Command, Opcode};
use crate::types::ZoneId;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::time::Duration;

/// Content type the amplifier expects on every request
pub const CONTENT_TYPE_AXIUM: &str = "application/x-axium";

const CONTROL_PATH: &str = "/axium.cgi";
const STREAM_PATH: &str = "/axiumlong.cgi";

/// Number of preset-name slots swept by the web-app init burst
const PRESET_SLOTS: u8 = 14;

/// HTTP client for the amplifier's control and event-stream endpoints
///
/// Request/response calls are bounded by timeouts; the long-poll stream is
/// not, since it blocks until the amplifier has something to say.
#[derive(Clone)]
pub struct Connection {
    client: Client,
    control_url: String,
    stream_url: String,
    request_timeout: Duration,
    batch_timeout: Duration,
}

impl Connection {
    /// Create a client for `host` (`host` or `host:port`)
    pub fn new(host: &str, request_timeout: Duration, batch_timeout: Duration) -> Result<Self> {
        let client = Client::builder().build()?;
        let base = format!("http://{}", host.trim_end_matches('/'));

        Ok(Self {
            client,
            control_url: format!("{}{}", base, CONTROL_PATH),
            stream_url: format!("{}{}", base, STREAM_PATH),
            request_timeout,
            batch_timeout,
        })
    }

    async fn post(&self, body: String, timeout: Duration) -> Result<String> {
        tracing::debug!("TX: {:?}", body);

        let response = self
            .client
            .post(&self.control_url)
            .header(CONTENT_TYPE, CONTENT_TYPE_AXIUM)
            .timeout(timeout)
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        let text = response.text().await?;
        Ok(text.replace('\r', ""))
    }

    /// POST an empty body; many firmwares answer with a state dump
    pub async fn initial_probe(&self) -> Result<String> {
        self.post(String::new(), self.request_timeout).await
    }

    /// Send one command line
    pub async fn send(&self, command: &Command) -> Result<String> {
        let body = encode_batch(std::slice::from_ref(command))?;
        self.post(body, self.request_timeout).await
    }

    /// Send several command lines in one request
    pub async fn send_batch(&self, commands: &[Command]) -> Result<String> {
        let body = encode_batch(commands)?;
        self.post(body, self.batch_timeout).await
    }

    /// Ask for zone-name frames; `None` or the broadcast zone asks every zone
    pub async fn request_zone_names(&self, zone: Option<ZoneId>) -> Result<String> {
        let target = zone.filter(|z| *z != BROADCAST_ZONE);
        self.send(&Command::request_zone_names(target)).await
    }

    /// Replay the vendor web UI's startup burst
    ///
    /// Some firmware only sweeps zone and preset names in reply to exactly
    /// this sequence.
    pub async fn webapp_init_burst(&self) -> Result<String> {
        self.send_batch(&webapp_init_commands()).await
    }

    /// Query everything the amplifier knows about one zone
    pub async fn snapshot_burst(&self, zone: ZoneId, include_names: bool) -> Result<String> {
        self.send_batch(&snapshot_commands(zone, include_names)).await
    }

    /// Open the event stream
    ///
    /// The returned response must be read incrementally; dropping it
    /// releases the connection.
    pub async fn open_long_poll(&self) -> Result<Response> {
        tracing::debug!("Opening long-poll stream {}", self.stream_url);

        let response = self
            .client
            .get(&self.stream_url)
            .header(CONTENT_TYPE, CONTENT_TYPE_AXIUM)
            .send()
            .await?
            .error_for_status()?;

        Ok(response)
    }
}

fn webapp_init_commands() -> Vec<Command> {
    let mut commands = vec![
        Command::new(Opcode::Settings, BROADCAST_ZONE).with_data(0x06),
        Command::new(Opcode::GroupLink, BROADCAST_ZONE).with_data(0x20),
    ];
    commands.extend(
        (1..=PRESET_SLOTS).map(|preset| Command::new(Opcode::IndexSweep, BROADCAST_ZONE).with_data(preset + 1)),
    );
    commands.push(Command::new(Opcode::Keepalive, BROADCAST_ZONE));
    commands
}

fn snapshot_commands(zone: ZoneId, include_names: bool) -> Vec<Command> {
    let mut commands = Vec::with_capacity(9);
    if include_names {
        commands.push(Command::request_zone_names(None));
    }
    commands.extend(
        [
            Opcode::GroupLink,
            Opcode::Power,
            Opcode::Mute,
            Opcode::Source,
            Opcode::Volume,
            Opcode::SourceName,
            Opcode::ModelFlags,
            Opcode::MaxVolume,
        ]
        .into_iter()
        .map(|opcode| Command::new(opcode, zone)),
    );
    commands
}
