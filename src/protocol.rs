use crate::addressing::{decode_source, decode_zone, encode_source, encode_zone, BROADCAST_ZONE, SOURCE_COUNT};
use crate::error::{AxiumError, Result};
use crate::types::{GroupOptions, Power, SourceIndex, ZoneId};
use std::fmt::Write as _;

/// Byte offset of the name inside a source-name payload
const SOURCE_NAME_OFFSET: usize = 4;

/// Protocol operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Power,
    Mute,
    Source,
    Volume,
    MaxVolume,
    Settings,
    ZoneNameRequest,
    ZoneName,
    SourceName,
    PresetName,
    IndexSweep,
    GroupLink,
    Keepalive,
    ModelFlags,
    Other(u8),
}

impl Opcode {
    pub fn code(self) -> u8 {
        match self {
            Opcode::Power => 0x01,
            Opcode::Mute => 0x02,
            Opcode::Source => 0x03,
            Opcode::Volume => 0x04,
            Opcode::MaxVolume => 0x0D,
            Opcode::Settings => 0x14,
            Opcode::ZoneNameRequest => 0x1B,
            Opcode::ZoneName => 0x1C,
            Opcode::SourceName => 0x29,
            Opcode::PresetName => 0x2A,
            Opcode::IndexSweep => 0x2B,
            Opcode::GroupLink => 0x30,
            Opcode::Keepalive => 0x38,
            Opcode::ModelFlags => 0x3C,
            Opcode::Other(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Opcode::Power,
            0x02 => Opcode::Mute,
            0x03 => Opcode::Source,
            0x04 => Opcode::Volume,
            0x0D => Opcode::MaxVolume,
            0x14 => Opcode::Settings,
            0x1B => Opcode::ZoneNameRequest,
            0x1C => Opcode::ZoneName,
            0x29 => Opcode::SourceName,
            0x2A => Opcode::PresetName,
            0x2B => Opcode::IndexSweep,
            0x30 => Opcode::GroupLink,
            0x38 => Opcode::Keepalive,
            0x3C => Opcode::ModelFlags,
            other => Opcode::Other(other),
        }
    }
}

/// Outgoing command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub opcode: Opcode,
    pub zone: ZoneId,
    pub data: Vec<u8>,
}

impl Command {
    /// Create a command with no data bytes (a query on most opcodes)
    pub fn new(opcode: Opcode, zone: ZoneId) -> Self {
        Self {
            opcode,
            zone,
            data: Vec::new(),
        }
    }

    /// Append a data byte
    pub fn with_data(mut self, byte: u8) -> Self {
        self.data.push(byte);
        self
    }

    pub fn set_power(zone: ZoneId, on: bool) -> Self {
        Self::new(Opcode::Power, zone).with_data(u8::from(on))
    }

    pub fn set_volume(zone: ZoneId, volume: u8) -> Self {
        Self::new(Opcode::Volume, zone).with_data(volume)
    }

    /// Select a logical source; indices past the eighth input are rejected
    pub fn select_source(zone: ZoneId, source: SourceIndex) -> Result<Self> {
        if source >= SOURCE_COUNT {
            return Err(AxiumError::InvalidSource(source));
        }
        Ok(Self::new(Opcode::Source, zone).with_data(encode_source(source)))
    }

    /// Ask for zone names; `None` broadcasts to every zone
    pub fn request_zone_names(zone: Option<ZoneId>) -> Self {
        Self::new(Opcode::ZoneNameRequest, zone.unwrap_or(BROADCAST_ZONE))
    }

    /// Render the line without its terminator
    pub fn encode(&self) -> Result<String> {
        let zone = encode_zone(self.zone).ok_or(AxiumError::InvalidZone(self.zone))?;
        let mut line = String::with_capacity(4 + self.data.len() * 2);
        let _ = write!(line, "{:02X}{:02X}", self.opcode.code(), zone);
        for byte in &self.data {
            let _ = write!(line, "{:02X}", byte);
        }
        Ok(line)
    }
}

/// Join command lines into one request body, each terminated by CR LF
pub fn encode_batch(commands: &[Command]) -> Result<String> {
    let mut body = String::new();
    for command in commands {
        body.push_str(&command.encode()?);
        body.push_str("\r\n");
    }
    Ok(body)
}

/// One decoded line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    /// Decoded zone field; `None` when the byte is not a valid zone
    pub zone: Option<ZoneId>,
    pub event: Event,
}

/// State assertion carried by a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Power {
        zone: ZoneId,
        power: Power,
    },
    Source {
        zone: ZoneId,
        source: SourceIndex,
        /// High bit of the source byte: the zone is on
        powered_on: bool,
    },
    Volume {
        zone: ZoneId,
        volume: u8,
    },
    MaxVolume {
        zone: ZoneId,
        max_volume: u8,
    },
    ZoneName {
        zone: ZoneId,
        name: String,
    },
    /// `zone: None` applies the name to every configured zone
    SourceName {
        zone: Option<ZoneId>,
        source: SourceIndex,
        name: String,
    },
    PresetName {
        preset: u8,
        name: String,
    },
    GroupLink {
        options: GroupOptions,
        zones: Vec<ZoneId>,
    },
    /// Recognised but carries no state, unknown opcode, or malformed payload
    Noop,
}

/// Decode one raw line
///
/// Returns `None` for lines shorter than the four character header or with
/// non-hex characters. Malformed payloads of known opcodes decode to
/// [`Event::Noop`] so one bad frame never stops the lines after it.
pub fn decode_line(line: &str) -> Option<Frame> {
    let line = line.trim().to_ascii_uppercase();
    if line.len() < 4 || !line.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let opcode = Opcode::from_code(u8::from_str_radix(&line[..2], 16).ok()?);
    let zone = u8::from_str_radix(&line[2..4], 16).ok().and_then(decode_zone);
    let data = &line[4..];

    let event = decode_event(opcode, zone, data).unwrap_or(Event::Noop);
    Some(Frame {
        opcode,
        zone,
        event,
    })
}

fn decode_event(opcode: Opcode, zone: Option<ZoneId>, data: &str) -> Option<Event> {
    // per-zone opcodes need a concrete zone
    let target = zone.filter(|z| *z != BROADCAST_ZONE);

    match opcode {
        Opcode::Power => {
            let power = match single_byte(data)? {
                0x01 | 0x07 => Power::On,
                0x00 | 0x06 => Power::Off,
                _ => return None,
            };
            Some(Event::Power {
                zone: target?,
                power,
            })
        }
        Opcode::Source => {
            let raw = single_byte(data)?;
            Some(Event::Source {
                zone: target?,
                source: decode_source(raw & 0x1F),
                powered_on: raw & 0x80 != 0,
            })
        }
        Opcode::Volume => Some(Event::Volume {
            zone: target?,
            volume: single_byte(data)?,
        }),
        Opcode::MaxVolume => Some(Event::MaxVolume {
            zone: target?,
            max_volume: single_byte(data)?,
        }),
        Opcode::ZoneName => {
            let name = decode_zone_name(&hex_bytes(data)?)?;
            Some(Event::ZoneName {
                zone: target?,
                name,
            })
        }
        Opcode::SourceName => {
            let source = decode_source(first_byte(data)?);
            let name_hex = data.get(SOURCE_NAME_OFFSET * 2..).unwrap_or("");
            let name = decode_lenient(&hex_bytes(name_hex)?)?;
            Some(Event::SourceName {
                zone: target,
                source,
                name,
            })
        }
        Opcode::PresetName => {
            let preset = first_byte(data)?.checked_sub(1)?;
            let name = decode_lenient(&hex_bytes(data.get(2..).unwrap_or(""))?)?;
            Some(Event::PresetName { preset, name })
        }
        Opcode::GroupLink => {
            let options = GroupOptions(first_byte(data)?);
            let zones = data
                .get(options.preamble_len() * 2..)
                .unwrap_or("")
                .as_bytes()
                .chunks(2)
                .take_while(|pair| pair.len() == 2)
                .filter_map(|pair| std::str::from_utf8(pair).ok())
                .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
                .filter_map(decode_zone)
                .filter(|z| *z != BROADCAST_ZONE)
                .collect();
            Some(Event::GroupLink { options, zones })
        }
        _ => None,
    }
}

fn first_byte(data: &str) -> Option<u8> {
    u8::from_str_radix(data.get(..2)?, 16).ok()
}

/// Leading byte of a fixed-width payload; a dangling hex digit is malformed
fn single_byte(data: &str) -> Option<u8> {
    if data.len() % 2 != 0 {
        return None;
    }
    first_byte(data)
}

/// Decode hex pairs, dropping an odd trailing digit
fn hex_bytes(hex: &str) -> Option<Vec<u8>> {
    let even = &hex[..hex.len() - hex.len() % 2];
    even.as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
        })
        .collect()
}

/// Null-terminated name, UTF-8 with a Latin-1 fallback
fn decode_zone_name(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let prefix = &bytes[..end];
    let name = match std::str::from_utf8(prefix) {
        Ok(s) => s.to_string(),
        Err(_) => prefix.iter().map(|&b| char::from(b)).collect(),
    };
    non_empty(name.trim())
}

/// Name bytes with invalid sequences dropped
fn decode_lenient(bytes: &[u8]) -> Option<String> {
    let text: String = String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect();
    non_empty(text.trim_matches(|c: char| c == '\0' || c.is_whitespace()))
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Non-empty lines of a response body; CR and LF both end a line
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

/// Reassembles lines from stream chunks that may end mid-line
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n' || b == b'\r') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Take whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        non_empty(String::from_utf8_lossy(&raw).trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn event(line: &str) -> Event {
        decode_line(line).expect("line should decode").event
    }

    #[rstest]
    #[case(Command::set_power(1, true), "010101")]
    #[case(Command::set_power(33, false), "018100")]
    #[case(Command::set_volume(2, 0xA0), "0402A0")]
    #[case(Command::request_zone_names(None), "1BFF")]
    #[case(Command::request_zone_names(Some(64)), "1BC0")]
    #[case(Command::new(Opcode::Settings, BROADCAST_ZONE).with_data(0x06), "14FF06")]
    #[case(Command::new(Opcode::IndexSweep, BROADCAST_ZONE).with_data(0x0F), "2BFF0F")]
    fn test_encode_command(#[case] command: Command, #[case] expected: &str) {
        assert_eq!(command.encode().unwrap(), expected);
    }

    #[test]
    fn test_select_source_uses_wire_order() {
        let command = Command::select_source(3, 0).unwrap();
        assert_eq!(command.encode().unwrap(), "030305");
    }

    #[test]
    fn test_select_source_rejects_out_of_range() {
        assert!(matches!(
            Command::select_source(1, 8),
            Err(AxiumError::InvalidSource(8))
        ));
    }

    #[test]
    fn test_encode_rejects_unencodable_zone() {
        assert!(matches!(
            Command::set_power(120, true).encode(),
            Err(AxiumError::InvalidZone(120))
        ));
    }

    #[test]
    fn test_encode_batch_terminates_lines() {
        let body = encode_batch(&[Command::new(Opcode::Power, 1), Command::new(Opcode::Volume, 1)]).unwrap();
        assert_eq!(body, "0101\r\n0401\r\n");
    }

    #[rstest]
    #[case("010101", Power::On)]
    #[case("010107", Power::On)]
    #[case("010100", Power::Off)]
    #[case("010106", Power::Off)]
    fn test_decode_power(#[case] line: &str, #[case] power: Power) {
        assert_eq!(event(line), Event::Power { zone: 1, power });
    }

    #[test]
    fn test_decode_power_without_assertion() {
        assert_eq!(event("010103"), Event::Noop);
        assert_eq!(event("0101"), Event::Noop);
        assert_eq!(event("0101010"), Event::Noop);
    }

    #[test]
    fn test_decode_source_with_power_bit() {
        assert_eq!(
            event("030185"),
            Event::Source {
                zone: 1,
                source: 0,
                powered_on: true
            }
        );
        assert_eq!(
            event("030203"),
            Event::Source {
                zone: 2,
                source: 3,
                powered_on: false
            }
        );
    }

    #[test]
    fn test_decode_volume_and_max_volume() {
        assert_eq!(event("04821E"), Event::Volume { zone: 34, volume: 0x1E });
        assert_eq!(event("0D01FF"), Event::MaxVolume { zone: 1, max_volume: 0xFF });
    }

    #[test]
    fn test_decode_is_case_insensitive_and_trims() {
        assert_eq!(event("  04010a \r"), Event::Volume { zone: 1, volume: 10 });
    }

    #[test]
    fn test_decode_rejects_short_and_non_hex() {
        assert!(decode_line("010").is_none());
        assert!(decode_line("").is_none());
        assert!(decode_line("01G101").is_none());
        assert!(decode_line("01 01 01").is_none());
    }

    #[test]
    fn test_unknown_opcode_is_noop() {
        let frame = decode_line("7F0101").unwrap();
        assert_eq!(frame.opcode, Opcode::Other(0x7F));
        assert_eq!(frame.event, Event::Noop);
    }

    #[test]
    fn test_invalid_zone_drops_per_zone_event() {
        let frame = decode_line("044010").unwrap();
        assert_eq!(frame.zone, None);
        assert_eq!(frame.event, Event::Noop);
        assert_eq!(event("04FF10"), Event::Noop);
    }

    #[test]
    fn test_decode_zone_name() {
        assert_eq!(
            event("1C0148656C6C6F00"),
            Event::ZoneName {
                zone: 1,
                name: "Hello".to_string()
            }
        );
    }

    #[test]
    fn test_zone_name_stops_at_null_and_drops_odd_digit() {
        assert_eq!(
            event("1C024B6974006A756E6B4"),
            Event::ZoneName {
                zone: 2,
                name: "Kit".to_string()
            }
        );
    }

    #[test]
    fn test_zone_name_latin1_fallback() {
        // "Caf\xE9" is not valid UTF-8
        assert_eq!(
            event("1C01436166E9"),
            Event::ZoneName {
                zone: 1,
                name: "Café".to_string()
            }
        );
    }

    #[test]
    fn test_blank_zone_name_is_noop() {
        assert_eq!(event("1C01202000"), Event::Noop);
        assert_eq!(event("1C01"), Event::Noop);
    }

    #[test]
    fn test_decode_broadcast_source_name() {
        // wire source 5 -> logical 0, three control bytes, then "TV"
        assert_eq!(
            event("29FF0500000054560000"),
            Event::SourceName {
                zone: None,
                source: 0,
                name: "TV".to_string()
            }
        );
    }

    #[test]
    fn test_decode_zone_source_name() {
        assert_eq!(
            event("290300010203436421"),
            Event::SourceName {
                zone: Some(3),
                source: 4,
                name: "Cd!".to_string()
            }
        );
    }

    #[test]
    fn test_source_name_without_payload_is_noop() {
        assert_eq!(event("29FF05000000"), Event::Noop);
    }

    #[test]
    fn test_decode_preset_name() {
        assert_eq!(
            event("2AFF034A617A7A"),
            Event::PresetName {
                preset: 2,
                name: "Jazz".to_string()
            }
        );
    }

    #[rstest]
    #[case("2BFF02")]
    #[case("38FF")]
    #[case("14FF06")]
    #[case("0201")]
    fn test_stateless_opcodes(#[case] line: &str) {
        assert_eq!(event(line), Event::Noop);
    }

    #[test]
    fn test_decode_group_with_extended_preamble() {
        assert_eq!(
            event("30FFA1000000000102"),
            Event::GroupLink {
                options: GroupOptions(0xA1),
                zones: vec![1, 2]
            }
        );
    }

    #[test]
    fn test_decode_group_short_preamble_and_trailing_digit() {
        assert_eq!(
            event("30FF06018203C"),
            Event::GroupLink {
                options: GroupOptions(0x06),
                zones: vec![1, 34, 3]
            }
        );
    }

    #[test]
    fn test_decode_group_skips_invalid_zones() {
        assert_eq!(
            event("30FF0101400205"),
            Event::GroupLink {
                options: GroupOptions(0x01),
                zones: vec![1, 2, 5]
            }
        );
    }

    #[test]
    fn test_split_lines_normalises_endings() {
        let lines: Vec<_> = split_lines("010101\r\n\r\n04011E\n0D01A0\r").collect();
        assert_eq!(lines, vec!["010101", "04011E", "0D01A0"]);
    }

    #[test]
    fn test_line_splitter_carries_partial_lines() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.push(b"0101"), Vec::<String>::new());
        assert_eq!(splitter.push(b"01\r\n0401"), vec!["010101".to_string()]);
        assert_eq!(splitter.push(b"1E\r"), vec!["04011E".to_string()]);
        assert_eq!(splitter.push(b"\n0D01"), Vec::<String>::new());
        assert_eq!(splitter.finish(), Some("0D01".to_string()));
        assert_eq!(splitter.finish(), None);
    }
}
