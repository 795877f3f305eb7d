use crate::types::{SourceIndex, ZoneId};

/// Zone code meaning "all zones" in requests and "not zone specific" in replies
pub const BROADCAST_ZONE: ZoneId = 0xFF;

/// Highest zone number with a wire encoding
pub const MAX_ZONE: ZoneId = 95;

/// Number of selectable inputs
pub const SOURCE_COUNT: u8 = 8;

/// Device flag bit that must not affect zone identity
const ZONE_FLAG_BIT: u8 = 0x20;

/// Wire source index -> logical source index
const DECODE_SOURCE: [u8; 8] = [4, 5, 6, 3, 7, 0, 1, 2];

/// Logical source index -> wire source index
const ENCODE_SOURCE: [u8; 8] = [5, 6, 7, 3, 0, 1, 2, 4];

/// Encode a logical zone into its wire byte
///
/// Zones 0..=31 map directly, 32..=63 to `0x80 + (z - 32)`, 64..=95 to
/// `0xC0 + (z - 64)`. The broadcast zone passes through. Anything else has no
/// encoding.
pub fn encode_zone(zone: ZoneId) -> Option<u8> {
    match zone {
        BROADCAST_ZONE => Some(BROADCAST_ZONE),
        0..=31 => Some(zone),
        32..=63 => Some(0x80 + (zone - 32)),
        64..=MAX_ZONE => Some(0xC0 + (zone - 64)),
        _ => None,
    }
}

/// Decode a wire byte into a logical zone
///
/// Returns `None` for bytes in the reserved 0x40 band; callers drop the frame.
pub fn decode_zone(byte: u8) -> Option<ZoneId> {
    if byte == BROADCAST_ZONE {
        return Some(BROADCAST_ZONE);
    }

    let z = byte & !ZONE_FLAG_BIT;
    match z & 0xC0 {
        0x80 => Some(32 + (z & 0x1F)),
        0xC0 => Some(64 + (z & 0x1F)),
        0x40 => None,
        _ => Some(z),
    }
}

/// Encode a logical source index into the device's wire order
///
/// Values outside the table pass through unchanged.
pub fn encode_source(source: SourceIndex) -> u8 {
    ENCODE_SOURCE
        .get(source as usize)
        .copied()
        .unwrap_or(source)
}

/// Decode a wire source index into a logical index
///
/// Values outside the table pass through unchanged.
pub fn decode_source(wire: u8) -> SourceIndex {
    DECODE_SOURCE.get(wire as usize).copied().unwrap_or(wire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 0x01)]
    #[case(31, 0x1F)]
    #[case(32, 0x80)]
    #[case(40, 0x88)]
    #[case(63, 0x9F)]
    #[case(64, 0xC0)]
    #[case(95, 0xDF)]
    #[case(0xFF, 0xFF)]
    fn test_encode_zone(#[case] zone: u8, #[case] wire: u8) {
        assert_eq!(encode_zone(zone), Some(wire));
    }

    #[test]
    fn test_encode_zone_out_of_range() {
        assert_eq!(encode_zone(96), None);
        assert_eq!(encode_zone(200), None);
        assert_eq!(encode_zone(254), None);
    }

    #[test]
    fn test_decode_ignores_flag_bit() {
        assert_eq!(decode_zone(0x21), Some(1));
        assert_eq!(decode_zone(0xA1), Some(33));
        assert_eq!(decode_zone(0xE2), Some(66));
    }

    #[test]
    fn test_decode_rejects_0x40_band() {
        assert_eq!(decode_zone(0x40), None);
        assert_eq!(decode_zone(0x5F), None);
        assert_eq!(decode_zone(0x61), None);
    }

    #[test]
    fn test_source_table() {
        let wire_to_logical = [(0, 4), (1, 5), (2, 6), (3, 3), (4, 7), (5, 0), (6, 1), (7, 2)];
        for (wire, logical) in wire_to_logical {
            assert_eq!(decode_source(wire), logical);
            assert_eq!(encode_source(logical), wire);
        }
    }

    #[test]
    fn test_source_passthrough_outside_table() {
        assert_eq!(decode_source(9), 9);
        assert_eq!(encode_source(12), 12);
    }

    #[test]
    fn test_every_zone_round_trips() {
        for zone in (0..=MAX_ZONE).chain(std::iter::once(BROADCAST_ZONE)) {
            let wire = encode_zone(zone).expect("zone should encode");
            assert_eq!(decode_zone(wire), Some(zone), "zone {zone}");
        }
    }

    proptest! {
        #[test]
        fn prop_source_round_trip(source in 0u8..SOURCE_COUNT) {
            prop_assert_eq!(decode_source(encode_source(source)), source);
        }

        #[test]
        fn prop_decoded_zone_is_encodable(byte in any::<u8>()) {
            if let Some(zone) = decode_zone(byte) {
                prop_assert!(encode_zone(zone).is_some());
            }
        }
    }
}
