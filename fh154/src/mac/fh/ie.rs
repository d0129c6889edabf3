//! Broadcast and unicast timing information element contents.
//!
//! Only the timing fields are handled here, the surrounding header IE
//! descriptor is written by the frame builder.
//!
//! - BT-IE: broadcast slot number (2 octets) followed by the broadcast
//!   interval offset (4 octets), a fraction of the broadcast interval
//!   scaled to 2^32.
//! - UT-IE: frame type (1 octet) followed by the unicast fractional
//!   sequence interval (3 octets), the position in the unicast channel
//!   sequence in 1/256 of a dwell.

use fh154_driver::{
    constants::FH_USCH_NUM_SLOTS,
    time::{Tick, Uptime},
};

pub const BT_IE_LEN: usize = 6;
pub const UT_IE_LEN: usize = 4;

const UFSI_MASK: u32 = 0x00ff_ffff;

/// Broadcast schedule position.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct BroadcastTiming {
    pub slot: u16,
    /// Ticks since the start of the broadcast interval.
    pub bfio: Tick,
}

/// Encodes the BT-IE content. `timing.bfio` must lie inside the interval.
pub fn encode_bt_ie(timing: BroadcastTiming, interval: Tick) -> [u8; BT_IE_LEN] {
    debug_assert!(timing.bfio < interval);
    let fraction = ((timing.bfio as u64) << 32) / interval as u64;

    let mut buffer = [0; BT_IE_LEN];
    buffer[..2].copy_from_slice(&timing.slot.to_le_bytes());
    buffer[2..].copy_from_slice(&(fraction as u32).to_le_bytes());
    buffer
}

/// Decodes the BT-IE content, rounding the offset to the nearest tick.
pub fn decode_bt_ie(buffer: &[u8], interval: Tick) -> Option<BroadcastTiming> {
    if buffer.len() != BT_IE_LEN {
        return None;
    }

    let slot = u16::from_le_bytes([buffer[0], buffer[1]]);
    let fraction = u32::from_le_bytes([buffer[2], buffer[3], buffer[4], buffer[5]]);
    let bfio = ((fraction as u64 * interval as u64 + (1 << 31)) >> 32) as Tick;

    // rounding up the last fraction reaches the next slot
    Some(if bfio >= interval {
        BroadcastTiming {
            slot: slot.wrapping_add(1),
            bfio: bfio - interval,
        }
    } else {
        BroadcastTiming { slot, bfio }
    })
}

/// Encodes the UT-IE content from the position (in ticks) in the unicast
/// channel sequence.
pub fn encode_ut_ie(frame_type: u8, position: Uptime, dwell: Tick) -> [u8; UT_IE_LEN] {
    let dwell = dwell as u64;
    let ufsi = (((position << 8) + (dwell >> 1)) / dwell) as u32 & UFSI_MASK;

    let bytes = ufsi.to_le_bytes();
    [frame_type, bytes[0], bytes[1], bytes[2]]
}

/// Decodes the UT-IE content into the frame type and the raw UFSI.
pub fn decode_ut_ie(buffer: &[u8]) -> Option<(u8, u32)> {
    if buffer.len() != UT_IE_LEN {
        return None;
    }
    let ufsi = u32::from_le_bytes([buffer[1], buffer[2], buffer[3], 0]);
    Some((buffer[0] & 0x0f, ufsi))
}

/// Position, in ticks, in the unicast channel sequence described by a raw
/// UFSI.
pub fn ufsi_position(ufsi: u32, dwell: Tick) -> Uptime {
    ((ufsi as u64 & UFSI_MASK as u64) * dwell as u64 + (1 << 7)) >> 8
}

/// Length of a complete unicast channel sequence, in ticks.
pub fn unicast_sequence_len(dwell: Tick) -> Uptime {
    FH_USCH_NUM_SLOTS as u64 * dwell as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Tick = 51_000;

    #[test]
    fn bt_ie_layout() {
        let timing = BroadcastTiming {
            slot: 0x1234,
            bfio: INTERVAL / 2,
        };
        assert_eq!(
            encode_bt_ie(timing, INTERVAL),
            [0x34, 0x12, 0x00, 0x00, 0x00, 0x80]
        );
        assert_eq!(decode_bt_ie(&[0x34, 0x12, 0, 0, 0, 0x80], INTERVAL), Some(timing));
        assert_eq!(decode_bt_ie(&[0x34, 0x12, 0, 0, 0x80], INTERVAL), None);
    }

    #[test]
    fn bt_ie_round_trip_within_one_tick() {
        for bfio in [0, 1, 12_749, 12_750, 33_333, INTERVAL - 1] {
            let timing = BroadcastTiming { slot: 7, bfio };
            let decoded = decode_bt_ie(&encode_bt_ie(timing, INTERVAL), INTERVAL).unwrap();
            assert_eq!(decoded.slot, 7);
            assert!(decoded.bfio.abs_diff(bfio) <= 1, "{bfio} -> {}", decoded.bfio);
        }
    }

    #[test]
    fn bt_ie_rounding_wraps_into_next_slot() {
        let decoded = decode_bt_ie(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff], 1000).unwrap();
        assert_eq!(decoded, BroadcastTiming { slot: 0, bfio: 0 });
    }

    #[test]
    fn ut_ie() {
        let dwell = 12_750;
        // slot 3, half a dwell into it
        let position = 3 * dwell as u64 + dwell as u64 / 2;
        let buffer = encode_ut_ie(2, position, dwell);
        assert_eq!(buffer, [2, 0x80, 0x03, 0x00]);

        let (frame_type, ufsi) = decode_ut_ie(&buffer).unwrap();
        assert_eq!(frame_type, 2);
        assert_eq!(ufsi, 0x0380);
        assert_eq!(ufsi_position(ufsi, dwell), position);
        assert_eq!(decode_ut_ie(&buffer[..3]), None);
    }
}
