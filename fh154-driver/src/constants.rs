#![allow(dead_code)]

use crate::time::{SymbolDuration, Tick};

// Constants of IEEE 802.15.4-2024, section 8.4.2, Table 8-35, MAC constants
/// The number of symbols forming a superframe slot when the superframe order is
/// equal to zero, as described in 6.2.1.
pub const A_BASE_SLOT_DURATION: SymbolDuration = SymbolDuration::from_ticks(60);
/// The number of slots contained in any superframe.
pub const A_NUM_SUPERFRAME_SLOTS: u8 = 16;
/// The number of symbols forming a superframe when the superframe order is
/// equal to zero.
pub const A_BASE_SUPERFRAME_DURATION: SymbolDuration =
    SymbolDuration::from_ticks(A_BASE_SLOT_DURATION.ticks() * A_NUM_SUPERFRAME_SLOTS as u32);

/// Beacon order of a non-beacon-enabled PAN.
pub const MAC_BO_NON_BEACON: u8 = 15;

/// Tick counter rollover period used while no beacon order applies.
pub const MAC_DEFAULT_ROLLOVER: Tick = A_BASE_SUPERFRAME_DURATION.ticks() << MAC_BO_NON_BEACON;

/// Largest deadline, in ticks, the timer queue accepts.
pub const MAC_TIMER_MAX_DEADLINE: Tick = i32::MAX as Tick;

/// Wake-up latency subtracted from the next timeout reported for sleep
/// decisions.
pub const MAC_TIMER_NEXT_TIMEOUT_ADJ: Tick = 1;

// Constants from section 11.3, Table 11-1, PHY constants
/// The maximum PSDU size (in octets) the PHY shall be able to receive.
pub const PHY_MAX_PACKET_SIZE_2047: usize = 2048; // SUN, TVWS, RCC, LECIM FSK, and MSK with a 2000 kb/s data rate
pub const PHY_MAX_PACKET_SIZE_127: usize = 127; // all other PHYs

/// RX-to-TX or TX-to-RX turnaround time (in symbol periods), as defined in
/// 10.2.2 and 10.2.3.
pub const A_TURNAROUND_TIME: SymbolDuration = SymbolDuration::from_ticks(12);
/// The time required to perform CCA detection in symbol periods.
pub const PHY_CCA_DURATION: SymbolDuration = SymbolDuration::from_ticks(8);
/// The number of symbols forming the basic time period used by the CSMA-CA
/// algorithm.
pub const MAC_UNIT_BACKOFF_PERIOD: SymbolDuration =
    SymbolDuration::from_ticks(A_TURNAROUND_TIME.ticks() + PHY_CCA_DURATION.ticks());

/// Broadcast dwell intervals at least this long get a minimum broadcast
/// backoff, see [`FH_BROADCAST_MIN_BACKOFF`].
pub const FH_BROADCAST_IOT_DWELL: SymbolDuration = SymbolDuration::millis(50);
/// Minimum backoff of a broadcast frame in long broadcast dwell intervals.
/// Gives receivers that hop late a chance to reach the broadcast channel.
pub const FH_BROADCAST_MIN_BACKOFF: SymbolDuration = SymbolDuration::millis(10);

/// Number of unicast slots in a unicast channel sequence.
pub const FH_USCH_NUM_SLOTS: u32 = 65_536;
/// Clock drift value announcing "unknown", treated as 10 ppm.
pub const FH_UNKNOWN_CLOCK_DRIFT: u8 = 255;
pub const FH_DEFAULT_CLOCK_DRIFT_PPM: u8 = 10;

// Security, section 9.4
/// A frame counter with this value must not be used anymore.
pub const MAC_MAX_FRAME_COUNTER: u32 = 0xffff_ffff;
pub const MAC_SEC_CONTROL_FIELD_LEN: u16 = 1;
pub const MAC_FRAME_COUNTER_LEN: u16 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_backoff_period() {
        assert_eq!(MAC_UNIT_BACKOFF_PERIOD.ticks(), 20);
        assert_eq!(MAC_UNIT_BACKOFF_PERIOD.to_micros(), 400);
    }

    #[test]
    fn default_rollover() {
        assert_eq!(A_BASE_SUPERFRAME_DURATION.ticks(), 960);
        assert_eq!(MAC_DEFAULT_ROLLOVER, 960 << 15);
    }
}
