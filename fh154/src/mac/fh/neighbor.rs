//! Unicast schedules of neighbors, learned from their UT-IEs.

use fh154_driver::{
    channel::ChannelPlan,
    constants::{FH_DEFAULT_CLOCK_DRIFT_PPM, FH_UNKNOWN_CLOCK_DRIFT},
    frame::Address,
    time::{Tick, Uptime},
};
use fh154_util::{Error, Result};
use heapless::LinearMap;

use super::ie::{ufsi_position, unicast_sequence_len};

/// How a neighbor picks its unicast listening channel.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum ChannelFunction {
    /// Always the same channel.
    Fixed(u8),
    /// A channel sequence over `num_channels` channels.
    Hopping { num_channels: u16 },
}

/// A neighbor's unicast schedule, anchored at the reception of its last
/// UT-IE.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct UnicastSchedule {
    pub channel_function: ChannelFunction,
    /// Unicast dwell interval in ticks.
    pub dwell: Tick,
    /// Raw UFSI of the last UT-IE.
    pub ufsi: u32,
    /// Reception time of the last UT-IE.
    pub reference: Uptime,
    /// Announced clock drift in ppm, 255 if unknown.
    pub clock_drift: u8,
}

impl UnicastSchedule {
    /// Position in the neighbor's unicast channel sequence, in ticks.
    pub fn position(&self, now: Uptime) -> Uptime {
        let position = ufsi_position(self.ufsi, self.dwell) + now.saturating_sub(self.reference);
        position % unicast_sequence_len(self.dwell)
    }

    pub fn slot(&self, now: Uptime) -> u16 {
        (self.position(now) / self.dwell as u64) as u16
    }

    /// Ticks until the neighbor hops to its next unicast channel, `0` for a
    /// fixed channel.
    pub fn remaining_dwell(&self, now: Uptime) -> Tick {
        match self.channel_function {
            ChannelFunction::Fixed(_) => 0,
            ChannelFunction::Hopping { .. } => {
                self.dwell - (self.position(now) % self.dwell as u64) as Tick
            }
        }
    }

    /// Channel the neighbor listens on at `at`.
    pub fn channel_at<P: ChannelPlan>(&self, node: &Address, at: Uptime, plan: &P) -> u8 {
        match self.channel_function {
            ChannelFunction::Fixed(channel) => channel,
            ChannelFunction::Hopping { num_channels } => {
                plan.unicast_channel(node, self.slot(at), num_channels)
            }
        }
    }

    /// Uncertainty of the neighbor's slot edges due to clock drift since the
    /// schedule was learned, capped at a quarter dwell.
    pub fn drift_guard(&self, now: Uptime, own_drift: u8) -> Tick {
        let drift = |ppm: u8| {
            if ppm == FH_UNKNOWN_CLOCK_DRIFT {
                FH_DEFAULT_CLOCK_DRIFT_PPM
            } else {
                ppm
            }
        };
        let elapsed = now.saturating_sub(self.reference);
        let guard = elapsed * (drift(own_drift) as u64 + drift(self.clock_drift) as u64) / 1_000_000;
        guard.min(self.dwell as u64 / 4) as Tick
    }

    /// Extra backoff needed so that a transmission starting after `backoff`
    /// ticks stays clear of the neighbor's slot edge.
    pub fn slot_edge_backoff(
        &self,
        now: Uptime,
        backoff: Tick,
        own_drift: u8,
        edge_guard: Tick,
    ) -> Tick {
        if let ChannelFunction::Fixed(_) = self.channel_function {
            return 0;
        }

        let guard = self.drift_guard(now, own_drift) + edge_guard;
        let in_slot = self.position(now) % self.dwell as u64 + backoff as u64;
        let remaining = self.dwell as i64 - in_slot as i64;

        if (0..guard as i64).contains(&remaining) {
            // right before the edge, wait until well past it
            2 * guard
        } else if remaining < 0 && remaining > -(guard as i64) {
            guard
        } else {
            0
        }
    }
}

/// Unicast schedules by neighbor address.
pub struct NeighborTable<const N: usize> {
    entries: LinearMap<Address, UnicastSchedule, N>,
}

impl<const N: usize> Default for NeighborTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> NeighborTable<N> {
    pub const fn new() -> Self {
        Self {
            entries: LinearMap::new(),
        }
    }

    /// Adds or replaces a schedule. Fails if the table is full or a hopping
    /// schedule has no dwell.
    pub fn insert(&mut self, address: Address, schedule: UnicastSchedule) -> Result<()> {
        if let ChannelFunction::Hopping { .. } = schedule.channel_function {
            if schedule.dwell == 0 {
                return Err(Error);
            }
        }
        self.entries
            .insert(address, schedule)
            .map(|_| ())
            .map_err(|_| Error)
    }

    /// Re-anchors a known neighbor's schedule at a received UT-IE. Returns
    /// `false` for unknown neighbors.
    pub fn update_from_ut_ie(&mut self, address: &Address, ufsi: u32, rx_timestamp: Uptime) -> bool {
        match self.entries.get_mut(address) {
            Some(schedule) => {
                schedule.ufsi = ufsi;
                schedule.reference = rx_timestamp;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, address: &Address) -> Option<&UnicastSchedule> {
        self.entries.get(address)
    }

    pub fn remove(&mut self, address: &Address) -> Option<UnicastSchedule> {
        self.entries.remove(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Channel = slot modulo the channel count.
    struct ModuloPlan;

    impl ChannelPlan for ModuloPlan {
        fn broadcast_channel(&self, slot: u16) -> u8 {
            (slot % 8) as u8
        }

        fn unicast_channel(&self, _node: &Address, slot: u16, num_channels: u16) -> u8 {
            (slot % num_channels) as u8
        }
    }

    fn hopping(ufsi: u32) -> UnicastSchedule {
        UnicastSchedule {
            channel_function: ChannelFunction::Hopping { num_channels: 5 },
            dwell: 1000,
            ufsi,
            reference: 10_000,
            clock_drift: 20,
        }
    }

    #[test]
    fn position_and_channel() {
        // slot 7, a quarter into it
        let schedule = hopping(7 * 256 + 64);
        let node = Address::Short(1);
        assert_eq!(schedule.position(10_000), 7_250);
        assert_eq!(schedule.slot(10_000), 7);
        assert_eq!(schedule.remaining_dwell(10_000), 750);
        assert_eq!(schedule.channel_at(&node, 10_000, &ModuloPlan), 2);
        assert_eq!(schedule.channel_at(&node, 10_800, &ModuloPlan), 3);

        let fixed = UnicastSchedule {
            channel_function: ChannelFunction::Fixed(11),
            ..schedule
        };
        assert_eq!(fixed.channel_at(&node, 10_800, &ModuloPlan), 11);
        assert_eq!(fixed.remaining_dwell(10_800), 0);
    }

    #[test]
    fn position_wraps_after_sequence() {
        let schedule = hopping(0xffff * 256);
        assert_eq!(schedule.slot(10_000), 0xffff);
        assert_eq!(schedule.slot(11_000), 0);
    }

    #[test]
    fn drift_guard_is_capped() {
        let schedule = hopping(0);
        // 10 s of ticks at 20 + 20 ppm
        assert_eq!(schedule.drift_guard(10_000 + 500_000, 20), 20);
        // unknown drifts count as 10 ppm
        assert_eq!(schedule.drift_guard(10_000 + 500_000, 255), 15);
        assert_eq!(schedule.drift_guard(10_000 + 100_000_000, 20), 250);
    }

    #[test]
    fn slot_edge_protection() {
        let schedule = hopping(0);
        // no drift yet, guard is the edge guard alone
        assert_eq!(schedule.slot_edge_backoff(10_000, 500, 20, 50), 0);
        assert_eq!(schedule.slot_edge_backoff(10_000, 960, 20, 50), 100);
        assert_eq!(schedule.slot_edge_backoff(10_000, 1_020, 20, 50), 50);
        assert_eq!(schedule.slot_edge_backoff(10_000, 1_060, 20, 50), 0);
    }

    #[test]
    fn table() {
        let mut table = NeighborTable::<2>::new();
        let a = Address::Short(1);
        let b = Address::Extended([1, 2, 3, 4, 5, 6, 7, 8]);
        table.insert(a, hopping(0)).unwrap();
        table.insert(b, hopping(0)).unwrap();
        assert_eq!(table.insert(Address::Short(3), hopping(0)), Err(Error));
        // replacing does not need room
        table.insert(a, hopping(5)).unwrap();

        assert!(table.update_from_ut_ie(&b, 300, 20_000));
        assert_eq!(table.get(&b).map(|s| s.reference), Some(20_000));
        assert!(!table.update_from_ut_ie(&Address::Short(3), 300, 20_000));

        assert!(table.remove(&a).is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn hopping_schedule_needs_a_dwell() {
        let mut table = NeighborTable::<2>::new();
        let no_dwell = UnicastSchedule {
            dwell: 0,
            ..hopping(0)
        };
        assert_eq!(table.insert(Address::Short(1), no_dwell), Err(Error));
        assert!(table.is_empty());

        // a fixed channel never hops
        let fixed = UnicastSchedule {
            channel_function: ChannelFunction::Fixed(3),
            ..no_dwell
        };
        table.insert(Address::Short(1), fixed).unwrap();
        assert_eq!(fixed.remaining_dwell(20_000), 0);
        assert_eq!(fixed.slot_edge_backoff(20_000, 100, 20, 50), 0);
    }
}
