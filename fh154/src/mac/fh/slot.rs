//! Own broadcast and unicast slot schedule.
//!
//! The broadcast schedule repeats every broadcast interval. Each interval
//! starts with the broadcast dwell, during which every node listens on the
//! broadcast channel of the slot, and continues with unicast traffic on the
//! unicast channels. The broadcast slot timer fires twice per interval:
//!
//! ```text
//!  dwell start            dwell end                      dwell start
//!  slot n, bfio = 0       bfio = dwell                   slot n + 1
//!  |<------ dwell ------->|<---- interval - dwell ------>|
//!  |  broadcast window    |  unicast      | guard window |
//! ```
//!
//! The unicast slot timer advances the own unicast slot every unicast dwell.
//! Unicast hops that fall into the broadcast dwell are deferred until the
//! dwell ends.

use fh154_driver::time::{Tick, Uptime};
use fh154_util::info;

use super::ie::BroadcastTiming;

/// Result of a broadcast slot timer tick.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum SlotTransition {
    /// The broadcast dwell of `slot` started. The next tick is due in
    /// `next_in` ticks.
    DwellStarted { slot: u16, next_in: Tick },
    /// The broadcast dwell ended.
    DwellEnded { next_in: Tick },
    /// No broadcast schedule is running.
    Idle,
}

/// Result of a unicast slot timer tick.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum UnicastHop {
    /// Hop to the channel of the given unicast slot now.
    Apply(u16),
    /// The hop waits for the end of the broadcast dwell.
    Deferred,
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum SlotPhase {
    AwaitingDwellStart,
    InDwell,
    /// The last guard interval before the next dwell. New unicast attempts
    /// are deferred.
    InGuardWindow,
}

/// A transmission would not fit in the requested slot.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct OutOfSlot;

#[derive(Debug, Clone)]
pub struct FhSlotSynchronizer {
    interval: Tick,
    dwell: Tick,
    guard: Tick,
    started: bool,
    slot: u16,
    /// Broadcast interval offset at `reference`.
    bfio: Tick,
    reference: Uptime,
    dwell_active: bool,
    pending_bc_hop: bool,
    pending_uc_hop: bool,
    uc_dwell: Tick,
    uc_slot: u16,
    uc_reference: Uptime,
}

impl FhSlotSynchronizer {
    /// # Panics
    ///
    /// Panics if the interval is zero or a non-zero dwell is not shorter
    /// than the interval.
    pub fn new(interval: Tick, dwell: Tick, guard: Tick, uc_dwell: Tick) -> Self {
        check_schedule(interval, dwell);
        Self {
            interval,
            dwell,
            guard,
            started: false,
            slot: 0,
            bfio: 0,
            reference: 0,
            dwell_active: false,
            pending_bc_hop: false,
            pending_uc_hop: false,
            uc_dwell,
            uc_slot: 0,
            uc_reference: 0,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_dwell_active(&self) -> bool {
        self.dwell_active
    }

    pub fn interval(&self) -> Tick {
        self.interval
    }

    pub fn dwell(&self) -> Tick {
        self.dwell
    }

    pub fn uc_dwell(&self) -> Tick {
        self.uc_dwell
    }

    pub fn uc_slot(&self) -> u16 {
        self.uc_slot
    }

    /// Starts the broadcast schedule at the given position. Returns the
    /// ticks until the next broadcast slot timer tick.
    pub fn start(&mut self, now: Uptime, bfio: Tick, slot: u16) -> Tick {
        self.started = true;
        self.set_position(now, bfio, slot);
        info!("broadcast schedule started");
        self.next_boundary_in(now)
    }

    /// Stops the broadcast schedule, e.g. when the node leaves the network.
    pub fn stop(&mut self) {
        self.started = false;
        self.dwell_active = false;
        self.pending_bc_hop = false;
    }

    /// Advances the broadcast schedule at a broadcast slot timer tick.
    pub fn on_broadcast_timer_tick(&mut self, now: Uptime) -> SlotTransition {
        if !self.started || self.dwell == 0 {
            return SlotTransition::Idle;
        }

        self.reference = now;
        if !self.dwell_active {
            self.slot = self.slot.wrapping_add(1);
            self.bfio = 0;
            self.dwell_active = true;
            SlotTransition::DwellStarted {
                slot: self.slot,
                next_in: self.dwell,
            }
        } else {
            self.bfio = self.dwell;
            self.dwell_active = false;
            SlotTransition::DwellEnded {
                next_in: self.interval - self.dwell,
            }
        }
    }

    /// Current broadcast interval offset and slot. `(0, 0)` before the
    /// schedule started.
    pub fn current_bfio(&self, now: Uptime) -> (Tick, u16) {
        if !self.started {
            return (0, 0);
        }

        let elapsed = now.saturating_sub(self.reference);
        let bfio = self.bfio as u64 + elapsed;
        let interval = self.interval as u64;
        let slot = self.slot.wrapping_add((bfio / interval) as u16);
        ((bfio % interval) as Tick, slot)
    }

    /// Current position as carried in a BT-IE.
    pub fn timing(&self, now: Uptime) -> BroadcastTiming {
        let (bfio, slot) = self.current_bfio(now);
        BroadcastTiming { slot, bfio }
    }

    pub fn phase(&self, now: Uptime) -> SlotPhase {
        if !self.started || self.dwell == 0 {
            return SlotPhase::AwaitingDwellStart;
        }
        if self.dwell_active {
            return SlotPhase::InDwell;
        }

        let (bfio, _) = self.current_bfio(now);
        if self.interval - bfio <= self.guard {
            SlotPhase::InGuardWindow
        } else {
            SlotPhase::AwaitingDwellStart
        }
    }

    /// Whether a unicast attempt may start now: outside the broadcast dwell
    /// and at least `guard` ticks before the next one.
    pub fn is_unicast_eligible(&self, now: Uptime, guard: Tick) -> bool {
        if !self.started || self.dwell == 0 {
            return true;
        }
        if self.dwell_active {
            return false;
        }

        let (bfio, _) = self.current_bfio(now);
        bfio >= self.dwell && self.interval - bfio >= guard
    }

    /// Whether a broadcast attempt may start now: inside the broadcast dwell
    /// minus the slot edge guard.
    pub fn is_broadcast_eligible(&self, now: Uptime) -> bool {
        if !self.started || !self.dwell_active {
            return false;
        }

        let (bfio, _) = self.current_bfio(now);
        bfio < self.dwell.saturating_sub(self.guard)
    }

    /// Resynchronizes to a received BT-IE. `rx_timestamp` is the reception
    /// time of the frame, the time elapsed since then is compensated.
    ///
    /// Returns whether the schedule changed; the broadcast slot timer must
    /// then be restarted with [`FhSlotSynchronizer::next_boundary_in`].
    pub fn update_from_slot_descriptor(
        &mut self,
        now: Uptime,
        timing: BroadcastTiming,
        rx_timestamp: Uptime,
    ) -> bool {
        if self.interval == 0 {
            return false;
        }

        let elapsed = now.saturating_sub(rx_timestamp);
        let bfio = timing.bfio as u64 + elapsed;
        let interval = self.interval as u64;
        let slot = timing.slot.wrapping_add((bfio / interval) as u16);
        let bfio = (bfio % interval) as Tick;

        if self.started && self.current_bfio(now) == (bfio, slot) {
            return false;
        }

        let was_started = self.started;
        self.started = true;
        self.set_position(now, bfio, slot);
        self.pending_bc_hop = false;
        if !was_started {
            info!("broadcast schedule synchronized");
        }
        true
    }

    /// Ticks until the next broadcast slot timer tick.
    pub fn next_boundary_in(&self, now: Uptime) -> Tick {
        let (bfio, _) = self.current_bfio(now);
        if self.dwell_active {
            self.dwell.saturating_sub(bfio).max(1)
        } else {
            self.interval - bfio
        }
    }

    /// Limits a broadcast backoff to the dwell window.
    ///
    /// Returns the possibly shortened backoff and the slot the frame goes
    /// out in, or [`OutOfSlot`] if the backoff would end within the slot
    /// edge guard of the dwell end.
    pub fn broadcast_tx_window(
        &self,
        now: Uptime,
        backoff: Tick,
    ) -> Result<(Tick, u16), OutOfSlot> {
        if !self.started || self.dwell == 0 {
            return Err(OutOfSlot);
        }

        let limit = self.dwell.saturating_sub(self.guard);
        let backoff = if limit > 0 && backoff > limit {
            backoff % limit
        } else {
            backoff
        };

        let (bfio, slot) = self.current_bfio(now);
        let remaining = self.dwell as i64 - (bfio as i64 + backoff as i64);
        if remaining < self.guard as i64 {
            return Err(OutOfSlot);
        }
        Ok((backoff, slot))
    }

    /// Checks a unicast backoff against the broadcast schedule.
    ///
    /// Returns the extra backoff needed to clear the end of the dwell, or
    /// [`OutOfSlot`] if the backoff would end inside the dwell or in the
    /// guard window before the next one.
    pub fn unicast_tx_window(&self, now: Uptime, backoff: Tick) -> Result<Tick, OutOfSlot> {
        if !self.started || self.dwell == 0 {
            return Ok(0);
        }

        let (bfio, _) = self.current_bfio(now);
        let position = bfio as i64 + backoff as i64;
        let guard = self.guard as i64;
        let to_dwell_end = self.dwell as i64 - position;
        let to_interval_end = self.interval as i64 - position;

        if to_dwell_end > guard || to_interval_end < guard {
            return Err(OutOfSlot);
        }
        if to_dwell_end > 0 {
            // ends right before the dwell does, move it past the edge
            return Ok(self.guard);
        }
        Ok(0)
    }

    /// Starts the own unicast schedule at the given slot.
    pub fn start_unicast(&mut self, now: Uptime, slot: u16) {
        self.uc_slot = slot;
        self.uc_reference = now;
    }

    /// Advances the own unicast slot at a unicast slot timer tick.
    pub fn on_unicast_timer_tick(&mut self, now: Uptime) -> UnicastHop {
        self.uc_slot = self.uc_slot.wrapping_add(1);
        self.uc_reference = now;
        if self.dwell_active {
            self.pending_uc_hop = true;
            UnicastHop::Deferred
        } else {
            self.pending_uc_hop = false;
            UnicastHop::Apply(self.uc_slot)
        }
    }

    /// Own position in the unicast channel sequence, in ticks.
    pub fn unicast_position(&self, now: Uptime) -> Uptime {
        self.uc_slot as u64 * self.uc_dwell as u64 + now.saturating_sub(self.uc_reference)
    }

    /// Records that the broadcast hop of the current dwell could not be
    /// applied because the radio is busy.
    pub fn defer_broadcast_hop(&mut self) {
        self.pending_bc_hop = true;
    }

    pub fn take_pending_bc_hop(&mut self) -> bool {
        core::mem::take(&mut self.pending_bc_hop)
    }

    pub fn take_pending_uc_hop(&mut self) -> bool {
        core::mem::take(&mut self.pending_uc_hop)
    }

    /// Changes the broadcast schedule parameters. A running schedule keeps
    /// its slot and restarts at the beginning of its dwell.
    pub fn set_schedule(&mut self, now: Uptime, interval: Tick, dwell: Tick, guard: Tick) {
        check_schedule(interval, dwell);
        let (_, slot) = self.current_bfio(now);
        self.interval = interval;
        self.dwell = dwell;
        self.guard = guard;
        if self.started {
            self.set_position(now, 0, slot);
        }
    }

    pub fn set_uc_dwell(&mut self, uc_dwell: Tick) {
        self.uc_dwell = uc_dwell;
    }

    fn set_position(&mut self, now: Uptime, bfio: Tick, slot: u16) {
        self.slot = slot;
        self.bfio = bfio;
        self.reference = now;
        self.dwell_active = bfio < self.dwell;
    }
}

fn check_schedule(interval: Tick, dwell: Tick) {
    assert!(interval > 0, "broadcast interval must not be zero");
    assert!(
        dwell == 0 || dwell < interval,
        "broadcast dwell must be shorter than the broadcast interval"
    );
}
