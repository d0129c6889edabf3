//! Tick-ordered timer queue driving every deferred action of the core.
//!
//! Timers live in a fixed arena of `N` slots and are chained by index into
//! one of two lists, both sorted by ascending deadline:
//!
//! - *unaligned* timers are relative to the moment they were armed. They
//!   follow the tick counter through rollovers and realignments so that
//!   their wall-clock distance is preserved.
//! - *aligned* timers name an absolute tick inside the rollover period (e.g.
//!   a slot boundary). They are only moved when they lie beyond the period
//!   that just ended.
//!
//! The queue never touches hardware itself. After each mutation the owner
//! reads [`TimerQueue::compare`] and programs it into the tick timer. A
//! compare equal to the rollover period means that nothing is due in the
//! current period.

use fh154_driver::{
    constants::{
        A_BASE_SUPERFRAME_DURATION, MAC_BO_NON_BEACON, MAC_DEFAULT_ROLLOVER,
        MAC_TIMER_MAX_DEADLINE, MAC_TIMER_NEXT_TIMEOUT_ADJ,
    },
    time::Tick,
};
use fh154_util::{warn, Error, Result};

/// How a timer deadline relates to the tick counter.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Alignment {
    /// Absolute tick within the rollover period.
    Aligned,
    /// Relative to the arm time.
    Unaligned,
}

/// Refers to an armed timer.
///
/// A handle outlives its timer: once the timer fired or was cancelled the
/// slot may be recycled, and the generation makes the stale handle inert.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct TimerHandle {
    index: u8,
    generation: u16,
}

#[derive(Debug, Clone, Copy)]
struct TimerSlot<T> {
    deadline: Tick,
    payload: Option<T>,
    alignment: Alignment,
    next: Option<u8>,
    generation: u16,
}

/// Rollover period of the tick counter for the given beacon order.
pub const fn rollover_for_beacon_order(beacon_order: u8) -> Tick {
    let bo = if beacon_order > MAC_BO_NON_BEACON {
        MAC_BO_NON_BEACON
    } else {
        beacon_order
    };
    A_BASE_SUPERFRAME_DURATION.ticks() << bo
}

pub struct TimerQueue<T: Copy, const N: usize> {
    slots: [TimerSlot<T>; N],
    free: Option<u8>,
    aligned: Option<u8>,
    unaligned: Option<u8>,
    /// Entry the compare register currently points at.
    active: Option<u8>,
    compare: Tick,
    rollover: Tick,
    /// Rollover period that takes effect at the next rollover.
    next_rollover: Tick,
}

impl<T: Copy, const N: usize> TimerQueue<T, N> {
    const INDEX_FITS: () = assert!(N > 0 && N <= u8::MAX as usize, "timer arena too large");

    pub fn new(rollover: Tick) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::INDEX_FITS;
        assert!(rollover > 0, "rollover period must not be zero");

        let slots = core::array::from_fn(|i| TimerSlot {
            deadline: 0,
            payload: None,
            alignment: Alignment::Unaligned,
            next: if i + 1 < N { Some((i + 1) as u8) } else { None },
            generation: 0,
        });

        Self {
            slots,
            free: Some(0),
            aligned: None,
            unaligned: None,
            active: None,
            compare: rollover,
            rollover,
            next_rollover: rollover,
        }
    }

    /// Arms a timer.
    ///
    /// Unaligned timers expire `ticks` after `now`. Aligned timers expire
    /// when the counter reaches `ticks`, in the next period if that tick has
    /// already passed in the current one.
    ///
    /// Fails when all slots are in use.
    ///
    /// # Panics
    ///
    /// Panics if the deadline cannot be represented: an unaligned deadline
    /// beyond [`MAC_TIMER_MAX_DEADLINE`] or an aligned tick outside the
    /// rollover period.
    pub fn arm(
        &mut self,
        now: Tick,
        alignment: Alignment,
        ticks: Tick,
        payload: T,
    ) -> Result<TimerHandle> {
        let deadline = match alignment {
            Alignment::Unaligned => match now.checked_add(ticks) {
                Some(deadline) if deadline <= MAC_TIMER_MAX_DEADLINE => deadline,
                _ => panic!("timer deadline beyond the representable window"),
            },
            Alignment::Aligned => {
                assert!(
                    ticks < self.rollover,
                    "aligned deadline outside the rollover period"
                );
                if ticks <= now {
                    ticks + self.rollover
                } else {
                    ticks
                }
            }
        };

        let index = self.free.ok_or(Error)?;
        self.free = self.slot(index).next;

        let slot = self.slot_mut(index);
        slot.deadline = deadline;
        slot.payload = Some(payload);
        slot.alignment = alignment;
        slot.next = None;
        let handle = TimerHandle {
            index,
            generation: slot.generation,
        };

        self.insert(index);
        self.refresh(now);
        Ok(handle)
    }

    /// Removes a timer before it fires. Returns `false` if the timer already
    /// fired or was cancelled.
    pub fn cancel(&mut self, now: Tick, handle: TimerHandle) -> bool {
        if !self.is_armed(handle) {
            return false;
        }

        self.unlink(handle.index);
        self.release(handle.index);
        if self.active == Some(handle.index) {
            self.refresh(now);
        }
        true
    }

    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        let slot = self.slot(handle.index);
        slot.payload.is_some() && slot.generation == handle.generation
    }

    /// Deadline of an armed timer.
    pub fn deadline(&self, handle: TimerHandle) -> Option<Tick> {
        self.is_armed(handle)
            .then(|| self.slot(handle.index).deadline)
    }

    /// Removes and returns the payload of the nearest timer if it is due.
    ///
    /// Call repeatedly from the compare interrupt until it returns `None`,
    /// then program [`TimerQueue::compare`].
    pub fn pop_expired(&mut self, now: Tick) -> Option<T> {
        let index = self.active?;
        if self.slot(index).deadline > now {
            return None;
        }

        self.unlink(index);
        let payload = self.release(index);
        self.refresh(now);
        payload
    }

    /// Accounts for a wrap of the tick counter and applies a pending
    /// rollover period. Returns the new period if it changed, it must be
    /// programmed into the tick timer.
    pub fn on_rollover(&mut self, now: Tick) -> Option<Tick> {
        let period = self.rollover;
        let active = self.active;

        let mut cursor = self.unaligned;
        while let Some(index) = cursor {
            let slot = self.slot_mut(index);
            if slot.deadline < period && active != Some(index) {
                warn!("timer missed its deadline before rollover");
            }
            slot.deadline = slot.deadline.saturating_sub(period);
            cursor = slot.next;
        }

        let mut cursor = self.aligned;
        while let Some(index) = cursor {
            let slot = self.slot_mut(index);
            if slot.deadline >= period {
                slot.deadline -= period;
            }
            cursor = slot.next;
        }
        self.resort(Alignment::Aligned);

        let changed = (self.next_rollover != self.rollover).then(|| {
            self.rollover = self.next_rollover;
            self.rollover
        });

        self.refresh(now);
        changed
    }

    /// Accounts for a jump of the tick counter by `adjust` ticks, e.g. after
    /// the schedule has been aligned to an external reference, and resets
    /// the rollover period.
    ///
    /// Unaligned timers move along with the counter, aligned timers keep
    /// their absolute position.
    pub fn realign(&mut self, now: Tick, adjust: i32, rollover: Tick) {
        assert!(rollover > 0, "rollover period must not be zero");
        self.rollover = rollover;
        self.next_rollover = rollover;

        let mut cursor = self.unaligned;
        while let Some(index) = cursor {
            let slot = self.slot_mut(index);
            let shifted = (slot.deadline as i64 + adjust as i64).max(0);
            slot.deadline = shifted.min(MAC_TIMER_MAX_DEADLINE as i64) as Tick;
            cursor = slot.next;
        }
        self.resort(Alignment::Unaligned);

        self.refresh(now);
    }

    /// Changes the rollover period immediately.
    pub fn set_rollover(&mut self, now: Tick, rollover: Tick) {
        assert!(rollover > 0, "rollover period must not be zero");
        self.rollover = rollover;
        self.next_rollover = rollover;
        self.refresh(now);
    }

    /// Changes the rollover period at the next rollover, keeping the current
    /// period intact.
    pub fn sync_rollover(&mut self, rollover: Tick) {
        assert!(rollover > 0, "rollover period must not be zero");
        self.next_rollover = rollover;
    }

    /// Ticks until the timer queue needs the CPU again, `0` if no timer is
    /// armed and `1` if a timer is due.
    pub fn next_timeout(&self, now: Tick) -> Tick {
        if self.is_empty() {
            return 0;
        }

        let now = now.saturating_add(MAC_TIMER_NEXT_TIMEOUT_ADJ);
        if now < self.compare {
            self.compare - now
        } else {
            1
        }
    }

    /// Value for the hardware compare register.
    pub fn compare(&self) -> Tick {
        self.compare
    }

    pub fn rollover(&self) -> Tick {
        self.rollover
    }

    pub fn is_empty(&self) -> bool {
        self.aligned.is_none() && self.unaligned.is_none()
    }

    pub fn len(&self) -> usize {
        self.deadlines(Alignment::Aligned).count() + self.deadlines(Alignment::Unaligned).count()
    }

    /// Deadlines of one list in list order.
    pub fn deadlines(&self, alignment: Alignment) -> impl Iterator<Item = Tick> + '_ {
        core::iter::successors(self.head(alignment), |index| self.slot(*index).next)
            .map(|index| self.slot(index).deadline)
    }

    /// Recomputes the active entry and the compare value.
    ///
    /// Unaligned entries that are overdue are moved to `now` so that the
    /// compare never points into the past, which would stall the queue until
    /// the next rollover.
    fn refresh(&mut self, now: Tick) {
        let mut active = None;

        if let Some(head) = self.unaligned {
            if self.slot(head).deadline < self.rollover {
                let mut cursor = Some(head);
                while let Some(index) = cursor {
                    let slot = self.slot_mut(index);
                    if slot.deadline >= now {
                        break;
                    }
                    slot.deadline = now;
                    cursor = slot.next;
                }
                active = Some(head);
            }
        }

        if let Some(head) = self.aligned {
            let sooner = match active {
                Some(index) => self.slot(head).deadline < self.slot(index).deadline,
                None => true,
            };
            if sooner {
                active = Some(head);
            }
        }

        match active.filter(|index| self.slot(*index).deadline < self.rollover) {
            Some(index) => {
                self.active = Some(index);
                self.compare = self.slot(index).deadline;
            }
            None => {
                self.active = None;
                self.compare = self.rollover;
            }
        }
    }

    /// Sorted insertion, after all entries with the same deadline.
    fn insert(&mut self, index: u8) {
        let deadline = self.slot(index).deadline;
        let alignment = self.slot(index).alignment;

        let mut prev = None;
        let mut cursor = self.head(alignment);
        while let Some(current) = cursor {
            if deadline < self.slot(current).deadline {
                break;
            }
            prev = Some(current);
            cursor = self.slot(current).next;
        }

        self.slot_mut(index).next = cursor;
        match prev {
            Some(prev) => self.slot_mut(prev).next = Some(index),
            None => *self.head_mut(alignment) = Some(index),
        }
    }

    fn unlink(&mut self, index: u8) {
        let alignment = self.slot(index).alignment;
        let next = self.slot(index).next;

        let mut prev = None;
        let mut cursor = self.head(alignment);
        while let Some(current) = cursor {
            if current == index {
                match prev {
                    Some(prev) => self.slot_mut(prev).next = next,
                    None => *self.head_mut(alignment) = next,
                }
                return;
            }
            prev = Some(current);
            cursor = self.slot(current).next;
        }
        panic!("armed timer missing from its list");
    }

    fn release(&mut self, index: u8) -> Option<T> {
        let free = self.free;
        let slot = self.slot_mut(index);
        let payload = slot.payload.take();
        slot.generation = slot.generation.wrapping_add(1);
        slot.next = free;
        self.free = Some(index);
        payload
    }

    fn resort(&mut self, alignment: Alignment) {
        let mut cursor = self.head_mut(alignment).take();
        while let Some(index) = cursor {
            cursor = self.slot(index).next;
            self.insert(index);
        }
    }

    fn head(&self, alignment: Alignment) -> Option<u8> {
        match alignment {
            Alignment::Aligned => self.aligned,
            Alignment::Unaligned => self.unaligned,
        }
    }

    fn head_mut(&mut self, alignment: Alignment) -> &mut Option<u8> {
        match alignment {
            Alignment::Aligned => &mut self.aligned,
            Alignment::Unaligned => &mut self.unaligned,
        }
    }

    fn slot(&self, index: u8) -> &TimerSlot<T> {
        &self.slots[index as usize]
    }

    fn slot_mut(&mut self, index: u8) -> &mut TimerSlot<T> {
        &mut self.slots[index as usize]
    }
}

impl<T: Copy, const N: usize> Default for TimerQueue<T, N> {
    fn default() -> Self {
        Self::new(MAC_DEFAULT_ROLLOVER)
    }
}
