//! Hardware tick timer contract.

use crate::time::Tick;

/// The hardware counter driving the timer queue.
///
/// The counter runs from zero to the rollover period, then wraps to zero and
/// raises a rollover interrupt. A compare match raises a compare interrupt.
/// Both interrupts are delivered to the core as events.
pub trait TickTimer {
    /// Current counter value, always below the rollover period.
    fn now(&self) -> Tick;

    /// Programs the compare register. A compare equal to the rollover period
    /// means that no compare match is needed in the current period.
    fn set_compare(&mut self, tick: Tick);

    /// Changes the rollover period.
    fn set_rollover(&mut self, period: Tick);
}
