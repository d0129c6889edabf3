//! Time base of the scheduling core.
//!
//! The core counts in PHY symbols. For the 50 kb/s SUN FSK PHY a symbol
//! lasts 20µs. A tick counter runs from zero up to the current rollover
//! period and then wraps, see [`crate::timer::TickTimer`].
//!
//! - [`Tick`] is a position inside the current rollover period.
//! - [`Uptime`] is a monotonic symbol count that survives rollovers.
//! - [`SymbolDuration`] is used for configured durations.

use fugit::TimerDurationU32;

/// 50 kb/s 2-FSK: one bit per symbol.
pub const SYMBOL_RATE: u32 = 50_000;

pub type SymbolDuration = TimerDurationU32<SYMBOL_RATE>;

pub type Tick = u32;

pub type Uptime = u64;

/// Converts a configured duration into raw ticks.
pub const fn ticks(duration: SymbolDuration) -> Tick {
    duration.ticks()
}
