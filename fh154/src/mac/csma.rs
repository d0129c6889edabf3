//! Unslotted CSMA-CA, section 6.2.5.1, with the frequency hopping backoff
//! extension.
//!
//! The backoff state lives in the [`FrameContext`](super::frame::FrameContext)
//! of the frame being sent. This engine only holds the configuration and
//! computes delays in unit backoff periods.

use fh154_driver::{constants::MAC_UNIT_BACKOFF_PERIOD, time::Tick};
use rand_core::RngCore;

use super::frame::BackoffState;

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct CsmaConfig {
    pub min_be: u8,
    pub max_be: u8,
    /// Initial backoff exponent when the alternate BE transmit option is set.
    pub alt_be: u8,
    pub max_csma_backoffs: u8,
}

/// Frequency hopping inputs of a backoff computation.
#[derive(Debug, Default, Eq, PartialEq, Clone, Copy)]
pub struct FhBackoff {
    /// Deterministic backoff units added per backoff already performed.
    pub base_backoff: u8,
    /// Ticks until the current unicast dwell of the destination ends.
    pub remaining_dwell: Tick,
}

/// What to do after the channel was found busy.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum BusyOutcome {
    /// Back off for the given number of unit backoff periods and try again.
    Retry(u32),
    /// Backoffs exhausted.
    ChannelAccessFailure,
}

#[derive(Debug, Clone, Copy)]
pub struct CsmaBackoffEngine {
    config: CsmaConfig,
}

impl CsmaBackoffEngine {
    pub fn new(config: CsmaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CsmaConfig {
        &self.config
    }

    /// Starts a fresh CSMA-CA sequence.
    pub fn begin(&self, state: &mut BackoffState, alt_be: bool) {
        state.nb = 0;
        state.in_progress = true;
        state.be = if alt_be {
            self.config.alt_be
        } else {
            self.config.min_be
        };
    }

    /// Draws the backoff of the next attempt, in unit backoff periods.
    pub fn prepare<R: RngCore>(
        &self,
        state: &BackoffState,
        rng: &mut R,
        fh: Option<FhBackoff>,
    ) -> u32 {
        let mask = (1u32 << state.be.min(31)) - 1;
        let mut units = (rng.next_u32() & 0xff) & mask;

        if let Some(fh) = fh {
            if state.retransmit && state.nb == 0 && fh.base_backoff != 0 {
                // let the destination hop away before trying again
                units += fh.remaining_dwell / MAC_UNIT_BACKOFF_PERIOD.ticks();
            }
            units += fh.base_backoff as u32 * state.nb as u32;
        }

        units
    }

    /// Accounts for a failed clear channel assessment.
    pub fn on_channel_busy<R: RngCore>(
        &self,
        state: &mut BackoffState,
        rng: &mut R,
        fh: Option<FhBackoff>,
    ) -> BusyOutcome {
        state.nb += 1;
        if state.nb >= self.config.max_csma_backoffs {
            return BusyOutcome::ChannelAccessFailure;
        }

        state.be = (state.be + 1).min(self.config.max_be);
        BusyOutcome::Retry(self.prepare(state, rng, fh))
    }

    /// Ends the CSMA-CA sequence of a frame.
    pub fn reset(&self, state: &mut BackoffState) {
        state.nb = 0;
        state.be = self.config.min_be;
        state.retransmit = false;
        state.in_progress = false;
    }
}

/// Converts backoff units into ticks. A backoff is at least one unit.
pub fn backoff_ticks(units: u32) -> Tick {
    units.max(1) * MAC_UNIT_BACKOFF_PERIOD.ticks()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Always returns the same value.
    struct FixedRng(u32);

    impl RngCore for FixedRng {
        fn next_u32(&mut self) -> u32 {
            self.0
        }

        fn next_u64(&mut self) -> u64 {
            self.0 as u64
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(self.0 as u8)
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    fn engine() -> CsmaBackoffEngine {
        CsmaBackoffEngine::new(CsmaConfig {
            min_be: 3,
            max_be: 5,
            alt_be: 4,
            max_csma_backoffs: 4,
        })
    }

    #[test]
    fn fourth_busy_channel_fails() {
        let engine = engine();
        let mut rng = FixedRng(u32::MAX);
        let mut state = BackoffState::default();
        engine.begin(&mut state, false);
        assert_eq!(engine.prepare(&state, &mut rng, None), 7);

        let mut exponents = std::vec::Vec::new();
        for _ in 0..3 {
            assert!(matches!(
                engine.on_channel_busy(&mut state, &mut rng, None),
                BusyOutcome::Retry(_)
            ));
            exponents.push(state.be);
        }
        assert_eq!(exponents, [4, 5, 5]);

        assert_eq!(
            engine.on_channel_busy(&mut state, &mut rng, None),
            BusyOutcome::ChannelAccessFailure
        );
        assert_eq!(state.nb, 4);
        assert_eq!(state.be, 5);

        engine.reset(&mut state);
        assert_eq!(
            state,
            BackoffState {
                nb: 0,
                be: 3,
                retransmit: false,
                in_progress: false,
            }
        );
    }

    #[test]
    fn backoff_stays_below_two_to_the_be() {
        let engine = engine();
        let mut state = BackoffState::default();
        engine.begin(&mut state, true);
        assert_eq!(state.be, 4);

        for value in [0, 1, 15, 16, 0xff, 0x1234_5678] {
            let units = engine.prepare(&state, &mut FixedRng(value), None);
            assert!(units < 16);
        }
    }

    #[test]
    fn frequency_hopping_terms() {
        let engine = engine();
        let mut rng = FixedRng(0);
        let mut state = BackoffState {
            nb: 2,
            be: 3,
            retransmit: true,
            in_progress: true,
        };
        let fh = FhBackoff {
            base_backoff: 3,
            remaining_dwell: 2_000,
        };
        // base backoff per backoff already performed
        assert_eq!(engine.prepare(&state, &mut rng, Some(fh)), 6);

        // immediate retransmission waits for the next dwell
        state.nb = 0;
        assert_eq!(engine.prepare(&state, &mut rng, Some(fh)), 100);

        let no_base = FhBackoff {
            base_backoff: 0,
            ..fh
        };
        assert_eq!(engine.prepare(&state, &mut rng, Some(no_base)), 0);
    }

    #[test]
    fn zero_backoff_is_one_unit() {
        assert_eq!(backoff_ticks(0), 20);
        assert_eq!(backoff_ticks(3), 60);
    }
}
