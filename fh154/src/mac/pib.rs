//! MAC and frequency hopping PIB attributes read by the scheduling core.

use fh154_driver::{
    const_config::{
        FH_BC_DWELL_INTERVAL, FH_BC_INTERVAL, FH_CLOCK_DRIFT_PPM, FH_CSMA_BASE_BACKOFF,
        FH_SLOT_EDGE_GUARD, FH_UC_DWELL_INTERVAL, MAC_ALT_BE, MAC_MAX_BE, MAC_MAX_CSMA_BACKOFFS,
        MAC_MAX_FRAME_RETRIES, MAC_MAX_FRAME_SIZE, MAC_MIN_BE, MAC_TX_DATA_MAX,
    },
    frame::Address,
    time::{ticks, Tick},
};

use super::{activity::ActivityThresholds, csma::CsmaConfig};

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum PibError {
    /// `min_be <= alt_be <= max_be` does not hold.
    BackoffExponent,
    /// The broadcast interval is zero.
    BroadcastInterval,
    /// The broadcast dwell does not fit into the broadcast interval.
    DwellInterval,
    /// The queue depth limit exceeds the queue capacity.
    QueueDepth,
}

#[derive(Debug, Clone)]
pub struct Pib {
    pub min_be: u8,
    pub max_be: u8,
    pub alt_be: u8,
    pub max_csma_backoffs: u8,
    pub max_frame_retries: u8,
    /// Maximum number of queued direct (or indirect) frames.
    pub tx_data_max: u8,
    /// Maximum frame size including the security overhead.
    pub max_frame_size: u16,
    /// Next outgoing frame counter.
    pub frame_counter: u32,
    pub short_address: u16,
    pub extended_address: [u8; 8],
    pub fh_enabled: bool,
    /// Channel used while frequency hopping is disabled.
    pub channel: u8,
    pub bc_interval: Tick,
    pub bc_dwell: Tick,
    pub uc_dwell: Tick,
    /// Number of channels of the own unicast channel sequence.
    pub uc_num_channels: u16,
    pub slot_edge_guard: Tick,
    pub base_backoff: u8,
    /// Own clock drift in ppm, 255 if unknown.
    pub clock_drift: u8,
    pub activity: ActivityThresholds,
}

impl Default for Pib {
    fn default() -> Self {
        Self {
            min_be: MAC_MIN_BE,
            max_be: MAC_MAX_BE,
            alt_be: MAC_ALT_BE,
            max_csma_backoffs: MAC_MAX_CSMA_BACKOFFS,
            max_frame_retries: MAC_MAX_FRAME_RETRIES,
            tx_data_max: MAC_TX_DATA_MAX,
            max_frame_size: MAC_MAX_FRAME_SIZE,
            frame_counter: 0,
            short_address: 0xfffe,
            extended_address: [0; 8],
            fh_enabled: true,
            channel: 0,
            bc_interval: ticks(FH_BC_INTERVAL),
            bc_dwell: ticks(FH_BC_DWELL_INTERVAL),
            uc_dwell: ticks(FH_UC_DWELL_INTERVAL),
            uc_num_channels: 1,
            slot_edge_guard: ticks(FH_SLOT_EDGE_GUARD),
            base_backoff: FH_CSMA_BASE_BACKOFF,
            clock_drift: FH_CLOCK_DRIFT_PPM,
            activity: ActivityThresholds::default(),
        }
    }
}

impl Pib {
    pub fn csma(&self) -> CsmaConfig {
        CsmaConfig {
            min_be: self.min_be,
            max_be: self.max_be,
            alt_be: self.alt_be,
            max_csma_backoffs: self.max_csma_backoffs,
        }
    }

    /// Own address used for the own unicast channel sequence.
    pub fn address(&self) -> Address {
        Address::Extended(self.extended_address)
    }

    /// Checks the attributes against each other and against the capacity of
    /// the class queues.
    pub fn validate(&self, queue_capacity: usize) -> Result<(), PibError> {
        if self.min_be > self.max_be || !(self.min_be..=self.max_be).contains(&self.alt_be) {
            return Err(PibError::BackoffExponent);
        }
        if self.bc_interval == 0 {
            return Err(PibError::BroadcastInterval);
        }
        if self.bc_dwell != 0 && self.bc_dwell >= self.bc_interval {
            return Err(PibError::DwellInterval);
        }
        if self.tx_data_max as usize > queue_capacity {
            return Err(PibError::QueueDepth);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let pib = Pib::default();
        assert_eq!(pib.validate(8), Ok(()));
        assert_eq!(pib.bc_interval, 51_000);
        assert_eq!(pib.bc_dwell, 12_750);
        assert_eq!(pib.slot_edge_guard, 250);
        assert_eq!(pib.csma().max_csma_backoffs, 4);
    }

    #[test]
    fn inconsistent_values() {
        let pib = Pib {
            alt_be: 6,
            ..Default::default()
        };
        assert_eq!(pib.validate(8), Err(PibError::BackoffExponent));

        let pib = Pib {
            bc_dwell: 51_000,
            ..Default::default()
        };
        assert_eq!(pib.validate(8), Err(PibError::DwellInterval));

        let pib = Pib {
            bc_dwell: 0,
            ..Default::default()
        };
        assert_eq!(pib.validate(8), Ok(()));
        assert_eq!(pib.validate(4), Err(PibError::QueueDepth));

        // a disabled dwell still needs an interval to count slots in
        let pib = Pib {
            bc_interval: 0,
            bc_dwell: 0,
            ..Default::default()
        };
        assert_eq!(pib.validate(8), Err(PibError::BroadcastInterval));
    }
}
