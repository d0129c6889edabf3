//! Build-time MAC and frequency-hopping defaults.
//!
//! Every constant can be overridden at build time through an environment
//! variable of the same name prefixed with `FH154_`, e.g.
//! `FH154_MAC_MAX_CSMA_BACKOFFS=5`. Durations are given as Rust expressions,
//! e.g. `FH154_FH_BC_INTERVAL="SymbolDuration::millis(2000)"`.
#![allow(dead_code)]
pub use customizable::*;

#[cfg(test)]
mod customizable {
    #![allow(dead_code)]
    use crate::time::SymbolDuration;

    pub const MAC_MIN_BE: u8 = 3;
    pub const MAC_MAX_BE: u8 = 5;
    pub const MAC_ALT_BE: u8 = 4;
    pub const MAC_MAX_CSMA_BACKOFFS: u8 = 4;
    pub const MAC_MAX_FRAME_RETRIES: u8 = 3; // 0-7
    pub const MAC_TX_DATA_MAX: u8 = 5;
    pub const MAC_MAX_FRAME_SIZE: u16 = 500;
    pub const FH_BC_INTERVAL: SymbolDuration = SymbolDuration::millis(1020);
    pub const FH_BC_DWELL_INTERVAL: SymbolDuration = SymbolDuration::millis(255);
    pub const FH_UC_DWELL_INTERVAL: SymbolDuration = SymbolDuration::millis(255);
    pub const FH_SLOT_EDGE_GUARD: SymbolDuration = SymbolDuration::millis(5);
    pub const FH_CSMA_BASE_BACKOFF: u8 = 0;
    pub const FH_CLOCK_DRIFT_PPM: u8 = 20;
    pub const MAC_ACTIVITY_THRESHOLD_NORMAL: u8 = 2;
    pub const MAC_ACTIVITY_THRESHOLD_HIGH: u8 = 4;
    pub const MAC_ACTIVITY_THRESHOLD_URGENT: u8 = 3;
    pub const MAC_ACTIVITY_MISS_INCREMENT: u8 = 1;
}

#[cfg(not(test))]
mod customizable {
    #![allow(unused)]
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}
