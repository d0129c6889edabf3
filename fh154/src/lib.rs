//! Transmission scheduling and frequency-hopping slot synchronization for an
//! IEEE 802.15.4 MAC.
//!
//! The crate decides when, on which channel and with which priority a queued
//! frame is handed to the radio. All state lives in one [`mac::TxEngine`]
//! driven through [`mac::TxEngine::handle_event`]; the boundary contracts
//! (radio, timer, security, channel plan) come from [`fh154_driver`].
#![no_std]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

pub use fh154_driver as driver;

pub mod mac;
pub mod upper;
