//! This crate defines everything the frequency-hopping scheduling core
//! consumes from its surroundings:
//! - contracts of the radio port, the tick timer, the security transform and
//!   the channel plan,
//! - addresses and opaque payload handles,
//! - IEEE 802.15.4 / SUN FSK constants, the symbol time base and the build-time
//!   configuration.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod channel;
pub mod const_config;
pub mod constants;
pub mod frame;
pub mod radio;
pub mod security;
pub mod time;
pub mod timer;
